//! Minimal TCP stream substrate.
//!
//! Each TCP connection carries exactly one protocol stream. The dialer
//! opens with a protocol-selection line:
//!
//! ```text
//! Dialer:   /bench/data\n
//! Listener: /bench/data\n      (accepted, stream handed to the handler)
//! Listener: na\n               (no handler registered, connection closed)
//! ```
//!
//! Everything after the selection line belongs to the protocol handler.
//! Resetting a stream closes the socket with SO_LINGER 0 so the peer
//! receives an RST instead of a FIN.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, Instrument};

use super::{Host, ProtocolStream, StreamGuard, StreamHandler};

/// Longest accepted protocol-selection line, including the newline.
const MAX_PROTOCOL_LINE: usize = 256;

/// Reply sent when no handler is registered for the requested protocol.
const NOT_AVAILABLE: &[u8] = b"na\n";

/// Listen socket backlog
const LISTEN_BACKLOG: i32 = 1024;

type HandlerTable = HashMap<&'static str, StreamHandler>;

/// TCP host: bound listeners plus the protocol handler table.
pub struct TcpHost {
    listeners: Vec<TcpListener>,
    handlers: HandlerTable,
    stream_limit: Arc<Semaphore>,
    max_streams: u32,
}

impl TcpHost {
    /// Bind every listen address. Must be called inside a tokio runtime.
    pub fn bind(listen: &[String], max_streams: u32) -> io::Result<Self> {
        let mut listeners = Vec::with_capacity(listen.len());
        for addr in listen {
            let addr: SocketAddr = addr
                .parse()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("{addr}: {e}")))?;
            let listener = TcpListener::from_std(create_listener(addr)?)?;
            info!(address = %listener.local_addr()?, "Listening");
            listeners.push(listener);
        }

        Ok(Self {
            listeners,
            handlers: HashMap::new(),
            stream_limit: Arc::new(Semaphore::new(max_streams as usize)),
            max_streams,
        })
    }

    /// Socket addresses the listeners are bound to.
    pub fn local_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        self.listeners.iter().map(|l| l.local_addr()).collect()
    }

    /// Start accepting streams on every listener.
    pub fn start(self) -> RunningHost {
        let handlers = Arc::new(self.handlers);
        let accept_tasks = self
            .listeners
            .into_iter()
            .map(|listener| {
                let handlers = Arc::clone(&handlers);
                let stream_limit = Arc::clone(&self.stream_limit);
                tokio::spawn(accept_loop(listener, handlers, stream_limit))
            })
            .collect();

        RunningHost {
            accept_tasks,
            stream_limit: self.stream_limit,
            max_streams: self.max_streams,
        }
    }
}

impl Host for TcpHost {
    fn register_handler(&mut self, protocol: &'static str, handler: StreamHandler) {
        debug!(protocol, "Registered stream handler");
        self.handlers.insert(protocol, handler);
    }

    fn addrs(&self) -> Vec<String> {
        self.local_addrs()
            .unwrap_or_default()
            .into_iter()
            .map(format_multiaddr)
            .collect()
    }
}

/// A host that is accepting streams.
pub struct RunningHost {
    accept_tasks: Vec<JoinHandle<()>>,
    stream_limit: Arc<Semaphore>,
    max_streams: u32,
}

impl RunningHost {
    /// Stop accepting and wait up to `grace` for in-flight streams.
    ///
    /// Returns `true` if every stream finished within the grace period.
    /// Streams still running afterwards are left to die with the process.
    pub async fn shutdown(self, grace: Duration) -> bool {
        for task in &self.accept_tasks {
            task.abort();
        }

        // Every permit back means no stream task is still running.
        match tokio::time::timeout(grace, self.stream_limit.acquire_many(self.max_streams)).await
        {
            Ok(Ok(_permits)) => true,
            Ok(Err(_)) | Err(_) => false,
        }
    }
}

/// Accept connections on one listener until the task is aborted.
async fn accept_loop(
    listener: TcpListener,
    handlers: Arc<HandlerTable>,
    stream_limit: Arc<Semaphore>,
) {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                debug!(peer = %peer, "New connection");

                // Wait for a stream slot; the listener backlog holds the rest
                let permit = match Arc::clone(&stream_limit).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };

                let handlers = Arc::clone(&handlers);

                tokio::spawn(async move {
                    if let Err(e) = serve_connection(socket, peer, &handlers).await {
                        debug!(peer = %peer, error = %e, "Protocol selection failed");
                    }
                    drop(permit);
                });
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}

/// Run protocol selection on a fresh connection and hand it to the handler.
async fn serve_connection(
    socket: TcpStream,
    peer: SocketAddr,
    handlers: &HandlerTable,
) -> io::Result<()> {
    let mut reader = BufReader::new(socket);
    let protocol = read_protocol_line(&mut reader).await?;

    let Some((&protocol, handler)) = handlers.get_key_value(protocol.as_str()) else {
        debug!(peer = %peer, protocol = %protocol, "No handler for protocol");
        reader.write_all(NOT_AVAILABLE).await?;
        reader.shutdown().await?;
        return Ok(());
    };

    reader.write_all(protocol.as_bytes()).await?;
    reader.write_all(b"\n").await?;
    reader.flush().await?;

    let stream = StreamGuard::new(Box::new(TcpProtocolStream { inner: reader }));
    let span = info_span!("stream", protocol, peer = %peer);
    handler(stream).instrument(span).await;
    Ok(())
}

/// Read the `<protocol-id>\n` selection line.
async fn read_protocol_line<R>(reader: &mut R) -> io::Result<String>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut line = Vec::with_capacity(64);
    (&mut *reader)
        .take(MAX_PROTOCOL_LINE as u64)
        .read_until(b'\n', &mut line)
        .await?;

    if line.pop() != Some(b'\n') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "missing or oversized protocol selection line",
        ));
    }

    String::from_utf8(line).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Format a bound address the way peers dial it.
fn format_multiaddr(addr: SocketAddr) -> String {
    match addr {
        SocketAddr::V4(v4) => format!("/ip4/{}/tcp/{}", v4.ip(), v4.port()),
        SocketAddr::V6(v6) => format!("/ip6/{}/tcp/{}", v6.ip(), v6.port()),
    }
}

fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}

/// A TCP connection after protocol selection.
///
/// Wraps the selection reader so request bytes it already buffered are
/// still delivered to the handler.
struct TcpProtocolStream {
    inner: BufReader<TcpStream>,
}

impl ProtocolStream for TcpProtocolStream {
    fn reset(&mut self) {
        let socket = socket2::SockRef::from(self.inner.get_ref());
        if let Err(e) = socket.set_linger(Some(Duration::ZERO)) {
            debug!(error = %e, "Failed to arm stream reset");
        }
    }
}

impl AsyncRead for TcpProtocolStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TcpProtocolStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
