//! In-process stream substrate for handler tests.
//!
//! A `MemoryStream` is one half of a `tokio::io::duplex` pair that records
//! how it was terminated, so tests can assert the close-or-reset contract.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

use super::ProtocolStream;

/// How a stream was terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Closed,
    Reset,
}

/// Handle for observing termination events after the stream is gone.
#[derive(Clone, Default)]
pub struct StreamProbe {
    events: Arc<Mutex<Vec<Termination>>>,
}

impl StreamProbe {
    pub fn events(&self) -> Vec<Termination> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: Termination) {
        self.events.lock().unwrap().push(event);
    }
}

/// Handler side of an in-memory stream.
pub struct MemoryStream {
    inner: Option<DuplexStream>,
    probe: StreamProbe,
}

/// Create a stream pair: the handler side, the remote peer side, and a
/// probe recording how the handler side was terminated.
pub fn pair(capacity: usize) -> (MemoryStream, DuplexStream, StreamProbe) {
    let (local, remote) = tokio::io::duplex(capacity);
    let probe = StreamProbe::default();
    let stream = MemoryStream {
        inner: Some(local),
        probe: probe.clone(),
    };
    (stream, remote, probe)
}

fn reset_error() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionReset, "stream was reset")
}

impl ProtocolStream for MemoryStream {
    fn reset(&mut self) {
        self.probe.record(Termination::Reset);
        // Dropping our half makes the remote see EOF and its writes fail.
        self.inner = None;
    }
}

impl AsyncRead for MemoryStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.inner.as_mut() {
            Some(inner) => Pin::new(inner).poll_read(cx, buf),
            None => Poll::Ready(Err(reset_error())),
        }
    }
}

impl AsyncWrite for MemoryStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.inner.as_mut() {
            Some(inner) => Pin::new(inner).poll_write(cx, buf),
            None => Poll::Ready(Err(reset_error())),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.inner.as_mut() {
            Some(inner) => Pin::new(inner).poll_flush(cx),
            None => Poll::Ready(Err(reset_error())),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = &mut *self;
        match this.inner.as_mut() {
            Some(inner) => {
                let result = Pin::new(inner).poll_shutdown(cx);
                if result.is_ready() {
                    this.probe.record(Termination::Closed);
                }
                result
            }
            None => Poll::Ready(Err(reset_error())),
        }
    }
}
