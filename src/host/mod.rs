//! Host substrate interface.
//!
//! The protocol handlers only need two things from the peer-to-peer layer:
//! a way to register a handler under a protocol identifier, and a byte
//! stream they can read, write, close and reset. Everything else
//! (transports, multiplexing, identity) lives behind these traits.
//!
//! - `tcp`: minimal TCP substrate used by the binary
//! - `memory`: in-process streams for tests

pub mod tcp;

#[cfg(test)]
pub mod memory;

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

pub use tcp::TcpHost;

/// A bidirectional stream opened by a remote peer for one protocol.
///
/// Graceful close is the write-side shutdown from `AsyncWrite`;
/// `reset` is the abortive counterpart.
pub trait ProtocolStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    /// Abort the stream. The peer observes an abnormal termination.
    fn reset(&mut self);
}

pub type BoxStream = Box<dyn ProtocolStream>;

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Handler invoked once per inbound stream.
pub type StreamHandler = Arc<dyn Fn(StreamGuard) -> BoxFuture + Send + Sync>;

/// Registration surface a host exposes to the protocol layer.
pub trait Host {
    /// Bind `handler` to inbound streams negotiated for `protocol`.
    fn register_handler(&mut self, protocol: &'static str, handler: StreamHandler);

    /// Addresses peers can reach this process on, for operator display.
    fn addrs(&self) -> Vec<String>;
}

/// Owns a stream for the lifetime of one handler invocation.
///
/// `close` and `reset` consume the guard, so a stream is settled at most
/// once. A guard dropped unsettled (early return, panic) resets.
pub struct StreamGuard {
    stream: BoxStream,
    settled: bool,
}

impl StreamGuard {
    pub fn new(stream: BoxStream) -> Self {
        Self {
            stream,
            settled: false,
        }
    }

    /// Borrow the underlying stream for reads and writes.
    pub fn io(&mut self) -> &mut BoxStream {
        &mut self.stream
    }

    /// Gracefully close the stream.
    pub async fn close(mut self) -> io::Result<()> {
        self.settled = true;
        self.stream.shutdown().await
    }

    /// Abort the stream.
    pub fn reset(mut self) {
        self.settled = true;
        self.stream.reset();
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.stream.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::{self, Termination};
    use super::*;

    #[tokio::test]
    async fn test_close_settles_once() {
        let (stream, _remote, probe) = memory::pair(64);
        let guard = StreamGuard::new(Box::new(stream));
        guard.close().await.unwrap();
        assert_eq!(probe.events(), vec![Termination::Closed]);
    }

    #[tokio::test]
    async fn test_reset_settles_once() {
        let (stream, _remote, probe) = memory::pair(64);
        StreamGuard::new(Box::new(stream)).reset();
        assert_eq!(probe.events(), vec![Termination::Reset]);
    }

    #[tokio::test]
    async fn test_drop_unsettled_resets() {
        let (stream, _remote, probe) = memory::pair(64);
        {
            let _guard = StreamGuard::new(Box::new(stream));
        }
        assert_eq!(probe.events(), vec![Termination::Reset]);
    }
}
