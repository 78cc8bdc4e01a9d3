//! Protocol implementations.
//!
//! Each protocol has a parser module that turns a decoded request value into
//! a typed request, and a handler module that drives one stream to
//! completion.
//!
//! - `hello`: logs a greeting string, no reply
//! - `bench_data`: streams a requested number of deterministic bytes back
//!
//! Both share the self-describing value decoder in `codec`.

pub mod bench_data;
pub mod codec;
pub mod hello;

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::host::{BoxFuture, Host, StreamGuard};

/// Protocol identifier for the bench-data protocol.
pub const BENCH_DATA_PROTOCOL: &str = "/bench/data";

/// Protocol identifier for the hello protocol.
pub const HELLO_PROTOCOL: &str = "/test/hello";

/// Settings shared read-only by every stream handler.
#[derive(Debug, Clone)]
pub struct ProtocolSettings {
    /// Largest encoded request accepted, in bytes.
    pub max_request_size: usize,
    /// Payload bytes generated and written per write call.
    pub chunk_size: usize,
    /// Deadline for each individual read or write, if any.
    pub stream_timeout: Option<Duration>,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            max_request_size: 64 * 1024,
            chunk_size: 64 * 1024,
            stream_timeout: None,
        }
    }
}

/// Per-stream protocol failures.
///
/// None of these are fatal to the process; the handler settles its own
/// stream and returns.
#[derive(Debug)]
pub enum ProtocolError {
    /// Malformed, truncated, oversized or wrongly shaped request.
    Decode(String),
    /// A required map key is absent.
    FieldMissing(&'static str),
    /// A field is present but does not have the expected type or range.
    FieldType {
        field: &'static str,
        expected: &'static str,
        found: String,
    },
    /// Delivering the response failed.
    Write(io::Error),
}

impl ProtocolError {
    /// Whether the stream should be reset rather than closed.
    ///
    /// After a write failure the peer may already be gone, so the stream is
    /// only closed.
    pub fn resets_stream(&self) -> bool {
        !matches!(self, ProtocolError::Write(_))
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::Decode(msg) => write!(f, "Failed to decode request: {}", msg),
            ProtocolError::FieldMissing(field) => write!(f, "Missing field: {}", field),
            ProtocolError::FieldType {
                field,
                expected,
                found,
            } => write!(f, "Field {} should be {}, found {}", field, expected, found),
            ProtocolError::Write(e) => write!(f, "Failed to write response: {}", e),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProtocolError::Write(e) => Some(e),
            _ => None,
        }
    }
}

/// Register every protocol handler on `host`.
pub fn register_all<H: Host>(host: &mut H, settings: Arc<ProtocolSettings>) {
    let bench_settings = Arc::clone(&settings);
    host.register_handler(
        BENCH_DATA_PROTOCOL,
        Arc::new(move |stream: StreamGuard| -> BoxFuture {
            Box::pin(bench_data::handle_stream(stream, Arc::clone(&bench_settings)))
        }),
    );

    host.register_handler(
        HELLO_PROTOCOL,
        Arc::new(move |stream: StreamGuard| -> BoxFuture {
            Box::pin(hello::handle_stream(stream, Arc::clone(&settings)))
        }),
    );
}

/// Settle a stream according to how its handler finished.
///
/// Decode and validation failures reset; success and write failures close.
async fn finish(stream: StreamGuard, result: &Result<(), ProtocolError>) {
    match result {
        Err(e) if e.resets_stream() => stream.reset(),
        _ => {
            if let Err(e) = stream.close().await {
                debug!(error = %e, "Failed to close stream");
            }
        }
    }
}

/// Run a stream operation under an optional deadline.
pub(crate) async fn with_timeout<T, F>(limit: Option<Duration>, operation: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, operation)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "stream operation timed out"))?,
        None => operation.await,
    }
}
