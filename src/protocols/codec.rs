//! Self-describing request decoding.
//!
//! Requests are a single CBOR value. The reader accumulates stream bytes and
//! retries the parse after every read, stopping at the first complete value,
//! so it never waits for input past the end of the request.

use bytes::BytesMut;
use ciborium::Value;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use super::{with_timeout, ProtocolError, ProtocolSettings};

/// Bytes requested from the stream per read.
const READ_CHUNK: usize = 4096;

/// Parse result.
#[derive(Debug)]
pub enum ParseResult {
    /// A complete value and the number of bytes it occupied.
    Complete(Value, usize),
    /// The value is truncated; more input is needed.
    Incomplete,
    /// The input can never form a valid value.
    Error(String),
}

/// Parse one CBOR value from the start of `input`.
pub fn parse(input: &[u8]) -> ParseResult {
    if input.is_empty() {
        return ParseResult::Incomplete;
    }

    let mut remaining = input;
    match ciborium::de::from_reader::<Value, _>(&mut remaining) {
        Ok(value) => ParseResult::Complete(value, input.len() - remaining.len()),
        Err(ciborium::de::Error::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
            ParseResult::Incomplete
        }
        Err(e) => ParseResult::Error(e.to_string()),
    }
}

/// Read exactly one value from `reader`.
///
/// Fails with `ProtocolError::Decode` on malformed input, on EOF before a
/// complete value, on read errors, and when the value would exceed
/// `max_request_size`.
pub async fn read_value<R>(reader: &mut R, settings: &ProtocolSettings) -> Result<Value, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let max_size = settings.max_request_size;
    let mut buffer = BytesMut::with_capacity(READ_CHUNK.min(max_size));

    loop {
        match parse(&buffer) {
            ParseResult::Complete(value, consumed) => {
                trace!(bytes = consumed, "Decoded request");
                return Ok(value);
            }
            ParseResult::Error(e) => return Err(ProtocolError::Decode(e)),
            ParseResult::Incomplete => {}
        }

        let budget = max_size - buffer.len();
        if budget == 0 {
            return Err(ProtocolError::Decode(format!(
                "request exceeds {} bytes",
                max_size
            )));
        }
        buffer.reserve(READ_CHUNK.min(budget));

        let n = with_timeout(
            settings.stream_timeout,
            (&mut *reader).take(budget as u64).read_buf(&mut buffer),
        )
        .await
        .map_err(|e| ProtocolError::Decode(e.to_string()))?;

        if n == 0 {
            return Err(ProtocolError::Decode(if buffer.is_empty() {
                "empty request".to_string()
            } else {
                "stream ended inside request".to_string()
            }));
        }
    }
}

/// Short name of a value's type, for error messages.
pub fn kind(value: &Value) -> &'static str {
    match value {
        Value::Integer(_) => "integer",
        Value::Float(_) => "float",
        Value::Text(_) => "text",
        Value::Bytes(_) => "bytes",
        Value::Bool(_) => "bool",
        Value::Null => "null",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
        _ => "tagged value",
    }
}

/// Encode a value, as a remote peer would.
#[cfg(test)]
pub(crate) fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out).unwrap();
    out
}
