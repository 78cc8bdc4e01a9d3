//! Bench-data stream handler.

use bytes::BytesMut;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use super::parser::parse_request;
use super::payload::{chunk_len, PayloadGenerator};
use crate::host::StreamGuard;
use crate::protocols::{codec, finish, with_timeout, ProtocolError, ProtocolSettings};

/// Handle one bench-data stream.
///
/// Decodes the request, streams the payload back and settles the stream:
/// reset if the request was bad, closed otherwise.
pub async fn handle_stream(mut stream: StreamGuard, settings: Arc<ProtocolSettings>) {
    let result = serve(stream.io(), &settings).await;
    if let Err(e) = &result {
        debug!(error = %e, "Bench-data stream aborted");
    }
    finish(stream, &result).await;
}

async fn serve<S>(stream: &mut S, settings: &ProtocolSettings) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let value = codec::read_value(stream, settings).await?;
    let request = parse_request(&value)?;

    let written = write_payload(stream, request.size, settings).await?;
    info!(bytes = written, "wrote {} bytes", written);
    Ok(())
}

/// Write the `size`-byte payload in order, one chunk at a time.
///
/// Returns the number of bytes written.
pub async fn write_payload<W>(
    writer: &mut W,
    size: u64,
    settings: &ProtocolSettings,
) -> Result<u64, ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let mut generator = PayloadGenerator::new(size);
    let mut buf = BytesMut::zeroed(chunk_len(size, settings.chunk_size));
    let mut written = 0u64;

    while !generator.is_done() {
        let chunk = generator.next_chunk(&mut buf);
        with_timeout(settings.stream_timeout, writer.write_all(chunk))
            .await
            .map_err(ProtocolError::Write)?;
        written += chunk.len() as u64;
    }

    with_timeout(settings.stream_timeout, writer.flush())
        .await
        .map_err(ProtocolError::Write)?;

    Ok(written)
}
