//! Hello stream handler.

use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{debug, info};

use super::parser::{parse_greeting, Greeting};
use crate::host::StreamGuard;
use crate::protocols::{codec, finish, ProtocolError, ProtocolSettings};

/// Handle one hello stream: log the greeting, reply with nothing.
pub async fn handle_stream(mut stream: StreamGuard, settings: Arc<ProtocolSettings>) {
    let result = serve(stream.io(), &settings).await;
    if let Err(e) = &result {
        debug!(error = %e, "Hello stream aborted");
    }
    finish(stream, &result).await;
}

async fn serve<R>(stream: &mut R, settings: &ProtocolSettings) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let greeting = read_greeting(stream, settings).await?;
    info!(text = %greeting.text, "Received greeting");
    Ok(())
}

async fn read_greeting<R>(stream: &mut R, settings: &ProtocolSettings) -> Result<Greeting, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let value = codec::read_value(stream, settings).await?;
    parse_greeting(value)
}
