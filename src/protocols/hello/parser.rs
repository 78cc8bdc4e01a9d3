//! Hello request parser.

use ciborium::Value;

use crate::protocols::codec;
use crate::protocols::ProtocolError;

/// Parsed hello request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    pub text: String,
}

/// Extract a `Greeting` from a decoded value. Only a bare text string is
/// accepted.
pub fn parse_greeting(value: Value) -> Result<Greeting, ProtocolError> {
    match value {
        Value::Text(text) => Ok(Greeting { text }),
        other => Err(ProtocolError::Decode(format!(
            "expected text, found {}",
            codec::kind(&other)
        ))),
    }
}
