//! Hello protocol implementation.
//!
//! A connectivity check between peers:
//! - Client sends: a single CBOR text string
//! - Server logs the text and closes the stream, sending nothing back
//!
//! ## Protocol Format
//!
//! ```text
//! Request:  CBOR text string, e.g. "Hello"
//! Response: none
//! ```

pub mod handler;
pub mod parser;

pub use handler::handle_stream;
