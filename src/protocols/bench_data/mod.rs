//! Bench-data protocol implementation.
//!
//! A throughput benchmark with a reproducible payload:
//! - Client sends: a CBOR map `{"datasize": N}`
//! - Server responds: exactly N raw bytes, then closes the stream
//!
//! ## Use Cases
//!
//! 1. **Throughput testing**: Measure how fast a transport moves bytes from
//!    server to client, with no storage or computation in the way.
//!
//! 2. **Correctness validation**: The payload comes from a generator seeded
//!    with a fixed value, so a client can regenerate it locally and compare.
//!
//! ## Protocol Format
//!
//! ```text
//! Request:  CBOR map, at least {"datasize": <unsigned integer>}
//!           other keys are ignored
//! Response: <datasize bytes of seeded pseudorandom data>, no framing
//! ```
//!
//! A request that does not decode, lacks `datasize`, or carries a
//! non-integer or negative `datasize` gets its stream reset with no bytes
//! written.

pub mod handler;
pub mod parser;
pub mod payload;

pub use handler::handle_stream;
