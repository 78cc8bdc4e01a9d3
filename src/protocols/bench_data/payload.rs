//! Deterministic payload generation.
//!
//! Every response starts from a generator seeded with `PAYLOAD_SEED`, so two
//! requests for the same size get identical bytes. The sequence is
//! guessable and must not be used for anything but benchmarking.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seed for every payload.
pub const PAYLOAD_SEED: u64 = 42;

/// Produces the payload for one request, chunk by chunk.
///
/// Chunks whose lengths are multiples of 8 concatenate to the same sequence
/// regardless of how the payload is split.
pub struct PayloadGenerator {
    rng: ChaCha8Rng,
    remaining: u64,
}

impl PayloadGenerator {
    /// Start a fresh payload of `size` bytes.
    pub fn new(size: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(PAYLOAD_SEED),
            remaining: size,
        }
    }

    pub fn is_done(&self) -> bool {
        self.remaining == 0
    }

    /// Fill the front of `buf` with the next bytes and return them.
    ///
    /// Returns an empty slice once the payload is exhausted.
    pub fn next_chunk<'a>(&mut self, buf: &'a mut [u8]) -> &'a [u8] {
        let len = usize::try_from(self.remaining).map_or(buf.len(), |r| r.min(buf.len()));
        let chunk = &mut buf[..len];
        self.rng.fill_bytes(chunk);
        self.remaining -= len as u64;
        chunk
    }
}

/// Buffer length for writing a payload of `size` bytes in `chunk_size` pieces.
pub fn chunk_len(size: u64, chunk_size: usize) -> usize {
    usize::try_from(size).map_or(chunk_size, |s| s.min(chunk_size))
}
