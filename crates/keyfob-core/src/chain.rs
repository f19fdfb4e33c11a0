//! One-way hash chain
//!
//! ```text
//! seed ──H──> chain[99] ──H──> chain[98] ──H──> ... ──H──> chain[0]
//! ```
//!
//! `chain[99]` is one hash application away from the seed; `chain[0]` is a
//! hundred. Cards consume the chain from index 0 upward, so the values
//! revealed first are the deepest: computing a not-yet-revealed value from
//! an observed one requires inverting H, which is what makes a captured
//! value useless for replay.
//!
//! H is MD5 over a fixed 16-byte buffer, input zero-padded; each chain
//! value is the first four digest bytes, little-endian.

use md5::{Digest, Md5};

/// Number of values in one chain.
pub const CHAIN_LEN: usize = 100;

/// Size of the hash input buffer; shorter inputs are zero-padded.
pub const SEED_LEN: usize = 16;

pub struct HashChainGenerator;

impl HashChainGenerator {
    /// Derive a full chain from a seed.
    ///
    /// The seed must be fresh per card; freshness is the caller's
    /// precondition, not enforced here.
    pub fn generate(seed: &[u8]) -> [u32; CHAIN_LEN] {
        let mut chain = [0u32; CHAIN_LEN];
        let mut value = Self::step(seed);
        chain[CHAIN_LEN - 1] = value;
        for i in (0..CHAIN_LEN - 1).rev() {
            value = Self::step(&value.to_le_bytes());
            chain[i] = value;
        }
        chain
    }

    /// One application of H: zero-pad the input to the buffer size, hash,
    /// take the first four digest bytes little-endian.
    pub fn step(input: &[u8]) -> u32 {
        let mut buf = [0u8; SEED_LEN];
        let take = input.len().min(SEED_LEN);
        buf[..take].copy_from_slice(&input[..take]);
        let digest = Md5::digest(buf);
        u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
    }

    /// Seed material for a new card: wall-clock millis plus OS randomness.
    pub fn fresh_seed() -> [u8; SEED_LEN] {
        let mut seed = [0u8; SEED_LEN];
        let millis = chrono::Utc::now().timestamp_millis();
        seed[..8].copy_from_slice(&millis.to_le_bytes());
        let noise: u64 = rand::random();
        seed[8..].copy_from_slice(&noise.to_le_bytes());
        seed
    }
}
