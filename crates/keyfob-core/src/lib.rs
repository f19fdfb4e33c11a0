//! # keyfob-core
//!
//! Pure primitives for the keyfob rolling-credential toolkit: one-way hash
//! chain generation, the fixed-width credential record codec, the 5-byte
//! tag payload framing, and the offset rewrite transform.
//!
//! Everything here is synchronous and allocation-light. Durable storage
//! lives in `keyfob-store`; tag I/O and the protocol state machine live in
//! `keyfob-proto`.

pub mod chain;
pub mod offset;
pub mod record;

pub use chain::{HashChainGenerator, CHAIN_LEN, SEED_LEN};
pub use offset::{OffsetCipher, OFFSET_PAYLOAD_LEN};
pub use record::{HashChainRecord, TagPayload, MAX_CHAIN_INDEX, RECORD_LEN, TAG_PAYLOAD_LEN};

/// Result type for keyfob-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in keyfob-core
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("record is {got} bytes, expected {expected}")]
    RecordLength { expected: usize, got: usize },

    #[error("chain index {0} is out of range")]
    IndexOutOfRange(u8),

    #[error("card id 0 is reserved")]
    ReservedCardId,

    #[error("tag payload is {got} bytes, expected {expected}")]
    PayloadLength { expected: usize, got: usize },
}
