//! # keyfob-proto
//!
//! The rolling authentication protocol and the tag I/O boundary.
//!
//! ```text
//! Idle ──> Creating ──> {CreateSucceeded | CreateFailed} ──ack──> Idle
//!
//! Idle ──> Verifying ──┬─> VerifySucceeded ──> Advancing ──> {AdvanceSucceeded
//!                      │                                      | AdvanceFailed}
//!                      └─> VerifyFailed                            │
//!                              └──────────────ack─────────────────┴──> Idle
//! ```
//!
//! Physical reads and writes are asynchronous: a request is issued,
//! control returns immediately, and completion arrives later as a
//! [`TagIoEvent`]. Only one physical operation is outstanding at a time,
//! and the verify→advance write-back is never issued from inside a read
//! completion — it crosses a single-slot channel to a separate writer
//! task (see [`handoff`]).

pub mod handoff;
pub mod protocol;
pub mod tagio;

#[cfg(test)]
pub(crate) mod mock;

pub use handoff::verify_then_advance;
pub use protocol::{
    AdvanceOutcome, Canceller, CreateOutcome, ProtocolState, RollingProtocol, VerifiedSession,
    VerifyOutcome,
};
pub use tagio::{TagIo, TagIoEvent};

/// Result type for keyfob-proto operations
pub type Result<T> = std::result::Result<T, ProtoError>;

/// Errors that can occur while driving the protocol
#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    #[error("hardware failure: {0}")]
    HardwareFailure(String),

    #[error("card removed before the operation finished")]
    CardRemoved,

    #[error("tag value does not match chain index {index}")]
    Mismatch { index: u8 },

    #[error("chain exhausted at its last index; the card must be re-created")]
    ChainExhausted,

    #[error("no verified record to advance")]
    NoVerifiedRecord,

    #[error("operation cancelled")]
    Cancelled,

    #[error("another operation is in progress")]
    Busy,

    #[error(transparent)]
    Store(#[from] keyfob_store::StoreError),

    #[error(transparent)]
    Codec(#[from] keyfob_core::Error),
}
