//! Tag I/O boundary
//!
//! The physical read/write/emulate capability is an external
//! collaborator: a request is issued, control returns, and results arrive
//! later as events. Implementations sit on real hardware; tests use a
//! scripted adapter.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;

/// Completion and sense notifications for one outstanding operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagIoEvent {
    /// A card entered the field.
    SenseStart,
    /// The card left the field.
    SenseEnd,
    /// Read finished with the raw payload.
    ReadDone(Vec<u8>),
    /// Write acknowledged by the tag.
    WriteOk,
    /// The operation failed in hardware.
    Failed(String),
}

/// Asynchronous raw-byte access to a physical tag.
///
/// At most one operation is outstanding at a time; the protocol enforces
/// this, adapters may assume it.
#[async_trait]
pub trait TagIo: Send + Sync {
    /// Begin a read cycle. Events arrive on the returned channel until
    /// `ReadDone` or `Failed`.
    async fn read_start(&self) -> Result<mpsc::UnboundedReceiver<TagIoEvent>>;

    /// Begin writing `payload`. Events arrive until `WriteOk` or `Failed`.
    async fn write_start(&self, payload: Vec<u8>) -> Result<mpsc::UnboundedReceiver<TagIoEvent>>;

    /// Start re-emitting `payload` over the air until [`TagIo::stop`].
    async fn emulate_start(&self, payload: Vec<u8>) -> Result<()>;

    /// Stop whatever operation is outstanding.
    async fn stop(&self) -> Result<()>;
}
