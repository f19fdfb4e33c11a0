//! Rolling authentication protocol
//!
//! Orchestrates create, verify and advance over the chain generator, the
//! identifier allocator, the credential store and the tag adapter. Every
//! failure ends in a terminal outcome state; nothing retries on its own,
//! and a terminal state is left only by explicit acknowledgement.

use std::sync::Arc;

use keyfob_core::{
    HashChainGenerator, HashChainRecord, OffsetCipher, TagPayload, OFFSET_PAYLOAD_LEN,
};
use keyfob_store::{CredentialStore, IdentifierAllocator};
use serde::Serialize;
use tokio::sync::watch;

use crate::tagio::{TagIo, TagIoEvent};
use crate::{ProtoError, Result};

/// Where the protocol currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProtocolState {
    Idle,
    Creating,
    Verifying,
    Advancing,
    Emulating,
    CreateSucceeded,
    CreateFailed,
    VerifySucceeded,
    VerifyFailed,
    AdvanceSucceeded,
    AdvanceFailed,
}

impl ProtocolState {
    /// Outcome states waiting for operator acknowledgement.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::CreateSucceeded
                | Self::CreateFailed
                | Self::VerifySucceeded
                | Self::VerifyFailed
                | Self::AdvanceSucceeded
                | Self::AdvanceFailed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CreateOutcome {
    Succeeded { card_id: u8, first_value: u32 },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum VerifyOutcome {
    Succeeded { card_id: u8, matched_value: u32 },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AdvanceOutcome {
    Succeeded { next_value: u32 },
    Failed { reason: String },
}

/// The record checked out by a successful verify.
///
/// Owned by exactly one holder for the duration of one verify→advance
/// pair; dropped on any terminal outcome.
#[derive(Debug)]
pub struct VerifiedSession {
    pub(crate) record: HashChainRecord,
}

impl VerifiedSession {
    pub fn card_id(&self) -> u8 {
        self.record.card_id
    }

    pub fn current_index(&self) -> u8 {
        self.record.current_index
    }

    pub fn matched_value(&self) -> u32 {
        self.record.current_value()
    }
}

/// Requests cancellation of the outstanding physical operation.
#[derive(Clone)]
pub struct Canceller(Arc<watch::Sender<u64>>);

impl Canceller {
    pub fn cancel(&self) {
        self.0.send_modify(|generation| *generation += 1);
    }
}

pub struct RollingProtocol {
    tag: Arc<dyn TagIo>,
    store: CredentialStore,
    allocator: IdentifierAllocator,
    state: ProtocolState,
    session: Option<VerifiedSession>,
    cancel: Arc<watch::Sender<u64>>,
}

impl RollingProtocol {
    pub fn new(
        tag: Arc<dyn TagIo>,
        store: CredentialStore,
        allocator: IdentifierAllocator,
    ) -> Self {
        let (cancel, _) = watch::channel(0u64);
        Self {
            tag,
            store,
            allocator,
            state: ProtocolState::Idle,
            session: None,
            cancel: Arc::new(cancel),
        }
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// A handle that cancels whatever operation is outstanding.
    pub fn canceller(&self) -> Canceller {
        Canceller(self.cancel.clone())
    }

    /// Operator acknowledgement: leave a terminal outcome state and
    /// release any checked-out record.
    pub fn acknowledge(&mut self) {
        if self.state.is_terminal() {
            self.session = None;
            self.state = ProtocolState::Idle;
        }
    }

    // === Create ===

    /// Provision a brand-new card: fresh chain, fresh identifier, first
    /// value written to the tag, record persisted.
    pub async fn create(&mut self) -> CreateOutcome {
        if self.state != ProtocolState::Idle {
            return CreateOutcome::Failed {
                reason: ProtoError::Busy.to_string(),
            };
        }
        self.state = ProtocolState::Creating;
        match self.run_create().await {
            Ok((card_id, first_value)) => {
                self.state = ProtocolState::CreateSucceeded;
                tracing::info!(card_id, "card created");
                CreateOutcome::Succeeded {
                    card_id,
                    first_value,
                }
            }
            Err(e) => {
                self.state = ProtocolState::CreateFailed;
                tracing::warn!("create failed: {e}");
                CreateOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn run_create(&mut self) -> Result<(u8, u32)> {
        self.allocator.ensure_table_exists()?;
        let seed = HashChainGenerator::fresh_seed();
        let chain = HashChainGenerator::generate(&seed);
        // An id that fails later stays allocated; the table never shrinks
        // on a failed create.
        let card_id = self.allocator.allocate()?;
        let record = HashChainRecord::new(card_id, chain)?;
        self.exchange_write(record.current_payload().encode().to_vec())
            .await?;
        // The tag already holds the first value here; a persist failure
        // leaves the tag ahead of the store and is reported as a failure.
        self.store.create(&record)?;
        Ok((card_id, record.current_value()))
    }

    // === Verify ===

    /// Read the tag and check its value against the stored record.
    pub async fn verify(&mut self) -> VerifyOutcome {
        if self.state != ProtocolState::Idle {
            return VerifyOutcome::Failed {
                reason: ProtoError::Busy.to_string(),
            };
        }
        self.state = ProtocolState::Verifying;
        match self.run_verify().await {
            Ok(session) => {
                let outcome = VerifyOutcome::Succeeded {
                    card_id: session.card_id(),
                    matched_value: session.matched_value(),
                };
                tracing::info!(
                    card_id = session.card_id(),
                    index = session.current_index(),
                    "tag verified"
                );
                self.session = Some(session);
                self.state = ProtocolState::VerifySucceeded;
                outcome
            }
            Err(e) => {
                self.state = ProtocolState::VerifyFailed;
                tracing::warn!("verify failed: {e}");
                VerifyOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn run_verify(&mut self) -> Result<VerifiedSession> {
        let bytes = self.exchange_read().await?;
        let payload = TagPayload::decode(&bytes)?;
        let record = self.store.read(payload.card_id)?;
        if payload.value != record.current_value() {
            return Err(ProtoError::Mismatch {
                index: record.current_index,
            });
        }
        Ok(VerifiedSession { record })
    }

    /// Take the checked-out record for an externally driven advance (the
    /// verify→advance hand-off). The protocol stays in `VerifySucceeded`
    /// until the advance outcome is recorded.
    pub fn take_session(&mut self) -> Option<VerifiedSession> {
        self.session.take()
    }

    // === Advance ===

    /// Roll the verified card one chain position forward: write the next
    /// value to the tag, then persist the new index.
    pub async fn advance(&mut self) -> AdvanceOutcome {
        if self.state != ProtocolState::VerifySucceeded {
            return AdvanceOutcome::Failed {
                reason: ProtoError::Busy.to_string(),
            };
        }
        let Some(session) = self.session.take() else {
            return AdvanceOutcome::Failed {
                reason: ProtoError::NoVerifiedRecord.to_string(),
            };
        };
        self.state = ProtocolState::Advancing;
        let result = advance_session(
            self.tag.clone(),
            self.store.clone(),
            self.cancel.subscribe(),
            session,
        )
        .await;
        match result {
            Ok(next_value) => {
                self.state = ProtocolState::AdvanceSucceeded;
                AdvanceOutcome::Succeeded { next_value }
            }
            Err(e) => {
                self.state = ProtocolState::AdvanceFailed;
                tracing::warn!("advance failed: {e}");
                AdvanceOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    // === Generic tag operations ===

    /// One raw read cycle, outside the credential machinery.
    pub async fn read_raw(&mut self) -> Result<Vec<u8>> {
        if self.state != ProtocolState::Idle {
            return Err(ProtoError::Busy);
        }
        self.exchange_read().await
    }

    /// The generic rewrite path: read the 8-byte payload, add `offset`
    /// with carry, write the transformed payload back. Returns what was
    /// written.
    pub async fn rewrite_with_offset(&mut self, offset: u8) -> Result<[u8; OFFSET_PAYLOAD_LEN]> {
        if self.state != ProtocolState::Idle {
            return Err(ProtoError::Busy);
        }
        let bytes = self.exchange_read().await?;
        let payload: [u8; OFFSET_PAYLOAD_LEN] =
            bytes.as_slice().try_into().map_err(|_| {
                keyfob_core::Error::PayloadLength {
                    expected: OFFSET_PAYLOAD_LEN,
                    got: bytes.len(),
                }
            })?;
        let rewritten = OffsetCipher::apply(payload, offset);
        self.exchange_write(rewritten.to_vec()).await?;
        tracing::info!(offset, "rewrote tag payload");
        Ok(rewritten)
    }

    /// Start re-emitting a stored payload over the air.
    pub async fn emulate(&mut self, payload: Vec<u8>) -> Result<()> {
        if self.state != ProtocolState::Idle {
            return Err(ProtoError::Busy);
        }
        self.tag.emulate_start(payload).await?;
        self.state = ProtocolState::Emulating;
        Ok(())
    }

    pub async fn stop_emulation(&mut self) -> Result<()> {
        if self.state == ProtocolState::Emulating {
            self.tag.stop().await?;
            self.state = ProtocolState::Idle;
        }
        Ok(())
    }

    // === Internals ===

    pub(crate) fn handoff_parts(
        &self,
    ) -> (Arc<dyn TagIo>, CredentialStore, watch::Receiver<u64>) {
        (self.tag.clone(), self.store.clone(), self.cancel.subscribe())
    }

    pub(crate) fn record_advance_outcome(&mut self, outcome: &AdvanceOutcome) {
        self.state = match outcome {
            AdvanceOutcome::Succeeded { .. } => ProtocolState::AdvanceSucceeded,
            AdvanceOutcome::Failed { .. } => ProtocolState::AdvanceFailed,
        };
    }

    async fn exchange_read(&self) -> Result<Vec<u8>> {
        let mut cancel = self.cancel.subscribe();
        pump_read(&*self.tag, &mut cancel).await
    }

    async fn exchange_write(&self, payload: Vec<u8>) -> Result<()> {
        let mut cancel = self.cancel.subscribe();
        pump_write(&*self.tag, &mut cancel, payload).await
    }
}

/// The advance step, independent of the protocol object so the hand-off
/// writer task can run it on its own.
pub(crate) async fn advance_session(
    tag: Arc<dyn TagIo>,
    store: CredentialStore,
    mut cancel: watch::Receiver<u64>,
    session: VerifiedSession,
) -> Result<u32> {
    let mut record = session.record;
    if record.is_exhausted() {
        // Position 99 is terminal. A fresh chain and identifier come from
        // a full re-create, not a new value under the same id.
        return Err(ProtoError::ChainExhausted);
    }
    record.current_index += 1;
    let payload = record.current_payload().encode();
    pump_write(&*tag, &mut cancel, payload.to_vec()).await?;
    // Persist only after the tag acknowledged the write; on failure the
    // store keeps expecting the un-advanced value.
    store.update(&record)?;
    tracing::info!(
        card_id = record.card_id,
        index = record.current_index,
        "card advanced"
    );
    Ok(record.current_value())
}

async fn pump_read(tag: &dyn TagIo, cancel: &mut watch::Receiver<u64>) -> Result<Vec<u8>> {
    let mut events = tag.read_start().await?;
    let mut cancellable = true;
    loop {
        tokio::select! {
            changed = cancel.changed(), if cancellable => {
                if changed.is_err() {
                    cancellable = false;
                    continue;
                }
                let _ = tag.stop().await;
                return Err(ProtoError::Cancelled);
            }
            event = events.recv() => match event {
                Some(TagIoEvent::SenseStart) => {
                    tracing::debug!("card entered the field");
                }
                Some(TagIoEvent::ReadDone(bytes)) => return Ok(bytes),
                Some(TagIoEvent::SenseEnd) => return Err(ProtoError::CardRemoved),
                Some(TagIoEvent::Failed(m)) => return Err(ProtoError::HardwareFailure(m)),
                Some(TagIoEvent::WriteOk) => {
                    return Err(ProtoError::HardwareFailure(
                        "write ack during a read".into(),
                    ))
                }
                None => {
                    return Err(ProtoError::HardwareFailure(
                        "adapter closed the event channel".into(),
                    ))
                }
            },
        }
    }
}

async fn pump_write(
    tag: &dyn TagIo,
    cancel: &mut watch::Receiver<u64>,
    payload: Vec<u8>,
) -> Result<()> {
    let mut events = tag.write_start(payload).await?;
    let mut cancellable = true;
    loop {
        tokio::select! {
            changed = cancel.changed(), if cancellable => {
                if changed.is_err() {
                    cancellable = false;
                    continue;
                }
                let _ = tag.stop().await;
                return Err(ProtoError::Cancelled);
            }
            event = events.recv() => match event {
                // Field activity during a write is informational; a card
                // yanked mid-write surfaces as Failed from the adapter.
                Some(TagIoEvent::SenseStart) | Some(TagIoEvent::SenseEnd) => {}
                Some(TagIoEvent::WriteOk) => return Ok(()),
                Some(TagIoEvent::Failed(m)) => return Err(ProtoError::HardwareFailure(m)),
                Some(TagIoEvent::ReadDone(_)) => {
                    return Err(ProtoError::HardwareFailure(
                        "read data during a write".into(),
                    ))
                }
                None => {
                    return Err(ProtoError::HardwareFailure(
                        "adapter closed the event channel".into(),
                    ))
                }
            },
        }
    }
}
