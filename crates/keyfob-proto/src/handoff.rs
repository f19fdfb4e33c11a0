//! Verify-then-advance hand-off
//!
//! A checkpoint lane: the writer task is spawned up front and parks on a
//! single-slot channel; a successful verify posts the checked-out record
//! into the slot instead of issuing the write itself. The writer owns the
//! whole advance, so the verify path never blocks on tag I/O it did not
//! start, and a failed verify simply drops the slot to stand the writer
//! down.

use tokio::sync::mpsc;

use crate::protocol::{advance_session, AdvanceOutcome, RollingProtocol, VerifyOutcome};

/// One verify immediately followed, on success, by one advance.
///
/// Returns the verify outcome and, when a verify succeeded, the advance
/// outcome the writer task produced.
pub async fn verify_then_advance(
    proto: &mut RollingProtocol,
) -> (VerifyOutcome, Option<AdvanceOutcome>) {
    let (tag, store, cancel) = proto.handoff_parts();
    let (slot_tx, mut slot_rx) = mpsc::channel(1);

    let writer = tokio::spawn(async move {
        let session = slot_rx.recv().await?;
        Some(match advance_session(tag, store, cancel, session).await {
            Ok(next_value) => AdvanceOutcome::Succeeded { next_value },
            Err(e) => AdvanceOutcome::Failed {
                reason: e.to_string(),
            },
        })
    });

    let verify = proto.verify().await;
    if matches!(verify, VerifyOutcome::Succeeded { .. }) {
        if let Some(session) = proto.take_session() {
            let _ = slot_tx.send(session).await;
        }
    }
    drop(slot_tx);

    let advance = writer.await.ok().flatten();
    if let Some(outcome) = &advance {
        proto.record_advance_outcome(outcome);
    }
    (verify, advance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTagIo;
    use crate::protocol::ProtocolState;
    use keyfob_core::{HashChainRecord, CHAIN_LEN};
    use keyfob_store::{CredentialStore, IdentifierAllocator, StoreConfig};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<MockTagIo>, RollingProtocol) {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::at(dir.path());
        let store = CredentialStore::new(config.clone());
        let allocator = IdentifierAllocator::new(&config);
        let mock = Arc::new(MockTagIo::new());
        let proto = RollingProtocol::new(mock.clone(), store, allocator);
        (dir, mock, proto)
    }

    fn seeded_record(card_id: u8) -> HashChainRecord {
        let mut chain = [0u32; CHAIN_LEN];
        for (i, slot) in chain.iter_mut().enumerate() {
            *slot = 0x2000_0000 + i as u32;
        }
        HashChainRecord::new(card_id, chain).unwrap()
    }

    #[tokio::test]
    async fn successful_verify_feeds_the_writer() {
        let (dir, mock, mut proto) = setup();
        let record = seeded_record(4);
        CredentialStore::new(StoreConfig::at(dir.path()))
            .create(&record)
            .unwrap();

        let mut payload = vec![4u8];
        payload.extend_from_slice(&record.chain[0].to_le_bytes());
        mock.read_payload(&payload);
        mock.write_ok();

        let (verify, advance) = verify_then_advance(&mut proto).await;
        assert!(matches!(verify, VerifyOutcome::Succeeded { .. }));
        assert_eq!(
            advance,
            Some(AdvanceOutcome::Succeeded {
                next_value: record.chain[1]
            })
        );
        assert_eq!(proto.state(), ProtocolState::AdvanceSucceeded);

        let written = mock.written.lock().unwrap();
        let mut expected = vec![4u8];
        expected.extend_from_slice(&record.chain[1].to_le_bytes());
        assert_eq!(*written, vec![expected]);

        let stored = CredentialStore::new(StoreConfig::at(dir.path()))
            .read(4)
            .unwrap();
        assert_eq!(stored.current_index, 1);
    }

    #[tokio::test]
    async fn failed_verify_stands_the_writer_down() {
        let (_dir, mock, mut proto) = setup();
        mock.read_payload(&[6, 1, 2, 3, 4]);

        let (verify, advance) = verify_then_advance(&mut proto).await;
        assert!(matches!(verify, VerifyOutcome::Failed { .. }));
        assert_eq!(advance, None);
        assert_eq!(proto.state(), ProtocolState::VerifyFailed);
        assert!(mock.written.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn writer_failure_surfaces_as_the_advance_outcome() {
        let (dir, mock, mut proto) = setup();
        let record = seeded_record(9);
        CredentialStore::new(StoreConfig::at(dir.path()))
            .create(&record)
            .unwrap();

        let mut payload = vec![9u8];
        payload.extend_from_slice(&record.chain[0].to_le_bytes());
        mock.read_payload(&payload);
        mock.write_fail("antenna fault");

        let (verify, advance) = verify_then_advance(&mut proto).await;
        assert!(matches!(verify, VerifyOutcome::Succeeded { .. }));
        let Some(AdvanceOutcome::Failed { reason }) = advance else {
            panic!("advance should have failed: {advance:?}");
        };
        assert!(reason.contains("antenna fault"), "reason: {reason}");
        assert_eq!(proto.state(), ProtocolState::AdvanceFailed);

        let stored = CredentialStore::new(StoreConfig::at(dir.path()))
            .read(9)
            .unwrap();
        assert_eq!(stored.current_index, 0);
    }
}
