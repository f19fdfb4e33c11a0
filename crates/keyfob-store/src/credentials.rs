//! Per-card credential records
//!
//! One container per card id under `cards/`, holding the 402-byte record
//! hex-encoded. The lifecycle is create-then-update: a first write always
//! goes through `create`, and `update` only ever overwrites in place.

use keyfob_core::HashChainRecord;

use crate::container::{Container, ContainerError};
use crate::{Result, StoreConfig, StoreError};

const KIND: &str = "Record";

#[derive(Clone)]
pub struct CredentialStore {
    config: StoreConfig,
}

impl CredentialStore {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    /// Persist a brand-new record.
    pub fn create(&self, record: &HashChainRecord) -> Result<()> {
        match self.container(record.card_id).create(&record.serialize()) {
            Ok(()) => {
                tracing::info!(card_id = record.card_id, "created credential record");
                Ok(())
            }
            Err(ContainerError::Exists) => Err(StoreError::AlreadyExists(record.card_id)),
            Err(e) => Err(record_err(record.card_id, e)),
        }
    }

    pub fn read(&self, card_id: u8) -> Result<HashChainRecord> {
        let bytes = self
            .container(card_id)
            .read()
            .map_err(|e| record_err(card_id, e))?;
        HashChainRecord::deserialize(&bytes)
            .map_err(|e| StoreError::Corrupt(card_id, e.to_string()))
    }

    /// Overwrite an existing record in place.
    pub fn update(&self, record: &HashChainRecord) -> Result<()> {
        match self.container(record.card_id).write(&record.serialize()) {
            Ok(()) => {
                tracing::info!(
                    card_id = record.card_id,
                    current_index = record.current_index,
                    "updated credential record"
                );
                Ok(())
            }
            Err(ContainerError::Missing) => Err(StoreError::NotFound(record.card_id)),
            Err(e) => Err(record_err(record.card_id, e)),
        }
    }

    fn container(&self, card_id: u8) -> Container {
        Container::new(self.config.card_path(card_id), KIND)
    }
}

fn record_err(card_id: u8, e: ContainerError) -> StoreError {
    match e {
        ContainerError::Missing => StoreError::NotFound(card_id),
        ContainerError::Malformed(m) => StoreError::Corrupt(card_id, m),
        ContainerError::Io(e) => StoreError::StorageFault(e),
        ContainerError::Exists => StoreError::AlreadyExists(card_id),
    }
}
