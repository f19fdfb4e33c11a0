//! Identifier allocation
//!
//! A 256-slot table in one container: index = candidate card id, 0 free,
//! 1 allocated. Slot 0 is permanently reserved and never handed out. The
//! table is created once, grows monotonically under `allocate`, and only
//! shrinks through an explicit `release`.

use crate::container::{Container, ContainerError};
use crate::{Result, StoreConfig, StoreError};

/// Number of slots in the identifier table.
pub const TABLE_SIZE: usize = 256;

const KIND: &str = "Identifiers";

pub struct IdentifierAllocator {
    container: Container,
}

impl IdentifierAllocator {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            container: Container::new(config.table_path(), KIND),
        }
    }

    /// Create the all-zero table if none exists. A pre-existing table is
    /// left untouched.
    pub fn ensure_table_exists(&self) -> Result<()> {
        match self.container.create(&[0u8; TABLE_SIZE]) {
            Ok(()) => {
                tracing::info!(
                    "created identifier table at {}",
                    self.container.path().display()
                );
                Ok(())
            }
            Err(ContainerError::Exists) => Ok(()),
            Err(e) => Err(table_err(e)),
        }
    }

    /// Allocate the lowest free identifier, persisting the table before
    /// handing it out. A failed persist means nothing was allocated and
    /// the returned error is the only result.
    pub fn allocate(&self) -> Result<u8> {
        let mut table = self.load_table()?;
        let slot = table[1..]
            .iter()
            .position(|&entry| entry == 0)
            .map(|free| free + 1)
            .ok_or(StoreError::Exhausted)?;
        table[slot] = 1;
        self.container.write(&table).map_err(table_err)?;
        tracing::info!(card_id = slot, "allocated card identifier");
        Ok(slot as u8)
    }

    /// Return an identifier to the pool.
    pub fn release(&self, card_id: u8) -> Result<()> {
        if card_id == 0 {
            return Err(StoreError::ReservedIdentifier);
        }
        let mut table = self.load_table()?;
        if table[card_id as usize] == 0 {
            return Err(StoreError::NotAllocated(card_id));
        }
        table[card_id as usize] = 0;
        self.container.write(&table).map_err(table_err)?;
        tracing::info!(card_id, "released card identifier");
        Ok(())
    }

    fn load_table(&self) -> Result<[u8; TABLE_SIZE]> {
        let bytes = self.container.read().map_err(table_err)?;
        let table: [u8; TABLE_SIZE] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            StoreError::TableCorrupt(format!(
                "table is {} bytes, expected {TABLE_SIZE}",
                bytes.len()
            ))
        })?;
        if table.iter().any(|&entry| entry > 1) {
            return Err(StoreError::TableCorrupt("entry outside 0/1".into()));
        }
        Ok(table)
    }
}

fn table_err(e: ContainerError) -> StoreError {
    match e {
        ContainerError::Missing => StoreError::TableMissing,
        ContainerError::Malformed(m) => StoreError::TableCorrupt(m),
        ContainerError::Io(e) => StoreError::StorageFault(e),
        ContainerError::Exists => StoreError::TableCorrupt("duplicate table".into()),
    }
}
