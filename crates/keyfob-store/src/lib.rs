//! # keyfob-store
//!
//! Durable storage for keyfob credentials.
//!
//! Storage layout:
//! ```text
//! ~/.keyfob/
//! ├── config.json            # store configuration
//! ├── identifiers.keyfob     # 256-slot identifier table
//! └── cards/
//!     └── card_005.keyfob    # one credential record per card id
//! ```
//!
//! Every object lives in its own text container with a single hex field;
//! updates go through a temp file and an atomic rename. All access happens
//! from one logical thread of control — the protocol's own sequencing —
//! so there is no internal locking.

pub mod allocator;
pub mod container;
pub mod credentials;

pub use allocator::{IdentifierAllocator, TABLE_SIZE};
pub use container::Container;
pub use credentials::CredentialStore;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Result type for keyfob-store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in keyfob-store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage fault: {0}")]
    StorageFault(#[from] std::io::Error),

    #[error("identifier table does not exist")]
    TableMissing,

    #[error("identifier table corrupt: {0}")]
    TableCorrupt(String),

    #[error("all 255 identifiers are allocated")]
    Exhausted,

    #[error("identifier {0} is not allocated")]
    NotAllocated(u8),

    #[error("identifier 0 is reserved")]
    ReservedIdentifier,

    #[error("no record for card {0}")]
    NotFound(u8),

    #[error("a record for card {0} already exists")]
    AlreadyExists(u8),

    #[error("record for card {0} corrupt: {1}")]
    Corrupt(u8, String),

    #[error("config corrupt: {0}")]
    ConfigCorrupt(String),
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the identifier table and card records
    pub base_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            base_dir: home.join(".keyfob"),
        }
    }
}

impl StoreConfig {
    /// Config rooted at an explicit directory.
    pub fn at(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Load the config saved under `base_dir`, or fall back to a config
    /// rooted there.
    pub fn load_or_default(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        let path = Self::config_path(&base_dir);
        if !path.exists() {
            return Ok(Self::at(base_dir));
        }
        let text = fs::read_to_string(&path)?;
        serde_json::from_str(&text).map_err(|e| StoreError::ConfigCorrupt(e.to_string()))
    }

    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir)?;
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| StoreError::ConfigCorrupt(e.to_string()))?;
        fs::write(Self::config_path(&self.base_dir), text)?;
        Ok(())
    }

    fn config_path(base_dir: &Path) -> PathBuf {
        base_dir.join("config.json")
    }

    pub(crate) fn table_path(&self) -> PathBuf {
        self.base_dir.join("identifiers.keyfob")
    }

    pub(crate) fn card_path(&self, card_id: u8) -> PathBuf {
        self.base_dir
            .join("cards")
            .join(format!("card_{card_id:03}.keyfob"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn config_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::at(dir.path());
        config.save().unwrap();

        let loaded = StoreConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded.base_dir, config.base_dir);
    }

    #[test]
    fn missing_config_falls_back_to_base_dir() {
        let dir = TempDir::new().unwrap();
        let loaded = StoreConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded.base_dir, dir.path());
    }

    #[test]
    fn card_paths_are_distinct_per_id() {
        let config = StoreConfig::at("/tmp/keyfob-test");
        assert_ne!(config.card_path(1), config.card_path(2));
        assert_ne!(config.card_path(1), config.table_path());
    }
}
