//! # Storage Module
//!
//! Durable key → record persistence, addressed by slot name.
//!
//! ```text
//! db.rs     : SledAccountStore: on-disk sled trees
//! memory.rs : MemoryAccountStore: in-process map with write-fault injection
//! ```
//!
//! Both backends store the same bytes: `bincode(AccountRecord)`. Bincode is
//! compact and deterministic, which is what makes "refresh twice, get the
//! same bytes twice" a checkable property.

pub mod db;
pub mod memory;

use thiserror::Error;

use crate::account::AccountRecord;

pub use db::SledAccountStore;
pub use memory::MemoryAccountStore;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store rejected write: {0}")]
    WriteRejected(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence contract consumed by the registry.
///
/// Writes for different names never interact. A successful `save` must be
/// durable before it returns; the registry updates its cache only afterwards.
pub trait AccountStore: Send + Sync {
    fn save(&self, name: &str, record: &AccountRecord) -> StoreResult<()>;

    fn load(&self, name: &str) -> StoreResult<Option<AccountRecord>>;

    /// Persists the most recent operation reference. Stores without a
    /// metadata area keep it in memory only.
    fn save_hash_id(&self, _hash_id: &str) -> StoreResult<()> {
        Ok(())
    }

    fn load_hash_id(&self) -> StoreResult<Option<String>> {
        Ok(None)
    }
}

/// Serializes a record into its stored form.
pub fn encode_record(record: &AccountRecord) -> StoreResult<Vec<u8>> {
    bincode::serialize(record).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Parses a stored record.
pub fn decode_record(bytes: &[u8]) -> StoreResult<AccountRecord> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}
