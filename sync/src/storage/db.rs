//! # Sled Account Store
//!
//! On-disk persistence built on sled's embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree       | Key               | Value                    |
//! |------------|-------------------|--------------------------|
//! | `accounts` | slot name (UTF-8) | `bincode(AccountRecord)` |
//! | `metadata` | key (UTF-8)       | value (bytes)            |
//!
//! Every write is flushed before `save` returns. These are a handful of
//! tiny records written on user action, so durability wins over throughput.

use std::path::Path;

use sled::{Db, Tree};

use super::{decode_record, encode_record, AccountStore, StoreError, StoreResult};
use crate::account::AccountRecord;

/// Well-known key in the `metadata` tree for the last operation reference.
const META_HASH_ID: &[u8] = b"hash_id";

/// Persistent account store.
///
/// sled is thread-safe, so the store can be shared via `Arc` without
/// external locking.
#[derive(Debug, Clone)]
pub struct SledAccountStore {
    db: Db,
    accounts: Tree,
    metadata: Tree,
}

impl SledAccountStore {
    /// Open or create a store at the given directory.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A store that lives in a temporary location and vanishes on drop.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let accounts = db.open_tree("accounts")?;
        let metadata = db.open_tree("metadata")?;
        Ok(Self {
            db,
            accounts,
            metadata,
        })
    }

    /// The stored bytes for `name`, exactly as written.
    pub fn raw_record(&self, name: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.accounts.get(name.as_bytes())?.map(|v| v.to_vec()))
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl AccountStore for SledAccountStore {
    fn save(&self, name: &str, record: &AccountRecord) -> StoreResult<()> {
        let bytes = encode_record(record)?;
        self.accounts.insert(name.as_bytes(), bytes)?;
        self.flush()
    }

    fn load(&self, name: &str) -> StoreResult<Option<AccountRecord>> {
        match self.accounts.get(name.as_bytes())? {
            Some(bytes) => Ok(Some(decode_record(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save_hash_id(&self, hash_id: &str) -> StoreResult<()> {
        self.metadata.insert(META_HASH_ID, hash_id.as_bytes())?;
        self.flush()
    }

    fn load_hash_id(&self) -> StoreResult<Option<String>> {
        match self.metadata.get(META_HASH_ID)? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }
}
