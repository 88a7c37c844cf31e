//! # In-Memory Account Store
//!
//! Keeps encoded records in a map. Used for ephemeral runs and tests; the
//! write-fault switch lets tests prove that a rejected write leaves both the
//! store and the registry cache untouched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::{decode_record, encode_record, AccountStore, StoreError, StoreResult};
use crate::account::AccountRecord;

#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    records: RwLock<HashMap<String, Vec<u8>>>,
    hash_id: RwLock<Option<String>>,
    reject_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While on, every `save` fails and nothing is written.
    pub fn reject_writes(&self, on: bool) {
        self.reject_writes.store(on, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn raw_record(&self, name: &str) -> Option<Vec<u8>> {
        self.records.read().get(name).cloned()
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteRejected("memory store is read-only".into()));
        }
        Ok(())
    }
}

impl AccountStore for MemoryAccountStore {
    fn save(&self, name: &str, record: &AccountRecord) -> StoreResult<()> {
        self.check_writable()?;
        let bytes = encode_record(record)?;
        self.records.write().insert(name.to_string(), bytes);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load(&self, name: &str) -> StoreResult<Option<AccountRecord>> {
        self.records
            .read()
            .get(name)
            .map(|bytes| decode_record(bytes))
            .transpose()
    }

    fn save_hash_id(&self, hash_id: &str) -> StoreResult<()> {
        self.check_writable()?;
        *self.hash_id.write() = Some(hash_id.to_string());
        Ok(())
    }

    fn load_hash_id(&self) -> StoreResult<Option<String>> {
        Ok(self.hash_id.read().clone())
    }
}
