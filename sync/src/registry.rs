//! # Account Registry
//!
//! A read-through, write-through cache over an [`AccountStore`], plus the
//! "most recent operation" reference (`hash_id`) that views surface as a link.
//!
//! ## Consistency Rules
//!
//! - The store is the only source of truth. The cache is filled from it by
//!   [`AccountRegistry::hydrate`] on startup and lazily on reads. Neither
//!   path replaces an entry that is already cached.
//! - A write lands in the store first. Only when the store has acknowledged it
//!   does the cache change, so a failed write can never be observed.
//! - A read following a write in the same process sees that write.
//!
//! ## Slot Claims
//!
//! Every synchronizer sharing a registry claims a slot through
//! [`AccountRegistry::try_claim`] before touching it, so one slot has at most
//! one operation in flight no matter how many synchronizers are wired to the
//! same store. The claim is released when the returned [`SlotClaim`] drops.
//!
//! ## Observing Changes
//!
//! Consumers either subscribe to [`AccountEvent`]s through a broadcast
//! channel or poll [`AccountRegistry::revision`], which increases by one on
//! every applied change.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::account::{AccountRecord, Balance};
use crate::config::{TrackedAccounts, EVENT_CHANNEL_CAPACITY};
use crate::storage::{AccountStore, StoreResult};

/// Change notifications pushed to subscribers.
///
/// Secrets are never part of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccountEvent {
    /// A slot's record was written (created or re-balanced).
    AccountUpdated {
        slot: String,
        public_key: String,
        balances: Vec<Balance>,
    },
    /// The most recent operation reference changed.
    HashIdChanged { hash_id: String },
}

pub struct AccountRegistry {
    store: Arc<dyn AccountStore>,
    tracked: TrackedAccounts,
    cache: RwLock<HashMap<String, AccountRecord>>,
    hash_id: RwLock<Option<String>>,
    revision: AtomicU64,
    events: broadcast::Sender<AccountEvent>,
    /// Busy slots, mapped to the dispatch ticket of the operation holding them.
    in_flight: DashMap<String, u64>,
    next_ticket: AtomicU64,
}

/// Holds a slot's in-flight marker until dropped.
#[derive(Debug)]
pub struct SlotClaim<'a> {
    in_flight: &'a DashMap<String, u64>,
    slot: String,
    ticket: u64,
}

impl SlotClaim<'_> {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

impl Drop for SlotClaim<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.slot);
        debug!(slot = %self.slot, ticket = self.ticket, "slot released");
    }
}

impl AccountRegistry {
    /// Creates an empty registry. Call [`hydrate`](Self::hydrate) to pull in
    /// whatever the store already holds.
    pub fn new(store: Arc<dyn AccountStore>, tracked: TrackedAccounts) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            tracked,
            cache: RwLock::new(HashMap::new()),
            hash_id: RwLock::new(None),
            revision: AtomicU64::new(0),
            events,
            in_flight: DashMap::new(),
            next_ticket: AtomicU64::new(0),
        }
    }

    pub fn tracked(&self) -> &TrackedAccounts {
        &self.tracked
    }

    /// Fills the cache from the store for every tracked slot and restores
    /// the persisted `hash_id`. Returns the number of slots holding a record.
    ///
    /// Meant for startup. Entries that are already cached, including ones a
    /// concurrent [`commit`](Self::commit) just wrote, are kept as they are;
    /// use [`invalidate`](Self::invalidate) to force a re-read.
    pub fn hydrate(&self) -> StoreResult<usize> {
        let mut loaded = Vec::new();
        for name in self.tracked.iter() {
            if let Some(record) = self.store.load(name)? {
                loaded.push((name.to_string(), record));
            }
        }
        let stored_hash_id = self.store.load_hash_id()?;

        let present = {
            let mut cache = self.cache.write();
            for (name, record) in loaded {
                cache.entry(name).or_insert(record);
            }
            self.tracked
                .iter()
                .filter(|name| cache.contains_key(*name))
                .count()
        };
        {
            let mut hash_id = self.hash_id.write();
            if hash_id.is_none() {
                *hash_id = stored_hash_id;
            }
        }
        self.revision.fetch_add(1, Ordering::SeqCst);

        debug!(present, tracked = self.tracked.len(), "registry hydrated");
        Ok(present)
    }

    /// The record held by slot `name`, if any.
    pub fn get_account(&self, name: &str) -> StoreResult<Option<AccountRecord>> {
        if let Some(record) = self.cache.read().get(name) {
            return Ok(Some(record.clone()));
        }

        match self.store.load(name)? {
            Some(loaded) => {
                // A commit may have raced this load; the committed value wins.
                let mut cache = self.cache.write();
                let record = cache.entry(name.to_string()).or_insert(loaded);
                Ok(Some(record.clone()))
            }
            None => Ok(None),
        }
    }

    /// Every tracked slot in configured order, present or not.
    pub fn accounts(&self) -> StoreResult<Vec<(String, Option<AccountRecord>)>> {
        self.tracked
            .iter()
            .map(|name| Ok((name.to_string(), self.get_account(name)?)))
            .collect()
    }

    /// Writes `record` through to the store, then updates the cache and
    /// notifies subscribers. On error nothing observable changes.
    pub fn commit(&self, name: &str, record: AccountRecord) -> StoreResult<()> {
        self.store.save(name, &record)?;

        let event = AccountEvent::AccountUpdated {
            slot: name.to_string(),
            public_key: record.public_key().to_string(),
            balances: record.balances().to_vec(),
        };
        self.cache.write().insert(name.to_string(), record);
        self.publish(event);
        Ok(())
    }

    /// Drops the cached copy of `name`; the next read goes to the store.
    pub fn invalidate(&self, name: &str) {
        self.cache.write().remove(name);
    }

    pub fn hash_id(&self) -> Option<String> {
        self.hash_id.read().clone()
    }

    /// Records the most recent operation reference, store first.
    pub fn set_hash_id(&self, hash_id: &str) -> StoreResult<()> {
        self.store.save_hash_id(hash_id)?;
        *self.hash_id.write() = Some(hash_id.to_string());
        self.publish(AccountEvent::HashIdChanged {
            hash_id: hash_id.to_string(),
        });
        Ok(())
    }

    /// Marks `slot` busy for the lifetime of the returned claim, or returns
    /// `None` if another operation already holds it.
    pub fn try_claim(&self, slot: &str) -> Option<SlotClaim<'_>> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        match self.in_flight.entry(slot.to_string()) {
            Entry::Occupied(held) => {
                debug!(%slot, ticket, held_by = *held.get(), "slot already claimed");
                None
            }
            Entry::Vacant(vacant) => {
                vacant.insert(ticket);
                Some(SlotClaim {
                    in_flight: &self.in_flight,
                    slot: slot.to_string(),
                    ticket,
                })
            }
        }
    }

    /// `true` while an operation holds `slot`.
    pub fn is_busy(&self, slot: &str) -> bool {
        self.in_flight.contains_key(slot)
    }

    /// Number of slots currently claimed.
    pub fn busy_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AccountEvent> {
        self.events.subscribe()
    }

    /// Monotonic change counter for polling consumers.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    fn publish(&self, event: AccountEvent) {
        self.revision.fetch_add(1, Ordering::SeqCst);
        // No subscribers is fine; polling consumers still see the revision.
        let _ = self.events.send(event);
    }
}
