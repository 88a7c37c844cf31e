//! # Account Synchronizer
//!
//! Orchestrates the three slot operations against the ledger gateway and
//! writes the results back through the registry.
//!
//! ```text
//! create(slot)   ABSENT  ──keypair──▶ CREATED(∅)
//! fund(slot)     CREATED ──fund──▶ balances ──▶ FUNDED(snapshot)
//! refresh(slots) any present slot ──balances──▶ FUNDED(snapshot')
//! ```
//!
//! ## Per-Slot Serialization
//!
//! Each slot admits one in-flight operation. A second create/fund/refresh on
//! a busy slot is rejected with [`SyncError::SlotBusy`] rather than queued, so
//! a late response can never overwrite a newer one. Operations on different
//! slots proceed independently. The in-flight marker is a
//! [`SlotClaim`](crate::registry::SlotClaim) taken from the shared registry,
//! so synchronizers wired to the same registry exclude each other too. It is
//! released on every exit path, including a dropped future.
//!
//! ## Cancellation
//!
//! [`AccountSynchronizer::dispose`] flips a `watch` flag. Any operation
//! suspended on the gateway resolves to [`SyncError::Cancelled`] and its
//! response is thrown away; the flag is checked again right before every
//! store write, so nothing is written after disposal.
//!
//! ## Failure Atomicity
//!
//! The record is only built in full and only written once, at the end of an
//! operation. Any earlier failure returns before the write, so the stored
//! record and the cached view stay at their last good state.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::account::{AccountRecord, Balance};
use crate::error::SyncError;
use crate::gateway::LedgerGateway;
use crate::registry::{AccountRegistry, SlotClaim};

// ---------------------------------------------------------------------------
// Refresh Report
// ---------------------------------------------------------------------------

/// What happened to one slot during a refresh.
#[derive(Debug)]
pub enum SlotOutcome {
    /// The snapshot was fetched and stored.
    Refreshed(Vec<Balance>),
    /// The slot holds no record yet; nothing to refresh.
    Skipped,
    /// The slot could not be refreshed. Its record is unchanged.
    Failed(SyncError),
}

impl SlotOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Per-slot outcomes of a refresh, in request order.
#[derive(Debug, Default)]
pub struct RefreshReport {
    outcomes: Vec<(String, SlotOutcome)>,
}

impl RefreshReport {
    pub fn outcome(&self, slot: &str) -> Option<&SlotOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == slot)
            .map(|(_, outcome)| outcome)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SlotOutcome)> {
        self.outcomes.iter().map(|(name, o)| (name.as_str(), o))
    }

    pub fn refreshed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, SlotOutcome::Refreshed(_)))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &SyncError)> {
        self.outcomes.iter().filter_map(|(name, o)| match o {
            SlotOutcome::Failed(e) => Some((name.as_str(), e)),
            _ => None,
        })
    }

    pub fn is_clean(&self) -> bool {
        !self.outcomes.iter().any(|(_, o)| o.is_failure())
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// AccountSynchronizer
// ---------------------------------------------------------------------------

pub struct AccountSynchronizer {
    registry: Arc<AccountRegistry>,
    gateway: Arc<dyn LedgerGateway>,
    disposed: watch::Sender<bool>,
}

impl AccountSynchronizer {
    pub fn new(registry: Arc<AccountRegistry>, gateway: Arc<dyn LedgerGateway>) -> Self {
        let (disposed, _) = watch::channel(false);
        Self {
            registry,
            gateway,
            disposed,
        }
    }

    pub fn registry(&self) -> &Arc<AccountRegistry> {
        &self.registry
    }

    /// `true` while an operation holds `slot`. Views use this to disable
    /// actions instead of provoking `SlotBusy`.
    pub fn is_busy(&self, slot: &str) -> bool {
        self.registry.is_busy(slot)
    }

    /// Tears the synchronizer down. Suspended operations resolve to
    /// `Cancelled`; new ones are refused.
    pub fn dispose(&self) {
        if !self.disposed.send_replace(true) {
            info!(in_flight = self.registry.busy_count(), "synchronizer disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        *self.disposed.borrow()
    }

    // -- Operations ---------------------------------------------------------

    /// Creates the account for `slot`.
    ///
    /// If the slot already holds a record, that record is returned untouched:
    /// an existing public key is never replaced. No funding happens here.
    pub async fn create(&self, slot: &str) -> Result<AccountRecord, SyncError> {
        let _guard = self.claim(slot)?;

        if let Some(existing) = self.load(slot)? {
            info!(%slot, public_key = existing.public_key(), "account already exists, keeping it");
            return Ok(existing);
        }

        let keypair = self
            .suspend(slot, self.gateway.create_keypair())
            .await?
            .map_err(SyncError::CreationFailed)?;

        let record = AccountRecord::new(keypair.public_key, keypair.secret);
        self.persist(slot, record.clone())?;

        info!(%slot, public_key = record.public_key(), "account created");
        Ok(record)
    }

    /// Funds the account in `slot`, then replaces its balances with a fresh
    /// snapshot.
    ///
    /// The balance query is only issued after the funding call confirmed
    /// success. A failed or empty funding response stops the operation with
    /// the record untouched.
    pub async fn fund(&self, slot: &str) -> Result<AccountRecord, SyncError> {
        let _guard = self.claim(slot)?;

        let record = self
            .load(slot)?
            .ok_or_else(|| SyncError::AccountNotFound(slot.to_string()))?;

        let receipt = match self
            .suspend(slot, self.gateway.fund_account(record.public_key()))
            .await?
        {
            Ok(Some(receipt)) => receipt,
            Ok(None) => {
                warn!(%slot, "funding service returned an empty response");
                return Err(SyncError::FundingFailed {
                    slot: slot.to_string(),
                    reason: "empty response from funding service".into(),
                });
            }
            Err(e) => {
                warn!(%slot, error = %e, "funding request failed");
                return Err(SyncError::FundingFailed {
                    slot: slot.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        // The funding transaction happened on the ledger whatever the balance
        // query does next.
        if let Some(hash) = receipt.hash {
            if let Err(e) = self.registry.set_hash_id(&hash) {
                warn!(%slot, error = %e, "failed to record funding transaction hash");
            }
        }

        let balances = self
            .suspend(slot, self.gateway.get_balances(record.public_key()))
            .await?
            .map_err(|source| SyncError::QueryFailed {
                slot: slot.to_string(),
                source,
            })?;

        let updated = record.with_balances(balances);
        self.persist(slot, updated.clone())?;
        info!(%slot, lines = updated.balances().len(), "account funded");

        Ok(updated)
    }

    /// Refreshes every named slot independently.
    ///
    /// Absent slots are skipped; a failure in one slot never stops the
    /// others. Duplicate names are refreshed once.
    pub async fn refresh_balances<I, S>(&self, slots: I) -> RefreshReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<String> = Vec::new();
        for slot in slots {
            let slot = slot.as_ref();
            if !names.iter().any(|n| n == slot) {
                names.push(slot.to_string());
            }
        }

        let outcomes = join_all(names.iter().map(|name| self.refresh_slot(name))).await;
        let report = RefreshReport {
            outcomes: names.into_iter().zip(outcomes).collect(),
        };

        debug!(
            slots = report.len(),
            refreshed = report.refreshed_count(),
            clean = report.is_clean(),
            "refresh finished"
        );
        report
    }

    /// Refreshes every tracked slot.
    pub async fn refresh_all(&self) -> RefreshReport {
        let names: Vec<String> = self.registry.tracked().iter().map(str::to_string).collect();
        self.refresh_balances(names).await
    }

    /// Settles a payment made outside the synchronizer: records its
    /// transaction hash as the current operation reference, then refreshes
    /// every tracked slot so both sides show their new balances.
    pub async fn record_payment(&self, tx_hash: &str) -> Result<RefreshReport, SyncError> {
        if self.is_disposed() {
            return Err(SyncError::Cancelled("payment".into()));
        }

        let tx_hash = tx_hash.trim();
        if !tx_hash.is_empty() {
            self.registry
                .set_hash_id(tx_hash)
                .map_err(|source| SyncError::PersistenceFailed {
                    key: "hash_id".into(),
                    source,
                })?;
            info!(%tx_hash, "payment recorded");
        }

        Ok(self.refresh_all().await)
    }

    // -- Internals ----------------------------------------------------------

    async fn refresh_slot(&self, slot: &str) -> SlotOutcome {
        match self.try_refresh(slot).await {
            Ok(Some(balances)) => SlotOutcome::Refreshed(balances),
            Ok(None) => SlotOutcome::Skipped,
            Err(e) => {
                warn!(%slot, error = %e, "refresh failed");
                SlotOutcome::Failed(e)
            }
        }
    }

    async fn try_refresh(&self, slot: &str) -> Result<Option<Vec<Balance>>, SyncError> {
        let _guard = self.claim(slot)?;

        let Some(record) = self.load(slot)? else {
            debug!(%slot, "no account yet, skipping refresh");
            return Ok(None);
        };

        let balances = self
            .suspend(slot, self.gateway.get_balances(record.public_key()))
            .await?
            .map_err(|source| SyncError::QueryFailed {
                slot: slot.to_string(),
                source,
            })?;

        self.persist(slot, record.with_balances(balances.clone()))?;
        Ok(Some(balances))
    }

    /// Marks `slot` busy for the lifetime of the returned claim.
    fn claim(&self, slot: &str) -> Result<SlotClaim<'_>, SyncError> {
        if !self.registry.tracked().contains(slot) {
            return Err(SyncError::UnknownSlot(slot.to_string()));
        }
        if self.is_disposed() {
            return Err(SyncError::Cancelled(slot.to_string()));
        }

        self.registry.try_claim(slot).ok_or_else(|| {
            warn!(%slot, "slot busy, rejecting operation");
            SyncError::SlotBusy(slot.to_string())
        })
    }

    fn load(&self, slot: &str) -> Result<Option<AccountRecord>, SyncError> {
        self.registry
            .get_account(slot)
            .map_err(|source| SyncError::PersistenceFailed {
                key: slot.to_string(),
                source,
            })
    }

    /// The single write point of every operation.
    fn persist(&self, slot: &str, record: AccountRecord) -> Result<(), SyncError> {
        if self.is_disposed() {
            return Err(SyncError::Cancelled(slot.to_string()));
        }
        self.registry
            .commit(slot, record)
            .map_err(|source| SyncError::PersistenceFailed {
                key: slot.to_string(),
                source,
            })
    }

    /// Awaits a gateway call unless the synchronizer is disposed first.
    async fn suspend<T>(
        &self,
        slot: &str,
        call: impl Future<Output = T>,
    ) -> Result<T, SyncError> {
        tokio::select! {
            biased;
            _ = wait_disposed(self.disposed.subscribe()) => {
                debug!(%slot, "discarding gateway response after dispose");
                Err(SyncError::Cancelled(slot.to_string()))
            }
            out = call => Ok(out),
        }
    }
}

async fn wait_disposed(mut disposed: watch::Receiver<bool>) {
    loop {
        if *disposed.borrow_and_update() {
            return;
        }
        if disposed.changed().await.is_err() {
            // Sender gone: the synchronizer itself was dropped.
            std::future::pending::<()>().await;
        }
    }
}
