//! # Synchronizer Errors
//!
//! Every operation outcome the synchronizer can report. None of these are
//! panics, and none of them leave a half-written record behind.

use thiserror::Error;

use crate::gateway::GatewayError;
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The gateway could not produce a keypair. Nothing was written.
    #[error("account creation failed: {0}")]
    CreationFailed(#[source] GatewayError),

    /// The slot holds no record yet.
    #[error("no account exists for slot {0:?}")]
    AccountNotFound(String),

    /// Funding failed or came back empty. No balance query was attempted.
    #[error("funding failed for slot {slot:?}: {reason}")]
    FundingFailed { slot: String, reason: String },

    /// A balance query failed. The record keeps its last-known balances.
    #[error("balance query failed for slot {slot:?}: {source}")]
    QueryFailed {
        slot: String,
        #[source]
        source: GatewayError,
    },

    /// The store failed. `key` is the slot name, or `hash_id` for the
    /// operation reference. The cached view was not updated.
    #[error("failed to persist {key:?}: {source}")]
    PersistenceFailed {
        key: String,
        #[source]
        source: StoreError,
    },

    /// Another operation on the same slot is still in flight.
    #[error("slot {0:?} is busy with another operation")]
    SlotBusy(String),

    /// The name is not one of the tracked slots.
    #[error("slot {0:?} is not tracked")]
    UnknownSlot(String),

    /// The synchronizer was disposed while the operation was suspended.
    /// Whatever the network answered has been discarded.
    #[error("operation on slot {0:?} was cancelled")]
    Cancelled(String),
}

impl SyncError {
    /// Short machine-readable name, used for metrics labels and API bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreationFailed(_) => "creation_failed",
            Self::AccountNotFound(_) => "account_not_found",
            Self::FundingFailed { .. } => "funding_failed",
            Self::QueryFailed { .. } => "query_failed",
            Self::PersistenceFailed { .. } => "persistence_failed",
            Self::SlotBusy(_) => "slot_busy",
            Self::UnknownSlot(_) => "unknown_slot",
            Self::Cancelled(_) => "cancelled",
        }
    }
}
