// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Lumen Sync: Core Library
//!
//! Keeps a locally cached view of a small, fixed set of named Stellar test
//! accounts ("slots") consistent with the network. Each slot is created once,
//! funded through Friendbot, and refreshed on demand; every network response
//! is merged into the slot's record and written back to durable storage.
//!
//! ## Architecture
//!
//! - **account**: Records, balance snapshots, keypairs and StrKey encoding.
//! - **gateway**: The ledger capability: Horizon over HTTP, or an offline sandbox.
//! - **storage**: Durable key → record persistence (sled or in-memory).
//! - **registry**: Read-through cache over the store, change notifications.
//! - **synchronizer**: create / fund / refresh orchestration with per-slot
//!   serialization and cancellation.
//! - **config**: Endpoints, tracked slots and other constants.
//!
//! ## Ground Rules
//!
//! 1. Balances are replaced wholesale. No per-asset merging, ever.
//! 2. A record is never half-written: the store sees the final record or nothing.
//! 3. The cache never gets ahead of the store.
//! 4. One operation per slot at a time. A busy slot says so instead of racing.

pub mod account;
pub mod config;
pub mod error;
pub mod gateway;
pub mod registry;
pub mod storage;
pub mod synchronizer;

pub use account::{AccountRecord, Balance, SecretSeed};
pub use config::{GatewayConfig, TrackedAccounts};
pub use error::SyncError;
pub use gateway::{
    FundReceipt, GatewayError, GeneratedKeypair, HorizonGateway, LedgerGateway, SandboxLedger,
};
pub use registry::{AccountEvent, AccountRegistry, SlotClaim};
pub use storage::{AccountStore, MemoryAccountStore, SledAccountStore, StoreError};
pub use synchronizer::{AccountSynchronizer, RefreshReport, SlotOutcome};
