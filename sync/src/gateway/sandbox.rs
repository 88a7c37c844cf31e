//! # Sandbox Ledger
//!
//! An offline [`LedgerGateway`] that behaves like testnet + Friendbot closely
//! enough to exercise every synchronizer path without a network:
//!
//! - keypairs are real Ed25519 keys with real StrKey encoding;
//! - funding credits [`FRIENDBOT_AMOUNT`] XLM once per account, and a second
//!   request for the same account gets an empty response, like Friendbot;
//! - balance queries for accounts the ledger never funded fail with
//!   [`GatewayError::UnknownAccount`], like Horizon's 404.
//!
//! Faults and latency can be switched on at runtime, and every call is
//! counted so tests can assert what was (and was not) asked of the ledger.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use super::{FundReceipt, GatewayError, GeneratedKeypair, LedgerGateway};
use crate::account::keys::StellarKeypair;
use crate::account::Balance;
use crate::config::FRIENDBOT_AMOUNT;

#[derive(Default)]
struct Faults {
    keypairs: AtomicBool,
    decline_funding: AtomicBool,
    funding_transport: AtomicBool,
    all_queries: AtomicBool,
    queries_for: Mutex<HashSet<String>>,
}

/// Deterministic in-process ledger.
pub struct SandboxLedger {
    accounts: Mutex<HashMap<String, Vec<Balance>>>,
    funding_amount: String,
    latency: Option<Duration>,
    faults: Faults,
    keypairs_created: AtomicUsize,
    fund_calls: AtomicUsize,
    balance_queries: AtomicUsize,
    tx_sequence: AtomicU64,
}

impl Default for SandboxLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxLedger {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            funding_amount: FRIENDBOT_AMOUNT.to_string(),
            latency: None,
            faults: Faults::default(),
            keypairs_created: AtomicUsize::new(0),
            fund_calls: AtomicUsize::new(0),
            balance_queries: AtomicUsize::new(0),
            tx_sequence: AtomicU64::new(0),
        }
    }

    /// Every call suspends for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Overrides the amount credited by a successful funding request.
    pub fn with_funding_amount(mut self, amount: impl Into<String>) -> Self {
        self.funding_amount = amount.into();
        self
    }

    // -- Fault injection ----------------------------------------------------

    pub fn fail_keypair_generation(&self, on: bool) {
        self.faults.keypairs.store(on, Ordering::SeqCst);
    }

    /// Funding answers with an empty response (Friendbot's error statuses).
    pub fn decline_funding(&self, on: bool) {
        self.faults.decline_funding.store(on, Ordering::SeqCst);
    }

    /// Funding fails at the transport level.
    pub fn break_funding_transport(&self, on: bool) {
        self.faults.funding_transport.store(on, Ordering::SeqCst);
    }

    pub fn fail_balance_queries(&self, on: bool) {
        self.faults.all_queries.store(on, Ordering::SeqCst);
    }

    /// Balance queries fail for this account only.
    pub fn fail_balance_queries_for(&self, public_key: &str) {
        self.faults.queries_for.lock().insert(public_key.to_string());
    }

    pub fn heal_balance_queries_for(&self, public_key: &str) {
        self.faults.queries_for.lock().remove(public_key);
    }

    // -- Ledger state -------------------------------------------------------

    /// Replaces an account's on-ledger balances, creating it if needed.
    pub fn set_balances(&self, public_key: &str, balances: Vec<Balance>) {
        self.accounts.lock().insert(public_key.to_string(), balances);
    }

    pub fn is_funded(&self, public_key: &str) -> bool {
        self.accounts.lock().contains_key(public_key)
    }

    // -- Counters -----------------------------------------------------------

    pub fn keypairs_created(&self) -> usize {
        self.keypairs_created.load(Ordering::SeqCst)
    }

    pub fn fund_calls(&self) -> usize {
        self.fund_calls.load(Ordering::SeqCst)
    }

    pub fn balance_queries(&self) -> usize {
        self.balance_queries.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn next_tx_hash(&self, public_key: &str) -> String {
        let seq = self.tx_sequence.fetch_add(1, Ordering::SeqCst);
        let mut hasher = Sha256::new();
        hasher.update(public_key.as_bytes());
        hasher.update(seq.to_be_bytes());
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl LedgerGateway for SandboxLedger {
    async fn create_keypair(&self) -> Result<GeneratedKeypair, GatewayError> {
        self.pause().await;
        if self.faults.keypairs.load(Ordering::SeqCst) {
            return Err(GatewayError::KeyGeneration("sandbox fault".into()));
        }

        let keypair = StellarKeypair::generate();
        self.keypairs_created.fetch_add(1, Ordering::SeqCst);
        Ok(GeneratedKeypair {
            public_key: keypair.account_id(),
            secret: keypair.secret_seed(),
        })
    }

    async fn fund_account(&self, public_key: &str) -> Result<Option<FundReceipt>, GatewayError> {
        self.pause().await;
        self.fund_calls.fetch_add(1, Ordering::SeqCst);

        if self.faults.funding_transport.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("sandbox fault".into()));
        }
        if self.faults.decline_funding.load(Ordering::SeqCst) {
            return Ok(None);
        }

        {
            let mut accounts = self.accounts.lock();
            if accounts.contains_key(public_key) {
                // Friendbot refuses to fund an account twice.
                return Ok(None);
            }
            accounts.insert(
                public_key.to_string(),
                vec![Balance::native(self.funding_amount.clone())],
            );
        }

        Ok(Some(FundReceipt {
            hash: Some(self.next_tx_hash(public_key)),
        }))
    }

    async fn get_balances(&self, public_key: &str) -> Result<Vec<Balance>, GatewayError> {
        self.pause().await;
        self.balance_queries.fetch_add(1, Ordering::SeqCst);

        if self.faults.all_queries.load(Ordering::SeqCst)
            || self.faults.queries_for.lock().contains(public_key)
        {
            return Err(GatewayError::Transport("sandbox fault".into()));
        }

        self.accounts
            .lock()
            .get(public_key)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownAccount(public_key.to_string()))
    }
}
