//! # Account Records
//!
//! [`AccountRecord`] is what the store persists per slot: the public key, the
//! secret seed, and the last balance snapshot fetched from the network.
//!
//! ## Merge Policy
//!
//! A refresh produces a complete snapshot, and [`AccountRecord::with_balances`]
//! swaps it in wholesale. Assets that disappeared upstream disappear locally;
//! nothing is diffed per asset.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::NATIVE_ASSET_CODE;

// ---------------------------------------------------------------------------
// Balance
// ---------------------------------------------------------------------------

/// One line of a balance snapshot.
///
/// `amount` stays a decimal string exactly as the ledger reported it. We never
/// parse it into a float, and the display layer decides how to format it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub asset_code: String,
    pub amount: String,
}

impl Balance {
    pub fn new(asset_code: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            asset_code: asset_code.into(),
            amount: amount.into(),
        }
    }

    /// A native (XLM) balance line.
    pub fn native(amount: impl Into<String>) -> Self {
        Self::new(NATIVE_ASSET_CODE, amount)
    }

    pub fn is_native(&self) -> bool {
        self.asset_code == NATIVE_ASSET_CODE
    }
}

// ---------------------------------------------------------------------------
// SecretSeed
// ---------------------------------------------------------------------------

/// A StrKey-encoded secret seed (`S...`).
///
/// Serializes transparently so the store can persist it, but `Debug` is
/// redacted so that a stray `{:?}` in a log line cannot leak it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretSeed(String);

impl SecretSeed {
    pub fn new(seed: impl Into<String>) -> Self {
        Self(seed.into())
    }

    /// The encoded seed. Only the create and fund flows have a reason to call this.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretSeed(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// AccountRecord
// ---------------------------------------------------------------------------

/// The persisted state of one tracked slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    public_key: String,
    secret: SecretSeed,
    balances: Vec<Balance>,
}

impl AccountRecord {
    /// A freshly created record. Balances start empty; funding fills them.
    pub fn new(public_key: impl Into<String>, secret: SecretSeed) -> Self {
        Self {
            public_key: public_key.into(),
            secret,
            balances: Vec::new(),
        }
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// The signing seed. Views must not render it; the manager's API omits it.
    pub fn secret(&self) -> &SecretSeed {
        &self.secret
    }

    pub fn balances(&self) -> &[Balance] {
        &self.balances
    }

    /// `true` once any balance snapshot has been applied.
    pub fn is_funded(&self) -> bool {
        !self.balances.is_empty()
    }

    /// The native balance line, if the snapshot has one.
    pub fn native_balance(&self) -> Option<&Balance> {
        self.balances.iter().find(|b| b.is_native())
    }

    /// Returns the same record with `snapshot` as its complete balance list.
    pub fn with_balances(self, snapshot: Vec<Balance>) -> Self {
        Self {
            balances: snapshot,
            ..self
        }
    }
}
