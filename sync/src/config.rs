//! # Configuration & Constants
//!
//! Endpoints, defaults and the tracked-slot set. Anything that looks like a
//! magic value in the rest of the crate should be defined here instead.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Network Endpoints
// ---------------------------------------------------------------------------

/// Public Horizon instance for the Stellar test network.
pub const HORIZON_TESTNET_URL: &str = "https://horizon-testnet.stellar.org";

/// Friendbot hands out test lumens to brand-new testnet accounts.
pub const FRIENDBOT_URL: &str = "https://friendbot.stellar.org";

/// Stellar Expert transaction page prefix for the test network.
pub const EXPLORER_TESTNET_TX_URL: &str = "https://stellar.expert/explorer/testnet/tx/";

/// How long a single gateway HTTP request may take before it is abandoned.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Ledger Conventions
// ---------------------------------------------------------------------------

/// Asset code reported for the native balance (Horizon calls it `native`).
pub const NATIVE_ASSET_CODE: &str = "XLM";

/// Amount Friendbot credits to a fresh account, with Stellar's 7 decimals.
pub const FRIENDBOT_AMOUNT: &str = "10000.0000000";

// ---------------------------------------------------------------------------
// Local State
// ---------------------------------------------------------------------------

/// Slots tracked when no explicit configuration is given.
pub const DEFAULT_TRACKED_ACCOUNTS: [&str; 2] = ["ayala3", "ayala4"];

/// Buffered change events per subscriber before it starts lagging.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Maximum slot name length. Names are storage keys and URL path segments.
pub const MAX_SLOT_NAME_LENGTH: usize = 64;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while building configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one tracked account is required")]
    NoTrackedAccounts,

    #[error("invalid slot name {0:?}: use 1-64 ASCII letters, digits, '-' or '_'")]
    InvalidSlotName(String),
}

// ---------------------------------------------------------------------------
// GatewayConfig
// ---------------------------------------------------------------------------

/// Where the Horizon gateway sends its requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Horizon base URL, without a trailing slash.
    pub horizon_url: String,
    /// Friendbot base URL, without a trailing slash.
    pub friendbot_url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            horizon_url: HORIZON_TESTNET_URL.to_string(),
            friendbot_url: FRIENDBOT_URL.to_string(),
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}

// ---------------------------------------------------------------------------
// TrackedAccounts
// ---------------------------------------------------------------------------

/// The ordered, de-duplicated set of slot names the synchronizer manages.
///
/// Order is preserved so that listings and refresh reports come out in the
/// order the operator configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedAccounts {
    names: Vec<String>,
}

impl TrackedAccounts {
    /// Builds a tracked set from any list of names. Duplicates are dropped,
    /// keeping the first occurrence.
    pub fn new<I, S>(names: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if !is_valid_slot_name(&name) {
                return Err(ConfigError::InvalidSlotName(name));
            }
            if !unique.contains(&name) {
                unique.push(name);
            }
        }

        if unique.is_empty() {
            return Err(ConfigError::NoTrackedAccounts);
        }
        Ok(Self { names: unique })
    }

    /// Returns `true` if `name` is one of the tracked slots.
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Iterates slot names in configured order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for TrackedAccounts {
    fn default() -> Self {
        Self {
            names: DEFAULT_TRACKED_ACCOUNTS
                .iter()
                .map(|n| n.to_string())
                .collect(),
        }
    }
}

impl FromStr for TrackedAccounts {
    type Err = ConfigError;

    /// Parses a comma-separated list, e.g. `"ayala3,ayala4"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.split(',').map(str::trim).filter(|n| !n.is_empty()))
    }
}

impl fmt::Display for TrackedAccounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names.join(","))
    }
}

// ---------------------------------------------------------------------------
// Utility
// ---------------------------------------------------------------------------

/// Slot names double as sled keys and URL segments, so keep them boring.
pub fn is_valid_slot_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_SLOT_NAME_LENGTH
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Stellar Expert link for a transaction hash on the test network.
pub fn explorer_tx_url(hash: &str) -> String {
    format!("{}{}", EXPLORER_TESTNET_TX_URL, hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tracks_both_named_accounts() {
        let tracked = TrackedAccounts::default();
        assert_eq!(tracked.iter().collect::<Vec<_>>(), vec!["ayala3", "ayala4"]);
        assert!(tracked.contains("ayala3"));
        assert!(!tracked.contains("ayala5"));
    }

    #[test]
    fn parse_comma_list_keeps_order_and_drops_duplicates() {
        let tracked: TrackedAccounts = "treasury, ops ,treasury,,payroll".parse().unwrap();
        assert_eq!(
            tracked.iter().collect::<Vec<_>>(),
            vec!["treasury", "ops", "payroll"]
        );
        assert_eq!(tracked.len(), 3);
        assert_eq!(tracked.to_string(), "treasury,ops,payroll");
    }

    #[test]
    fn empty_list_is_rejected() {
        assert_eq!(
            " , ".parse::<TrackedAccounts>(),
            Err(ConfigError::NoTrackedAccounts)
        );
    }

    #[test]
    fn slot_names_must_be_path_safe() {
        assert!(is_valid_slot_name("ayala3"));
        assert!(is_valid_slot_name("ops_wallet-2"));
        assert!(!is_valid_slot_name(""));
        assert!(!is_valid_slot_name("../etc"));
        assert!(!is_valid_slot_name("with space"));
        assert!(!is_valid_slot_name(&"a".repeat(MAX_SLOT_NAME_LENGTH + 1)));

        assert!(matches!(
            TrackedAccounts::new(["ok", "not ok"]),
            Err(ConfigError::InvalidSlotName(name)) if name == "not ok"
        ));
    }

    #[test]
    fn explorer_link_points_at_testnet() {
        assert_eq!(
            explorer_tx_url("abc123"),
            "https://stellar.expert/explorer/testnet/tx/abc123"
        );
    }

    #[test]
    fn gateway_defaults_target_testnet() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.horizon_url, HORIZON_TESTNET_URL);
        assert_eq!(cfg.friendbot_url, FRIENDBOT_URL);
        assert_eq!(cfg.request_timeout, REQUEST_TIMEOUT);
    }
}
