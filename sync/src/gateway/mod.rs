//! # Ledger Gateway
//!
//! The capability the synchronizer needs from the network, and nothing more:
//! make a keypair, ask for test funding, read balances.
//!
//! ```text
//! horizon.rs : HorizonGateway: Horizon + Friendbot over HTTP (reqwest)
//! sandbox.rs : SandboxLedger: deterministic offline ledger with fault injection
//! ```
//!
//! ## Funding Semantics
//!
//! Friendbot answers a bad request (e.g. an account that is already funded)
//! with an error status rather than a transport failure. The gateway reports
//! that as `Ok(None)`: an empty response, which the synchronizer treats as a
//! failed funding attempt. `Err` is reserved for the request not completing.

pub mod horizon;
pub mod sandbox;

use async_trait::async_trait;
use thiserror::Error;

use crate::account::{Balance, SecretSeed};

pub use horizon::HorizonGateway;
pub use sandbox::SandboxLedger;

/// Errors a gateway can raise.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("keypair generation failed: {0}")]
    KeyGeneration(String),

    #[error("http transport error: {0}")]
    Transport(String),

    #[error("ledger responded with status {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("malformed ledger response: {0}")]
    Decode(String),

    #[error("account {0} does not exist on the ledger")]
    UnknownAccount(String),

    #[error("invalid account id: {0}")]
    InvalidAccountId(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// A freshly minted keypair, already StrKey-encoded.
#[derive(Debug, Clone)]
pub struct GeneratedKeypair {
    pub public_key: String,
    pub secret: SecretSeed,
}

/// Confirmation that a funding request was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundReceipt {
    /// Hash of the funding transaction, when the ledger reports one.
    pub hash: Option<String>,
}

/// Network operations consumed by the synchronizer.
///
/// Implementations must be cheap to share (`Arc<dyn LedgerGateway>`); each
/// call is independent and carries no session state.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Creates a brand-new keypair. Nothing touches the network yet.
    async fn create_keypair(&self) -> Result<GeneratedKeypair, GatewayError>;

    /// Requests test funding for `public_key`.
    ///
    /// `Ok(None)` means the ledger answered but did not fund the account.
    async fn fund_account(&self, public_key: &str) -> Result<Option<FundReceipt>, GatewayError>;

    /// The full, ordered balance list for `public_key`.
    async fn get_balances(&self, public_key: &str) -> Result<Vec<Balance>, GatewayError>;
}
