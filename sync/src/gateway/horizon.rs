//! # Horizon Gateway
//!
//! [`LedgerGateway`] backed by a Horizon server and Friendbot.
//!
//! | Operation       | Request                              |
//! |-----------------|--------------------------------------|
//! | `create_keypair`| local Ed25519 generation             |
//! | `fund_account`  | `GET {friendbot}/?addr={G...}`       |
//! | `get_balances`  | `GET {horizon}/accounts/{G...}`      |

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::{FundReceipt, GatewayError, GeneratedKeypair, LedgerGateway};
use crate::account::keys::{decode_account_id, StellarKeypair};
use crate::account::Balance;
use crate::config::{GatewayConfig, NATIVE_ASSET_CODE};

// ---------------------------------------------------------------------------
// Horizon DTOs
// ---------------------------------------------------------------------------

/// The subset of Horizon's account resource we read.
#[derive(Debug, Deserialize)]
pub(crate) struct HorizonAccount {
    pub balances: Vec<HorizonBalance>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HorizonBalance {
    pub balance: String,
    pub asset_type: String,
    #[serde(default)]
    pub asset_code: Option<String>,
    #[serde(default)]
    pub liquidity_pool_id: Option<String>,
}

/// Friendbot's success body. Only the hash matters to us.
#[derive(Debug, Deserialize)]
struct FriendbotResponse {
    #[serde(default)]
    hash: Option<String>,
}

/// Maps Horizon balance lines to snapshot lines, preserving order.
///
/// Native lines become `XLM`, credit lines keep their asset code, and
/// liquidity-pool shares are reported under their pool id.
pub(crate) fn balances_from_horizon(account: HorizonAccount) -> Vec<Balance> {
    account
        .balances
        .into_iter()
        .map(|line| {
            let code = match line.asset_type.as_str() {
                "native" => NATIVE_ASSET_CODE.to_string(),
                _ => line
                    .asset_code
                    .or(line.liquidity_pool_id)
                    .unwrap_or(line.asset_type),
            };
            Balance::new(code, line.balance)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// HorizonGateway
// ---------------------------------------------------------------------------

pub struct HorizonGateway {
    client: Client,
    horizon_url: String,
    friendbot_url: String,
}

impl HorizonGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            horizon_url: config.horizon_url.trim_end_matches('/').to_string(),
            friendbot_url: config.friendbot_url.trim_end_matches('/').to_string(),
        })
    }

    fn check_account_id(public_key: &str) -> Result<(), GatewayError> {
        decode_account_id(public_key)
            .map(|_| ())
            .map_err(|e| GatewayError::InvalidAccountId(e.to_string()))
    }
}

#[async_trait]
impl LedgerGateway for HorizonGateway {
    async fn create_keypair(&self) -> Result<GeneratedKeypair, GatewayError> {
        let keypair = StellarKeypair::generate();
        Ok(GeneratedKeypair {
            public_key: keypair.account_id(),
            secret: keypair.secret_seed(),
        })
    }

    async fn fund_account(&self, public_key: &str) -> Result<Option<FundReceipt>, GatewayError> {
        Self::check_account_id(public_key)?;

        let response = self
            .client
            .get(format!("{}/", self.friendbot_url))
            .query(&[("addr", public_key)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            debug!(%public_key, status = status.as_u16(), "friendbot declined funding");
            return Ok(None);
        }

        let body: FriendbotResponse = response.json().await?;
        debug!(%public_key, hash = ?body.hash, "friendbot funded account");
        Ok(Some(FundReceipt { hash: body.hash }))
    }

    async fn get_balances(&self, public_key: &str) -> Result<Vec<Balance>, GatewayError> {
        Self::check_account_id(public_key)?;

        let response = self
            .client
            .get(format!("{}/accounts/{}", self.horizon_url, public_key))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(GatewayError::UnknownAccount(public_key.to_string())),
            status if !status.is_success() => {
                let detail = response.text().await.unwrap_or_default();
                Err(GatewayError::Status {
                    status: status.as_u16(),
                    detail,
                })
            }
            _ => {
                let account: HorizonAccount = response.json().await?;
                let balances = balances_from_horizon(account);
                debug!(%public_key, lines = balances.len(), "fetched balances");
                Ok(balances)
            }
        }
    }
}
