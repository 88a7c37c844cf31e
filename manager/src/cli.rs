//! # CLI Interface
//!
//! Defines the command-line argument structure for `lumen-manager` using
//! `clap` derive. Every flag that selects where state lives or which ledger
//! is talked to is global and has an environment fallback.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use lumen_sync::config::{FRIENDBOT_URL, HORIZON_TESTNET_URL};
use lumen_sync::TrackedAccounts;

use crate::logging::LogFormat;

/// Lumen Pair account manager.
///
/// Creates, funds and refreshes a fixed set of named Stellar testnet
/// accounts, and serves their cached state over HTTP and WebSocket.
#[derive(Parser, Debug)]
#[command(
    name = "lumen-manager",
    about = "Lumen Pair testnet account manager",
    version,
    propagate_version = true
)]
pub struct LumenCli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Directory holding the account database.
    #[arg(long, short = 'd', env = "LUMEN_DATA_DIR", default_value = "./lumen-data", global = true)]
    pub data_dir: PathBuf,

    /// Comma-separated slot names to track.
    #[arg(long, env = "LUMEN_ACCOUNTS", default_value_t = TrackedAccounts::default(), global = true)]
    pub accounts: TrackedAccounts,

    /// Horizon base URL.
    #[arg(long, env = "LUMEN_HORIZON_URL", default_value = HORIZON_TESTNET_URL, global = true)]
    pub horizon_url: String,

    /// Friendbot base URL.
    #[arg(long, env = "LUMEN_FRIENDBOT_URL", default_value = FRIENDBOT_URL, global = true)]
    pub friendbot_url: String,

    /// Use the offline sandbox ledger instead of Horizon and Friendbot.
    #[arg(long, env = "LUMEN_SANDBOX", global = true)]
    pub sandbox: bool,

    /// Log output format.
    #[arg(long, value_enum, env = "LUMEN_LOG_FORMAT", default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,
}

/// Top-level subcommands for the manager binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the HTTP/WS API and the metrics endpoint.
    Serve(ServeArgs),
    /// Create the account for a slot. Existing accounts are kept.
    Create {
        /// Slot name.
        name: String,
    },
    /// Fund a slot's account through Friendbot and load its balances.
    Fund {
        /// Slot name.
        name: String,
    },
    /// Refresh balances for the given slots, or every tracked slot.
    Refresh {
        /// Slot names. Empty means all tracked slots.
        names: Vec<String>,
    },
    /// Print every tracked slot as stored locally.
    Show,
    /// Record a payment's transaction hash and refresh all slots.
    Payment {
        /// Transaction hash of the submitted payment.
        #[arg(long)]
        hash: String,
    },
    /// Print version information and exit.
    Version,
}

/// Arguments for the `serve` subcommand.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port for the REST and WebSocket API.
    #[arg(long, env = "LUMEN_API_PORT", default_value_t = 9841)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "LUMEN_METRICS_PORT", default_value_t = 9842)]
    pub metrics_port: u16,
}
