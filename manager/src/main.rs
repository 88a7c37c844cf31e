// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Lumen Pair Account Manager
//!
//! Entry point for the `lumen-manager` binary. Parses CLI arguments, opens
//! the account store, picks a ledger gateway and then either runs a single
//! operation or serves the HTTP/WS API.
//!
//! - `serve`  : API server plus Prometheus endpoint
//! - `create` : create a slot's account
//! - `fund`   : fund a slot and load its balances
//! - `refresh`: refresh some or all slots
//! - `show`   : print the locally stored state
//! - `payment`: record a payment hash and refresh everything
//! - `version`: print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;

use lumen_sync::config::explorer_tx_url;
use lumen_sync::{
    AccountRecord, AccountRegistry, AccountSynchronizer, GatewayConfig, HorizonGateway,
    LedgerGateway, RefreshReport, SandboxLedger, SledAccountStore, SlotOutcome,
};

use cli::{Commands, GlobalArgs, LumenCli, ServeArgs};
use metrics::ManagerMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = LumenCli::parse();

    if let Commands::Version = cli.command {
        print_version();
        return Ok(());
    }

    logging::init_logging(logging::DEFAULT_FILTER, cli.global.log_format);
    let sync = Arc::new(build_synchronizer(&cli.global)?);

    let result = match cli.command {
        Commands::Serve(args) => serve(Arc::clone(&sync), args).await,
        Commands::Create { name } => {
            let record = sync.create(&name).await?;
            print_record(&name, Some(&record));
            Ok(())
        }
        Commands::Fund { name } => {
            let record = sync.fund(&name).await?;
            print_record(&name, Some(&record));
            print_hash_id(&sync);
            Ok(())
        }
        Commands::Refresh { names } => {
            let report = if names.is_empty() {
                sync.refresh_all().await
            } else {
                sync.refresh_balances(&names).await
            };
            print_report(&report);
            Ok(())
        }
        Commands::Show => {
            for (name, record) in sync.registry().accounts()? {
                print_record(&name, record.as_ref());
            }
            print_hash_id(&sync);
            Ok(())
        }
        Commands::Payment { hash } => {
            let report = sync.record_payment(&hash).await?;
            print_report(&report);
            print_hash_id(&sync);
            Ok(())
        }
        Commands::Version => Ok(()),
    };

    sync.dispose();
    result
}

/// Opens the store under the data directory and wires the synchronizer to
/// the selected ledger.
fn build_synchronizer(args: &GlobalArgs) -> Result<AccountSynchronizer> {
    let store = open_store(&args.data_dir)?;
    let registry = Arc::new(AccountRegistry::new(store, args.accounts.clone()));
    let present = registry
        .hydrate()
        .context("failed to load stored accounts")?;
    tracing::info!(present, tracked = %args.accounts, "registry hydrated");

    let gateway: Arc<dyn LedgerGateway> = if args.sandbox {
        Arc::new(seeded_sandbox(&registry)?)
    } else {
        let config = GatewayConfig {
            horizon_url: args.horizon_url.clone(),
            friendbot_url: args.friendbot_url.clone(),
            ..GatewayConfig::default()
        };
        tracing::info!(horizon = %config.horizon_url, friendbot = %config.friendbot_url, "using horizon gateway");
        Arc::new(HorizonGateway::new(&config).context("failed to build HTTP client")?)
    };

    Ok(AccountSynchronizer::new(registry, gateway))
}

fn open_store(data_dir: &Path) -> Result<Arc<SledAccountStore>> {
    let db_path = data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;

    let store = SledAccountStore::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");
    Ok(Arc::new(store))
}

/// The sandbox keeps its ledger in memory. Seed it with the balances already
/// stored so funded slots stay funded across runs.
fn seeded_sandbox(registry: &AccountRegistry) -> Result<SandboxLedger> {
    let ledger = SandboxLedger::new();
    for (_, record) in registry.accounts()? {
        if let Some(record) = record.filter(AccountRecord::is_funded) {
            ledger.set_balances(record.public_key(), record.balances().to_vec());
        }
    }
    tracing::info!("using offline sandbox ledger");
    Ok(ledger)
}

/// Serves the API and metrics endpoints until SIGINT/SIGTERM, then disposes
/// the synchronizer so in-flight operations drop their results.
async fn serve(sync: Arc<AccountSynchronizer>, args: ServeArgs) -> Result<()> {
    let metrics = Arc::new(ManagerMetrics::new().context("failed to register metrics")?);

    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        sync: Arc::clone(&sync),
        metrics: Arc::clone(&metrics),
    };
    api::update_present_gauge(&app_state);

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Initial refresh ---
    let startup_sync = Arc::clone(&sync);
    let startup_refresh = tokio::spawn(async move {
        let report = startup_sync.refresh_all().await;
        tracing::info!(
            refreshed = report.refreshed_count(),
            failed = report.failures().count(),
            "startup refresh finished"
        );
    });

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    sync.dispose();
    startup_refresh.abort();
    tracing::info!("lumen-manager stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_record(name: &str, record: Option<&AccountRecord>) {
    match record {
        None => println!("{name:<12} (no account)"),
        Some(record) => {
            println!("{name:<12} {}", record.public_key());
            if record.balances().is_empty() {
                println!("{:<12}   unfunded", "");
            }
            for balance in record.balances() {
                println!("{:<12}   {:>20} {}", "", balance.amount, balance.asset_code);
            }
        }
    }
}

fn print_report(report: &RefreshReport) {
    for (name, outcome) in report.iter() {
        match outcome {
            SlotOutcome::Refreshed(balances) => {
                let lines: Vec<String> = balances
                    .iter()
                    .map(|b| format!("{} {}", b.amount, b.asset_code))
                    .collect();
                println!("{name:<12} refreshed  {}", lines.join(", "));
            }
            SlotOutcome::Skipped => println!("{name:<12} skipped    (no account)"),
            SlotOutcome::Failed(e) => println!("{name:<12} failed     {e}"),
        }
    }
}

fn print_hash_id(sync: &AccountSynchronizer) {
    if let Some(hash) = sync.registry().hash_id() {
        println!();
        println!("Last operation : {hash}");
        println!("Explorer       : {}", explorer_tx_url(&hash));
    }
}

/// Prints version information to stdout.
fn print_version() {
    println!("lumen-manager {}", env!("CARGO_PKG_VERSION"));
    println!("rustc         {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// A handler that fails to install simply never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
