//! End-to-end tests for the account synchronizer.
//!
//! These run the full stack: sled persistence on disk, the registry cache and
//! the sandbox ledger standing in for testnet. Each test gets its own
//! temporary directory, so they can run in parallel.

use std::sync::Arc;
use std::time::Duration;

use lumen_sync::account::keys::decode_account_id;
use lumen_sync::registry::AccountEvent;
use lumen_sync::{
    AccountRegistry, AccountStore, AccountSynchronizer, Balance, SandboxLedger, SledAccountStore,
    SlotOutcome, SyncError, TrackedAccounts,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// Builds a synchronizer over the store in `dir`, hydrated like a fresh start.
fn boot(
    dir: &tempfile::TempDir,
    ledger: Arc<SandboxLedger>,
) -> (AccountSynchronizer, Arc<SledAccountStore>) {
    let store = Arc::new(SledAccountStore::open(dir.path()).expect("open store"));
    let registry = Arc::new(AccountRegistry::new(store.clone(), TrackedAccounts::default()));
    registry.hydrate().expect("hydrate");
    let sync = AccountSynchronizer::new(registry, ledger);
    (sync, store)
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_lifecycle_for_both_slots() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(SandboxLedger::new());
    let (sync, store) = boot(&dir, ledger.clone());

    for slot in ["ayala3", "ayala4"] {
        let created = sync.create(slot).await.unwrap();
        decode_account_id(created.public_key()).expect("created key is a valid account id");
        assert!(created.secret().expose().starts_with('S'));

        let funded = sync.fund(slot).await.unwrap();
        assert_eq!(funded.public_key(), created.public_key());
        assert_eq!(funded.balances(), &[Balance::native("10000.0000000")]);
    }

    let report = sync.refresh_all().await;
    assert_eq!(report.refreshed_count(), 2);
    assert_eq!(store.account_count(), 2);
    assert_ne!(
        store.load("ayala3").unwrap().unwrap().public_key(),
        store.load("ayala4").unwrap().unwrap().public_key()
    );
}

#[tokio::test]
async fn restart_rehydrates_records_and_reference() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(SandboxLedger::new());

    let (funded, hash_id) = {
        let (sync, _store) = boot(&dir, ledger.clone());
        sync.create("ayala3").await.unwrap();
        let funded = sync.fund("ayala3").await.unwrap();
        (funded, sync.registry().hash_id().unwrap())
    };

    let (sync, _store) = boot(&dir, ledger.clone());
    assert_eq!(sync.registry().get_account("ayala3").unwrap(), Some(funded.clone()));
    assert!(sync.registry().get_account("ayala4").unwrap().is_none());
    assert_eq!(sync.registry().hash_id(), Some(hash_id));

    // The restored key is reused, not regenerated.
    let again = sync.create("ayala3").await.unwrap();
    assert_eq!(again, funded);
    assert_eq!(ledger.keypairs_created(), 1);
}

#[tokio::test]
async fn refresh_twice_writes_identical_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(SandboxLedger::new());
    let (sync, store) = boot(&dir, ledger);

    sync.create("ayala4").await.unwrap();
    sync.fund("ayala4").await.unwrap();

    sync.refresh_balances(["ayala4"]).await;
    let first = store.raw_record("ayala4").unwrap().unwrap();
    sync.refresh_balances(["ayala4"]).await;
    let second = store.raw_record("ayala4").unwrap().unwrap();

    assert_eq!(first, second);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn partial_refresh_leaves_failed_slot_as_it_was() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(SandboxLedger::new());
    let (sync, store) = boot(&dir, ledger.clone());

    for slot in ["ayala3", "ayala4"] {
        sync.create(slot).await.unwrap();
        sync.fund(slot).await.unwrap();
    }
    let a = store.load("ayala3").unwrap().unwrap();
    let b = store.load("ayala4").unwrap().unwrap();
    let before = store.raw_record("ayala3").unwrap();

    ledger.fail_balance_queries_for(a.public_key());
    ledger.set_balances(a.public_key(), vec![Balance::native("1.0000000")]);
    ledger.set_balances(b.public_key(), vec![Balance::native("19999.0000000")]);

    let report = sync.refresh_all().await;
    assert!(matches!(
        report.outcome("ayala3"),
        Some(SlotOutcome::Failed(SyncError::QueryFailed { .. }))
    ));
    assert!(matches!(report.outcome("ayala4"), Some(SlotOutcome::Refreshed(_))));

    assert_eq!(store.raw_record("ayala3").unwrap(), before);
    assert_eq!(
        store.load("ayala4").unwrap().unwrap().balances(),
        &[Balance::native("19999.0000000")]
    );
}

#[tokio::test]
async fn funding_an_uncreated_slot_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(SandboxLedger::new());
    let (sync, store) = boot(&dir, ledger.clone());

    assert!(matches!(sync.fund("ayala3").await, Err(SyncError::AccountNotFound(_))));
    assert_eq!(store.account_count(), 0);
    assert_eq!(ledger.fund_calls(), 0);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn dispose_during_refresh_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(SandboxLedger::new());
    let (sync, store) = boot(&dir, ledger.clone());
    sync.create("ayala3").await.unwrap();
    sync.fund("ayala3").await.unwrap();
    let before = store.raw_record("ayala3").unwrap();

    // Slow the ledger down for the refresh only.
    let slow = Arc::new(SandboxLedger::new().with_latency(Duration::from_secs(1)));
    let record = store.load("ayala3").unwrap().unwrap();
    slow.set_balances(record.public_key(), vec![Balance::native("5.0000000")]);
    let sync = Arc::new(AccountSynchronizer::new(sync.registry().clone(), slow.clone()));

    let disposer = {
        let sync = sync.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            sync.dispose();
        }
    };
    let (report, ()) = tokio::join!(sync.refresh_all(), disposer);

    assert!(matches!(
        report.outcome("ayala3"),
        Some(SlotOutcome::Failed(SyncError::Cancelled(_)))
    ));
    assert_eq!(store.raw_record("ayala3").unwrap(), before);
    assert_eq!(slow.balance_queries(), 0);
}

#[tokio::test(start_paused = true)]
async fn subscribers_see_every_committed_change() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(SandboxLedger::new().with_latency(Duration::from_millis(20)));
    let (sync, _store) = boot(&dir, ledger);
    let mut events = sync.registry().subscribe();

    let created = sync.create("ayala3").await.unwrap();
    sync.fund("ayala3").await.unwrap();

    match events.recv().await.unwrap() {
        AccountEvent::AccountUpdated { slot, balances, public_key } => {
            assert_eq!(slot, "ayala3");
            assert_eq!(public_key, created.public_key());
            assert!(balances.is_empty());
        }
        other => panic!("unexpected event: {other:?}"),
    }
    match events.recv().await.unwrap() {
        AccountEvent::AccountUpdated { balances, .. } => {
            assert_eq!(balances, vec![Balance::native("10000.0000000")]);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(matches!(events.recv().await.unwrap(), AccountEvent::HashIdChanged { .. }));
}
