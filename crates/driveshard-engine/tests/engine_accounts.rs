//! Account service integration tests
//!
//! Token refresh (including the one-refresh-under-concurrency lock
//! property), error-state transitions, quota sync, and CRUD.

mod support;

use std::sync::atomic::Ordering;

use driveshard_core::domain::AccountStatus;
use driveshard_core::StorageError;
use support::harness;

#[tokio::test]
async fn test_fresh_token_is_not_refreshed() {
    let h = harness().await;
    let account = h.seed_account(1000, 0).await;

    let checked = h
        .engine
        .accounts
        .ensure_token_valid(&account.id, &h.cancel)
        .await
        .unwrap();

    assert_eq!(checked.access_token, "seed-access");
    assert_eq!(h.auth.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_expiring_token_triggers_one_refresh() {
    let h = harness().await;
    // expires in 100s, well inside the 300s refresh window
    let account = h.seed_account_with(1000, 0, 0, 100).await;

    let refreshed = h
        .engine
        .accounts
        .ensure_token_valid(&account.id, &h.cancel)
        .await
        .unwrap();

    assert_eq!(h.auth.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(refreshed.access_token, "refreshed-access-1");
    assert_eq!(refreshed.refresh_token, "rotated-refresh");
    assert!(refreshed.token_expires.is_some());

    // the persisted token is now fresh; a second call does nothing
    h.engine
        .accounts
        .ensure_token_valid(&account.id, &h.cancel)
        .await
        .unwrap();
    assert_eq!(h.auth.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_writers_share_one_refresh() {
    let h = harness().await;
    let account = h.seed_account_with(1000, 0, 0, 100).await;

    let (a, b) = tokio::join!(
        h.engine.accounts.ensure_token_valid(&account.id, &h.cancel),
        h.engine.accounts.ensure_token_valid(&account.id, &h.cancel),
    );

    a.unwrap();
    b.unwrap();
    assert_eq!(h.auth.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_refresh_failure_marks_account_errored() {
    let h = harness().await;
    let account = h.seed_account_with(1000, 0, 0, 100).await;
    h.auth.fail_refresh.store(true, Ordering::SeqCst);

    let err = h
        .engine
        .accounts
        .ensure_token_valid(&account.id, &h.cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Upstream(_)));

    let stored = h.engine.accounts.get(&account.id).await.unwrap();
    assert_eq!(stored.status, AccountStatus::Error);
    assert!(stored.error_message.is_some());

    // errored accounts are invisible to the balancer's candidate set
    assert!(h
        .engine
        .accounts
        .get_active_accounts()
        .await
        .unwrap()
        .is_empty());

    // a later successful refresh heals the account
    h.auth.fail_refresh.store(false, Ordering::SeqCst);
    let healed = h
        .engine
        .accounts
        .ensure_token_valid(&account.id, &h.cancel)
        .await
        .unwrap();
    assert_eq!(healed.status, AccountStatus::Active);
    assert!(healed.error_message.is_none());
}

#[tokio::test]
async fn test_sync_space_pulls_quota() {
    let h = harness().await;
    let account = h.seed_account(0, 0).await;
    h.remote.quota_total.store(5000, Ordering::SeqCst);
    h.remote.quota_used.store(1200, Ordering::SeqCst);

    let synced = h
        .engine
        .accounts
        .sync_space(&account.id, &h.cancel)
        .await
        .unwrap();

    assert_eq!(synced.total_space, 5000);
    assert_eq!(synced.used_space, 1200);
    assert!(synced.last_sync.is_some());
}

#[tokio::test]
async fn test_active_ordering_by_priority_then_id() {
    let h = harness().await;
    let low = h.seed_account_with(1000, 0, 1, 3600).await;
    let high = h.seed_account_with(1000, 0, 9, 3600).await;

    let active = h.engine.accounts.get_active_accounts().await.unwrap();
    assert_eq!(active.len(), 2);
    assert_eq!(active[0].id, high.id);
    assert_eq!(active[1].id, low.id);
}

#[tokio::test]
async fn test_account_crud() {
    let h = harness().await;
    let account = h.seed_account(1000, 0).await;

    let fetched = h.engine.accounts.get(&account.id).await.unwrap();
    assert_eq!(fetched.email, "pool@example.com");

    let updated = h
        .engine
        .accounts
        .update_profile(&account.id, "renamed", 5, AccountStatus::Inactive)
        .await
        .unwrap();
    assert_eq!(updated.display_name, "renamed");
    assert_eq!(updated.priority, 5);
    assert_eq!(updated.status, AccountStatus::Inactive);

    h.engine.accounts.delete(&account.id).await.unwrap();
    let err = h.engine.accounts.get(&account.id).await.unwrap_err();
    assert!(matches!(err, StorageError::AccountNotFound(_)));
}
