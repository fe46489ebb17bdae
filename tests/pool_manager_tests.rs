// tests/pool_manager_tests.rs

use grok_imagine_gateway::pool::store::{CredentialStore, FileCredentialStore};
use grok_imagine_gateway::pool::{CredentialPool, RESET_INTERVAL_SECS, RotationStrategy};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write_credential_file(dir: &Path, lines: &[&str]) -> std::path::PathBuf {
    let path = dir.join("key.txt");
    std::fs::write(&path, lines.join("\n")).unwrap();
    path
}

fn make_pool(
    dir: &Path,
    strategy: RotationStrategy,
    daily_limit: u32,
    lines: &[&str],
) -> (CredentialPool, Arc<FileCredentialStore>) {
    let source = write_credential_file(dir, lines);
    let store = Arc::new(FileCredentialStore::open(dir.join("state.json")).unwrap());
    let pool = CredentialPool::new(store.clone(), source, strategy, daily_limit);
    (pool, store)
}

#[tokio::test]
async fn load_skips_comments_and_blank_lines() {
    let dir = TempDir::new().unwrap();
    let (pool, _) = make_pool(
        dir.path(),
        RotationStrategy::RoundRobin,
        10,
        &["# header", "", "secret-one", "  ", "secret-two", "# trailing"],
    );
    assert_eq!(pool.load().await.unwrap(), 2);
}

#[tokio::test]
async fn load_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let (pool, store) = make_pool(dir.path(), RotationStrategy::RoundRobin, 10, &["secret-one"]);
    pool.load().await.unwrap();
    pool.record_usage("secret-one").await.unwrap();
    pool.load().await.unwrap();
    assert_eq!(store.usage("secret-one").await.unwrap().count, 1);
}

#[tokio::test]
async fn round_robin_visits_each_twice_then_exhausts() {
    let dir = TempDir::new().unwrap();
    let (pool, _) = make_pool(
        dir.path(),
        RotationStrategy::RoundRobin,
        2,
        &["cred-a", "cred-b", "cred-c"],
    );
    pool.load().await.unwrap();

    let mut seen: HashMap<String, u32> = HashMap::new();
    for _ in 0..6 {
        let secret = pool.next_credential().await.unwrap().expect("pool has quota");
        *seen.entry(secret.clone()).or_default() += 1;
        pool.record_usage(&secret).await.unwrap();
    }

    assert_eq!(seen.len(), 3);
    for (secret, count) in &seen {
        assert_eq!(*count, 2, "{secret} should be used exactly twice");
    }

    // the seventh selection finds a quota-exhausted pool
    assert_eq!(pool.next_credential().await.unwrap(), None);
}

#[tokio::test]
async fn usage_count_is_monotonic() {
    let dir = TempDir::new().unwrap();
    let (pool, store) = make_pool(dir.path(), RotationStrategy::LeastUsed, 10, &["cred-a"]);
    pool.load().await.unwrap();

    let mut previous = 0;
    for _ in 0..5 {
        pool.record_usage("cred-a").await.unwrap();
        let count = store.usage("cred-a").await.unwrap().count;
        assert!(count > previous);
        previous = count;
    }
}

#[tokio::test]
async fn selection_never_returns_failed_credential() {
    let dir = TempDir::new().unwrap();
    let (pool, _) = make_pool(
        dir.path(),
        RotationStrategy::RoundRobin,
        10,
        &["cred-a", "cred-b"],
    );
    pool.load().await.unwrap();
    pool.mark_failed("cred-a", "test").await.unwrap();

    for _ in 0..4 {
        let secret = pool.next_credential().await.unwrap().unwrap();
        assert_eq!(secret, "cred-b");
    }
}

#[tokio::test]
async fn exhaustion_recovery_when_all_failed() {
    let dir = TempDir::new().unwrap();
    let (pool, store) = make_pool(
        dir.path(),
        RotationStrategy::Hybrid,
        10,
        &["cred-a", "cred-b", "cred-c"],
    );
    pool.load().await.unwrap();
    for secret in ["cred-a", "cred-b", "cred-c"] {
        pool.mark_failed(secret, "upstream hiccup").await.unwrap();
    }

    // nothing quota-exhausted, everything failed: flags are cleared and the
    // first credential comes back
    let secret = pool.next_credential().await.unwrap();
    assert_eq!(secret.as_deref(), Some("cred-a"));
    for secret in ["cred-a", "cred-b", "cred-c"] {
        assert!(!store.usage(secret).await.unwrap().failed);
    }
}

#[tokio::test]
async fn exhaustion_without_recovery_when_quota_spent() {
    let dir = TempDir::new().unwrap();
    let (pool, _) = make_pool(
        dir.path(),
        RotationStrategy::Hybrid,
        1,
        &["cred-a", "cred-b"],
    );
    pool.load().await.unwrap();
    pool.record_usage("cred-a").await.unwrap();
    pool.record_usage("cred-b").await.unwrap();

    assert_eq!(pool.next_credential().await.unwrap(), None);
}

#[tokio::test]
async fn daily_reset_applies_exactly_once() {
    let dir = TempDir::new().unwrap();
    let (pool, store) = make_pool(
        dir.path(),
        RotationStrategy::LeastUsed,
        10,
        &["cred-a", "cred-b"],
    );
    pool.load().await.unwrap();

    pool.record_usage("cred-a").await.unwrap();
    pool.record_usage("cred-a").await.unwrap();
    pool.mark_failed("cred-b", "test").await.unwrap();

    // put the last reset two windows in the past
    let overdue = chrono::Utc::now().timestamp() - 2 * RESET_INTERVAL_SECS;
    store.set_last_reset(overdue).await.unwrap();

    // first selection past the boundary performs the reset
    pool.next_credential().await.unwrap().unwrap();
    assert_eq!(store.usage("cred-a").await.unwrap().count, 0);
    assert!(!store.usage("cred-b").await.unwrap().failed);

    // a second selection in the same window must not reset again
    pool.record_usage("cred-a").await.unwrap();
    pool.next_credential().await.unwrap().unwrap();
    assert_eq!(store.usage("cred-a").await.unwrap().count, 1);
}

#[tokio::test]
async fn manual_reset_zeroes_the_window() {
    let dir = TempDir::new().unwrap();
    let (pool, store) = make_pool(dir.path(), RotationStrategy::LeastUsed, 10, &["cred-a"]);
    pool.load().await.unwrap();
    pool.record_usage("cred-a").await.unwrap();
    pool.mark_failed("cred-a", "test").await.unwrap();

    pool.reset_daily_usage().await.unwrap();

    let usage = store.usage("cred-a").await.unwrap();
    assert_eq!(usage.count, 0);
    assert!(!usage.failed);
    assert!(store.last_reset().await.unwrap() > 0);
}

#[tokio::test]
async fn age_verified_round_trip() {
    let dir = TempDir::new().unwrap();
    let (pool, _) = make_pool(dir.path(), RotationStrategy::Hybrid, 10, &["cred-a"]);
    pool.load().await.unwrap();

    assert!(!pool.age_verified("cred-a").await.unwrap());
    pool.set_age_verified("cred-a", true).await.unwrap();
    assert!(pool.age_verified("cred-a").await.unwrap());
}

#[tokio::test]
async fn mark_success_clears_failure() {
    let dir = TempDir::new().unwrap();
    let (pool, store) = make_pool(dir.path(), RotationStrategy::Hybrid, 10, &["cred-a"]);
    pool.load().await.unwrap();

    pool.mark_failed("cred-a", "bad attempt").await.unwrap();
    assert!(store.usage("cred-a").await.unwrap().failed);
    pool.mark_success("cred-a").await.unwrap();
    assert!(!store.usage("cred-a").await.unwrap().failed);
}

#[tokio::test]
async fn status_snapshot_reflects_pool() {
    let dir = TempDir::new().unwrap();
    let (pool, _) = make_pool(
        dir.path(),
        RotationStrategy::RoundRobin,
        5,
        &["cred-alpha", "cred-beta"],
    );
    pool.load().await.unwrap();
    pool.record_usage("cred-alpha").await.unwrap();
    pool.mark_failed("cred-beta", "test").await.unwrap();

    let status = pool.status().await.unwrap();
    assert_eq!(status.total, 2);
    assert_eq!(status.failed_count, 1);
    assert_eq!(status.strategy, "round_robin");
    assert_eq!(status.daily_limit, 5);
    assert_eq!(status.credentials.len(), 2);

    let alpha = &status.credentials[0];
    assert_eq!(alpha.used_today, 1);
    assert_eq!(alpha.remaining, 4);
    // secrets never appear verbatim in the snapshot
    assert!(!alpha.credential.contains("cred-alpha"));
}

#[tokio::test]
async fn reload_drops_persisted_state() {
    let dir = TempDir::new().unwrap();
    let (pool, store) = make_pool(dir.path(), RotationStrategy::Hybrid, 10, &["cred-a"]);
    pool.load().await.unwrap();
    pool.record_usage("cred-a").await.unwrap();

    let count = pool.reload().await.unwrap();
    assert_eq!(count, 1);
    assert_eq!(store.usage("cred-a").await.unwrap().count, 0);
}
