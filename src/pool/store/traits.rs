// src/pool/store/traits.rs

use crate::error::Result;
use crate::pool::usage::CredentialUsage;
use async_trait::async_trait;

/// Persistence contract for per-credential usage state.
///
/// The pool manager's algorithms (strategies, daily reset, exhaustion
/// recovery) are written once against this trait; backends differ only in
/// where the counters live. The file backend serializes everything behind
/// one in-process lock; the Redis backend relies on atomic per-field
/// operations so several gateway processes can share one pool.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Create usage entries for credentials the store has not seen yet.
    /// Existing entries keep their persisted counters.
    async fn init_credentials(&self, secrets: &[String], now: i64) -> Result<()>;

    async fn usage(&self, secret: &str) -> Result<CredentialUsage>;

    /// Atomically bump the usage count and stamp last-used.
    async fn record_usage(&self, secret: &str, now: i64) -> Result<()>;

    async fn set_failed(&self, secret: &str, failed: bool) -> Result<()>;

    async fn set_age_verified(&self, secret: &str, verified: bool) -> Result<()>;

    /// Exhaustion-recovery path: drop every failure flag.
    async fn clear_all_failed(&self, secrets: &[String]) -> Result<()>;

    /// Daily-reset effect: zero every count and clear every failure flag.
    async fn reset_usage(&self, secrets: &[String]) -> Result<()>;

    async fn last_reset(&self) -> Result<i64>;

    async fn set_last_reset(&self, now: i64) -> Result<()>;

    /// Check-and-claim of the 24h boundary. Returns true for exactly one
    /// caller per window; that caller applies [`Self::reset_usage`]. A store
    /// with `last_reset == 0` starts its first window at `now` and claims
    /// nothing.
    async fn try_claim_reset(&self, now: i64, interval: i64) -> Result<bool>;

    /// Monotonically increasing round-robin cursor, starting at 0.
    async fn next_rotation_index(&self) -> Result<u64>;

    /// Drop all persisted credential state (used by `reload()`).
    async fn clear(&self, secrets: &[String]) -> Result<()>;
}
