// src/pool/mod.rs

pub mod store;
pub mod strategy;
pub mod usage;

pub use store::{CredentialStore, FileCredentialStore};
#[cfg(feature = "redis")]
pub use store::RedisCredentialStore;
pub use strategy::RotationStrategy;
pub use usage::CredentialUsage;

use crate::error::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

/// Length of one usage window.
pub const RESET_INTERVAL_SECS: i64 = 86_400;

/// Short stable hash identifying a credential in storage keys and logs.
pub fn credential_hash(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    hex::encode(digest)[..12].to_string()
}

/// Log-safe rendering of a secret.
pub fn preview(secret: &str) -> String {
    if secret.len() > 8 {
        format!("{}...{}", &secret[..4], &secret[secret.len() - 4..])
    } else {
        secret.to_string()
    }
}

fn epoch_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Manages the credential list and rotation over a [`CredentialStore`].
///
/// Selection, the daily-reset check and exhaustion recovery are serialized
/// through one internal lock; counter mutations go straight to the store,
/// which is atomic per field.
pub struct CredentialPool {
    store: Arc<dyn CredentialStore>,
    source_path: PathBuf,
    strategy: RotationStrategy,
    daily_limit: u32,
    credentials: RwLock<Vec<String>>,
    select_lock: Mutex<()>,
}

/// Snapshot of one credential for the status endpoint.
#[derive(Debug, Serialize)]
pub struct CredentialStatus {
    pub credential: String,
    pub used_today: u32,
    pub remaining: u32,
    pub last_used: i64,
    pub failed: bool,
    pub age_verified: bool,
}

/// Pool-level snapshot.
#[derive(Debug, Serialize)]
pub struct PoolStatus {
    pub total: usize,
    pub failed_count: usize,
    pub strategy: &'static str,
    pub daily_limit: u32,
    pub next_reset_timestamp: i64,
    pub credentials: Vec<CredentialStatus>,
}

impl CredentialPool {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        source_path: PathBuf,
        strategy: RotationStrategy,
        daily_limit: u32,
    ) -> Self {
        Self {
            store,
            source_path,
            strategy,
            daily_limit,
            credentials: RwLock::new(Vec::new()),
            select_lock: Mutex::new(()),
        }
    }

    pub fn strategy(&self) -> RotationStrategy {
        self.strategy
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    /// Reads the credential source file and registers any new credentials
    /// with the store. Existing persisted counters are left intact.
    #[instrument(skip(self), name = "pool_load")]
    pub async fn load(&self) -> Result<usize> {
        let _guard = self.select_lock.lock().await;
        self.load_locked().await
    }

    async fn load_locked(&self) -> Result<usize> {
        let secrets = self.read_source_file();
        self.store.init_credentials(&secrets, epoch_now()).await?;
        let count = secrets.len();
        *self.credentials.write().await = secrets;
        info!(
            count,
            strategy = %self.strategy,
            source = %self.source_path.display(),
            "credential list loaded"
        );
        Ok(count)
    }

    fn read_source_file(&self) -> Vec<String> {
        let content = match std::fs::read_to_string(&self.source_path) {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    path = %self.source_path.display(),
                    error = %e,
                    "credential source file unreadable"
                );
                return Vec::new();
            }
        };
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect()
    }

    /// Picks the next usable credential, applying the daily-reset check and
    /// the configured strategy. Returns `None` only when the pool is
    /// genuinely quota-exhausted.
    pub async fn next_credential(&self) -> Result<Option<String>> {
        let _guard = self.select_lock.lock().await;

        if self.credentials.read().await.is_empty() {
            self.load_locked().await?;
        }
        let secrets = self.credentials.read().await.clone();
        if secrets.is_empty() {
            return Ok(None);
        }

        self.check_daily_reset(&secrets).await?;

        let mut selectable = Vec::new();
        for secret in &secrets {
            let usage = self.store.usage(secret).await?;
            if usage.is_selectable(self.daily_limit) {
                selectable.push((secret.clone(), usage));
            }
        }

        if selectable.is_empty() {
            return self.handle_exhausted(&secrets).await;
        }

        let rotation_index = if self.strategy == RotationStrategy::RoundRobin {
            self.store.next_rotation_index().await?
        } else {
            0
        };
        let index = strategy::select_index(
            self.strategy,
            &selectable,
            self.daily_limit,
            rotation_index,
            epoch_now(),
        );
        let secret = selectable[index].0.clone();
        debug!(
            credential = %preview(&secret),
            strategy = %self.strategy,
            "selected credential"
        );
        Ok(Some(secret))
    }

    async fn check_daily_reset(&self, secrets: &[String]) -> Result<()> {
        let now = epoch_now();
        if self
            .store
            .try_claim_reset(now, RESET_INTERVAL_SECS)
            .await?
        {
            self.store.reset_usage(secrets).await?;
            info!("daily usage reset applied");
        }
        Ok(())
    }

    /// Nothing selectable. When every credential is flagged failed without
    /// being quota-exhausted, the flags are suspect (likely a transient
    /// upstream issue), so clear them and hand back the first credential.
    /// A genuinely quota-exhausted pool stays exhausted.
    async fn handle_exhausted(&self, secrets: &[String]) -> Result<Option<String>> {
        let mut all_failed = true;
        for secret in secrets {
            if !self.store.usage(secret).await?.failed {
                all_failed = false;
                break;
            }
        }

        if all_failed {
            warn!("every credential is flagged failed; clearing failure flags");
            self.store.clear_all_failed(secrets).await?;
            return Ok(secrets.first().cloned());
        }

        warn!("credential pool exhausted for the current window");
        Ok(None)
    }

    pub async fn record_usage(&self, secret: &str) -> Result<()> {
        self.store.record_usage(secret, epoch_now()).await?;
        debug!(credential = %preview(secret), "usage recorded");
        Ok(())
    }

    pub async fn mark_failed(&self, secret: &str, reason: &str) -> Result<()> {
        self.store.set_failed(secret, true).await?;
        warn!(credential = %preview(secret), reason, "credential marked failed");
        Ok(())
    }

    pub async fn mark_success(&self, secret: &str) -> Result<()> {
        self.store.set_failed(secret, false).await
    }

    pub async fn age_verified(&self, secret: &str) -> Result<bool> {
        Ok(self.store.usage(secret).await?.age_verified)
    }

    pub async fn set_age_verified(&self, secret: &str, verified: bool) -> Result<()> {
        self.store.set_age_verified(secret, verified).await?;
        info!(credential = %preview(secret), verified, "age-verification flag updated");
        Ok(())
    }

    pub async fn status(&self) -> Result<PoolStatus> {
        let secrets = self.credentials.read().await.clone();
        let mut credentials = Vec::with_capacity(secrets.len());
        let mut failed_count = 0;
        for secret in &secrets {
            let usage = self.store.usage(secret).await?;
            if usage.failed {
                failed_count += 1;
            }
            credentials.push(CredentialStatus {
                credential: preview(secret),
                used_today: usage.count,
                remaining: usage.remaining(self.daily_limit),
                last_used: usage.last_used,
                failed: usage.failed,
                age_verified: usage.age_verified,
            });
        }

        let last_reset = self.store.last_reset().await?;
        let next_reset_timestamp = if last_reset > 0 {
            last_reset + RESET_INTERVAL_SECS
        } else {
            0
        };

        Ok(PoolStatus {
            total: secrets.len(),
            failed_count,
            strategy: self.strategy.as_str(),
            daily_limit: self.daily_limit,
            next_reset_timestamp,
            credentials,
        })
    }

    /// Drops all persisted credential state and re-reads the source file.
    pub async fn reload(&self) -> Result<usize> {
        let _guard = self.select_lock.lock().await;
        let secrets = self.credentials.read().await.clone();
        self.store.clear(&secrets).await?;
        self.credentials.write().await.clear();
        self.load_locked().await
    }

    /// Manual, unconditional reset of the current window.
    pub async fn reset_daily_usage(&self) -> Result<()> {
        let _guard = self.select_lock.lock().await;
        let secrets = self.credentials.read().await.clone();
        self.store.reset_usage(&secrets).await?;
        self.store.set_last_reset(epoch_now()).await?;
        info!("manual daily usage reset completed");
        Ok(())
    }
}
