// src/pool/store/file.rs

use crate::error::Result;
use crate::pool::credential_hash;
use crate::pool::store::CredentialStore;
use crate::pool::usage::CredentialUsage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// On-disk shape of the pool state, rewritten wholesale on every mutation.
/// Usage entries are keyed by a short stable hash of the secret so the
/// state file never contains the secrets themselves.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PoolStateFile {
    #[serde(default)]
    last_reset: i64,
    #[serde(default)]
    current_index: u64,
    #[serde(default)]
    usage: HashMap<String, CredentialUsage>,
}

/// Single-process backend. All state lives behind one exclusive lock and is
/// flushed to a JSON file after each mutating operation, so counters survive
/// restarts.
pub struct FileCredentialStore {
    path: PathBuf,
    state: Mutex<PoolStateFile>,
}

impl FileCredentialStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str(&content) {
                Ok(state) => {
                    info!(path = %path.display(), "loaded persisted pool state");
                    state
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "pool state file unreadable, starting fresh");
                    PoolStateFile::default()
                }
            }
        } else {
            PoolStateFile::default()
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    fn persist(&self, state: &PoolStateFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn init_credentials(&self, secrets: &[String], now: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut changed = false;
        for secret in secrets {
            let key = credential_hash(secret);
            if !state.usage.contains_key(&key) {
                state.usage.insert(key, CredentialUsage::new(now));
                changed = true;
            }
        }
        if changed {
            self.persist(&state)?;
        }
        Ok(())
    }

    async fn usage(&self, secret: &str) -> Result<CredentialUsage> {
        let state = self.state.lock().await;
        Ok(state
            .usage
            .get(&credential_hash(secret))
            .cloned()
            .unwrap_or_default())
    }

    async fn record_usage(&self, secret: &str, now: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .usage
            .entry(credential_hash(secret))
            .or_default()
            .record_usage(now);
        self.persist(&state)
    }

    async fn set_failed(&self, secret: &str, failed: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .usage
            .entry(credential_hash(secret))
            .or_default()
            .failed = failed;
        self.persist(&state)
    }

    async fn set_age_verified(&self, secret: &str, verified: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .usage
            .entry(credential_hash(secret))
            .or_default()
            .age_verified = verified;
        self.persist(&state)
    }

    async fn clear_all_failed(&self, secrets: &[String]) -> Result<()> {
        let mut state = self.state.lock().await;
        for secret in secrets {
            if let Some(usage) = state.usage.get_mut(&credential_hash(secret)) {
                usage.failed = false;
            }
        }
        self.persist(&state)
    }

    async fn reset_usage(&self, secrets: &[String]) -> Result<()> {
        let mut state = self.state.lock().await;
        for secret in secrets {
            if let Some(usage) = state.usage.get_mut(&credential_hash(secret)) {
                usage.reset();
            }
        }
        self.persist(&state)
    }

    async fn last_reset(&self) -> Result<i64> {
        let state = self.state.lock().await;
        Ok(state.last_reset)
    }

    async fn set_last_reset(&self, now: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        state.last_reset = now;
        self.persist(&state)
    }

    async fn try_claim_reset(&self, now: i64, interval: i64) -> Result<bool> {
        // Check and claim under the same lock acquisition, so concurrent
        // callers observing the same overdue boundary produce one reset.
        let mut state = self.state.lock().await;
        if state.last_reset == 0 {
            state.last_reset = now;
            self.persist(&state)?;
            return Ok(false);
        }
        if now - state.last_reset >= interval {
            state.last_reset = now;
            self.persist(&state)?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn next_rotation_index(&self) -> Result<u64> {
        let mut state = self.state.lock().await;
        let index = state.current_index;
        state.current_index += 1;
        self.persist(&state)?;
        Ok(index)
    }

    async fn clear(&self, secrets: &[String]) -> Result<()> {
        let mut state = self.state.lock().await;
        for secret in secrets {
            state.usage.remove(&credential_hash(secret));
        }
        state.current_index = 0;
        self.persist(&state)
    }
}
