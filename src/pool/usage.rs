// src/pool/usage.rs

use serde::{Deserialize, Serialize};

/// Usage bookkeeping for a single credential within the current 24h window.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialUsage {
    /// Uses recorded since the last daily reset.
    #[serde(default)]
    pub count: u32,
    /// Epoch seconds of the last use; 0 means never used.
    #[serde(default)]
    pub last_used: i64,
    /// Epoch seconds the credential was first seen by the pool.
    #[serde(default)]
    pub first_used: i64,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub age_verified: bool,
}

impl CredentialUsage {
    pub fn new(now: i64) -> Self {
        Self {
            first_used: now,
            ..Self::default()
        }
    }

    /// A credential is selectable when it is not flagged failed and still
    /// has quota in the current window.
    pub fn is_selectable(&self, daily_limit: u32) -> bool {
        !self.failed && self.count < daily_limit
    }

    pub fn remaining(&self, daily_limit: u32) -> u32 {
        daily_limit.saturating_sub(self.count)
    }

    pub fn record_usage(&mut self, now: i64) {
        self.count += 1;
        self.last_used = now;
    }

    /// Daily-reset effect: usage back to zero, failure flag cleared.
    pub fn reset(&mut self) {
        self.count = 0;
        self.failed = false;
    }
}
