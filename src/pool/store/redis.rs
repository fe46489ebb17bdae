// src/pool/store/redis.rs

use crate::error::Result;
use crate::pool::credential_hash;
use crate::pool::store::CredentialStore;
use crate::pool::usage::CredentialUsage;
use async_trait::async_trait;
use deadpool_redis::{Connection, Pool};
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::debug;

const CREDENTIALS_SET: &str = "credentials";
const ROTATION_INDEX_KEY: &str = "rotation_index";
const LAST_RESET_KEY: &str = "last_reset";

/// Compare-driven claim of the daily-reset boundary: exactly one process
/// moves `last_reset` forward per 24h window.
const CLAIM_RESET_SCRIPT: &str = r"
local last = tonumber(redis.call('GET', KEYS[1]) or '0')
local now = tonumber(ARGV[1])
local interval = tonumber(ARGV[2])
if last == 0 then
  redis.call('SET', KEYS[1], now)
  return 0
end
if now - last >= interval then
  redis.call('SET', KEYS[1], now)
  return 1
end
return 0
";

/// Shared backend for multi-process deployments. Per-credential fields live
/// in a hash keyed by a short stable hash of the secret; membership, the
/// rotation cursor and the reset epoch are plain keys under one prefix.
pub struct RedisCredentialStore {
    pool: Pool,
    prefix: String,
}

impl RedisCredentialStore {
    pub fn new(pool: Pool, prefix: Option<String>) -> Self {
        Self {
            pool,
            prefix: prefix.unwrap_or_else(|| "imagine:".to_string()),
        }
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn usage_key(&self, secret: &str) -> String {
        self.prefixed(&format!("usage:{}", credential_hash(secret)))
    }

    async fn connection(&self) -> Result<Connection> {
        self.pool.get().await.map_err(Into::into)
    }
}

fn parse_usage(fields: &HashMap<String, String>) -> CredentialUsage {
    let int = |name: &str| {
        fields
            .get(name)
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or(0)
    };
    CredentialUsage {
        count: int("count").max(0) as u32,
        last_used: int("last_used"),
        first_used: int("first_used"),
        failed: int("failed") != 0,
        age_verified: int("age_verified") != 0,
    }
}

#[async_trait]
impl CredentialStore for RedisCredentialStore {
    async fn init_credentials(&self, secrets: &[String], now: i64) -> Result<()> {
        if secrets.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for secret in secrets {
            pipe.sadd(self.prefixed(CREDENTIALS_SET), secret.as_str());
            // HSETNX keeps counters from earlier runs intact.
            let usage_key = self.usage_key(secret);
            pipe.hset_nx(&usage_key, "count", 0);
            pipe.hset_nx(&usage_key, "last_used", 0);
            pipe.hset_nx(&usage_key, "first_used", now);
            pipe.hset_nx(&usage_key, "failed", 0);
            pipe.hset_nx(&usage_key, "age_verified", 0);
        }
        let _: () = pipe.query_async(&mut conn).await?;
        debug!(count = secrets.len(), "initialized credential entries in redis");
        Ok(())
    }

    async fn usage(&self, secret: &str) -> Result<CredentialUsage> {
        let mut conn = self.connection().await?;
        let fields: HashMap<String, String> = conn.hgetall(self.usage_key(secret)).await?;
        Ok(parse_usage(&fields))
    }

    async fn record_usage(&self, secret: &str, now: i64) -> Result<()> {
        let mut conn = self.connection().await?;
        let usage_key = self.usage_key(secret);
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hincr(&usage_key, "count", 1);
        pipe.hset(&usage_key, "last_used", now);
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn set_failed(&self, secret: &str, failed: bool) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .hset(self.usage_key(secret), "failed", i32::from(failed))
            .await?;
        Ok(())
    }

    async fn set_age_verified(&self, secret: &str, verified: bool) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .hset(self.usage_key(secret), "age_verified", i32::from(verified))
            .await?;
        Ok(())
    }

    async fn clear_all_failed(&self, secrets: &[String]) -> Result<()> {
        let mut conn = self.connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for secret in secrets {
            pipe.hset(self.usage_key(secret), "failed", 0);
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn reset_usage(&self, secrets: &[String]) -> Result<()> {
        let mut conn = self.connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for secret in secrets {
            let usage_key = self.usage_key(secret);
            pipe.hset(&usage_key, "count", 0);
            pipe.hset(&usage_key, "failed", 0);
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn last_reset(&self) -> Result<i64> {
        let mut conn = self.connection().await?;
        let value: Option<i64> = conn.get(self.prefixed(LAST_RESET_KEY)).await?;
        Ok(value.unwrap_or(0))
    }

    async fn set_last_reset(&self, now: i64) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.set(self.prefixed(LAST_RESET_KEY), now).await?;
        Ok(())
    }

    async fn try_claim_reset(&self, now: i64, interval: i64) -> Result<bool> {
        let mut conn = self.connection().await?;
        let claimed: i32 = redis::Script::new(CLAIM_RESET_SCRIPT)
            .key(self.prefixed(LAST_RESET_KEY))
            .arg(now)
            .arg(interval)
            .invoke_async(&mut conn)
            .await?;
        Ok(claimed == 1)
    }

    async fn next_rotation_index(&self) -> Result<u64> {
        let mut conn = self.connection().await?;
        let index: u64 = conn.incr(self.prefixed(ROTATION_INDEX_KEY), 1).await?;
        Ok(index - 1)
    }

    async fn clear(&self, secrets: &[String]) -> Result<()> {
        let mut conn = self.connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for secret in secrets {
            pipe.del(self.usage_key(secret));
        }
        pipe.del(self.prefixed(CREDENTIALS_SET));
        pipe.del(self.prefixed(ROTATION_INDEX_KEY));
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }
}
