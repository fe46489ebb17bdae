// src/state.rs

use crate::config::AppConfig;
use crate::error::Result;
use crate::imagine::ImagineClient;
use crate::pool::{CredentialPool, CredentialStore, FileCredentialStore, RotationStrategy};
use std::sync::Arc;
use tracing::info;

/// Shared application state handed to every handler. All components are
/// constructed here and injected explicitly; nothing is a global.
pub struct AppState {
    pub config: AppConfig,
    pub pool: Arc<CredentialPool>,
    pub client: Arc<ImagineClient>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let store = build_store(&config).await?;
        let strategy =
            RotationStrategy::parse(&config.pool.strategy).unwrap_or_default();
        let pool = Arc::new(CredentialPool::new(
            store,
            config.pool.credential_file.clone(),
            strategy,
            config.pool.daily_limit,
        ));

        let loaded = pool.load().await?;
        info!(count = loaded, strategy = %strategy, "credential pool initialized");

        let client = Arc::new(ImagineClient::new(&config, pool.clone())?);
        tokio::fs::create_dir_all(&config.media.images_dir).await?;

        Ok(Self {
            config,
            pool,
            client,
        })
    }
}

#[cfg(feature = "redis")]
async fn build_store(config: &AppConfig) -> Result<Arc<dyn CredentialStore>> {
    use crate::error::AppError;
    use crate::pool::RedisCredentialStore;

    if let Some(redis_url) = &config.pool.redis_url {
        let redis_pool = deadpool_redis::Config::from_url(redis_url)
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| AppError::Internal(format!("failed to create Redis pool: {e}")))?;
        info!("using shared Redis credential store");
        return Ok(Arc::new(RedisCredentialStore::new(
            redis_pool,
            config.pool.redis_key_prefix.clone(),
        )));
    }

    file_store(config)
}

#[cfg(not(feature = "redis"))]
async fn build_store(config: &AppConfig) -> Result<Arc<dyn CredentialStore>> {
    file_store(config)
}

fn file_store(config: &AppConfig) -> Result<Arc<dyn CredentialStore>> {
    info!("using file-backed credential store");
    Ok(Arc::new(FileCredentialStore::open(
        config.pool.state_file_path(),
    )?))
}
