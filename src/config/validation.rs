// src/config/validation.rs

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::pool::RotationStrategy;
use url::Url;

/// Reject configurations that would fail at request time.
pub fn validate(config: &AppConfig) -> Result<()> {
    if RotationStrategy::parse(&config.pool.strategy).is_none() {
        return Err(AppError::Config(format!(
            "unknown rotation strategy '{}' (expected one of: round_robin, least_used, least_recent, weighted, hybrid)",
            config.pool.strategy
        )));
    }

    if config.pool.daily_limit == 0 {
        return Err(AppError::Config(
            "pool.daily_limit must be at least 1".to_string(),
        ));
    }

    if !(1..=4).contains(&config.generation.default_image_count) {
        return Err(AppError::Config(
            "generation.default_image_count must be between 1 and 4".to_string(),
        ));
    }

    if config.generation.max_retries == 0 {
        return Err(AppError::Config(
            "generation.max_retries must be at least 1".to_string(),
        ));
    }

    if config.upstream.generation_timeout_secs == 0 {
        return Err(AppError::Config(
            "upstream.generation_timeout_secs must be at least 1".to_string(),
        ));
    }

    if !config.upstream.ws_url.starts_with("wss://") && !config.upstream.ws_url.starts_with("ws://")
    {
        return Err(AppError::Config(format!(
            "upstream.ws_url must be a ws:// or wss:// URL, got '{}'",
            config.upstream.ws_url
        )));
    }

    if let Some(base_url) = &config.media.base_url {
        Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("media.base_url is not a valid URL: {e}")))?;
    }

    Ok(())
}
