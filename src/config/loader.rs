// src/config/loader.rs

use crate::config::{AppConfig, validate};
use crate::error::Result;
use secrecy::Secret;
use std::path::Path;
use tracing::{debug, info, warn};

/// Load configuration from a YAML file, apply environment overrides,
/// then validate.
pub fn load_config(config_path: &Path) -> Result<AppConfig> {
    let mut config = if config_path.exists() {
        info!("Loading configuration from file: {}", config_path.display());
        load_from_file(config_path)?
    } else {
        info!("Configuration file not found, using defaults");
        AppConfig::default()
    };

    override_with_env(&mut config);
    validate(&config)?;

    debug!("Configuration loaded and validated successfully");
    Ok(config)
}

fn load_from_file(config_path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(config_path)?;
    Ok(serde_yaml::from_str(&content)?)
}

fn override_with_env(config: &mut AppConfig) {
    if let Ok(port_str) = std::env::var("PORT") {
        if let Ok(port) = port_str.parse::<u16>() {
            info!("Overriding server port from environment variable: {}", port);
            config.server.port = port;
        } else {
            warn!("Invalid PORT environment variable: {}", port_str);
        }
    }

    if let Ok(api_key) = std::env::var("API_KEY") {
        if !api_key.is_empty() {
            info!("Overriding gateway API key from environment variable");
            config.server.api_key = Some(Secret::new(api_key));
        }
    }

    if let Ok(redis_url) = std::env::var("REDIS_URL") {
        info!("Overriding Redis URL from environment variable");
        config.pool.redis_url = Some(redis_url);
    }

    if let Ok(sso_file) = std::env::var("SSO_FILE") {
        info!("Overriding credential file from environment variable: {}", sso_file);
        config.pool.credential_file = sso_file.into();
    }

    if let Ok(cf_clearance) = std::env::var("CF_CLEARANCE") {
        if !cf_clearance.is_empty() {
            info!("Overriding cf_clearance from environment variable");
            config.upstream.cf_clearance = Some(Secret::new(cf_clearance));
        }
    }
}
