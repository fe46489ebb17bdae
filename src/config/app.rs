// src/config/app.rs

use secrecy::Secret;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bearer key protecting this gateway. Unset means open access.
    #[serde(default)]
    pub api_key: Option<Secret<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_age_verification_url")]
    pub age_verification_url: String,
    /// Cloudflare clearance cookie for the age-verification call.
    #[serde(default)]
    pub cf_clearance: Option<Secret<String>>,
    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            age_verification_url: default_age_verification_url(),
            cf_clearance: None,
            generation_timeout_secs: default_generation_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PoolConfig {
    /// Newline-delimited SSO secrets, one per line, `#` comments allowed.
    #[serde(default = "default_credential_file")]
    pub credential_file: PathBuf,
    /// Persisted pool state for the file backend. Defaults to a sibling of
    /// the credential file.
    #[serde(default)]
    pub state_file: Option<PathBuf>,
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    /// When set, credential state is shared across processes via Redis.
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default)]
    pub redis_key_prefix: Option<String>,
}

impl PoolConfig {
    pub fn state_file_path(&self) -> PathBuf {
        self.state_file.clone().unwrap_or_else(|| {
            self.credential_file
                .parent()
                .map(|p| p.join("sso_state.json"))
                .unwrap_or_else(|| PathBuf::from("sso_state.json"))
        })
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            credential_file: default_credential_file(),
            state_file: None,
            strategy: default_strategy(),
            daily_limit: default_daily_limit(),
            redis_url: None,
            redis_key_prefix: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MediaConfig {
    #[serde(default = "default_images_dir")]
    pub images_dir: PathBuf,
    /// External base URL for generated image links. Derived from host/port
    /// when unset.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            images_dir: default_images_dir(),
            base_url: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_image_count")]
    pub default_image_count: usize,
    #[serde(default = "default_aspect_ratio")]
    pub default_aspect_ratio: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_blocked_retries")]
    pub max_blocked_retries: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            default_image_count: default_image_count(),
            default_aspect_ratio: default_aspect_ratio(),
            max_retries: default_max_retries(),
            max_blocked_retries: default_max_blocked_retries(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

impl AppConfig {
    /// Base URL used in returned image links. Binding to 0.0.0.0 is mapped
    /// to a loopback address, matching what a local client can reach.
    pub fn public_base_url(&self) -> String {
        if let Some(base) = &self.media.base_url {
            return base.trim_end_matches('/').to_string();
        }
        let host = if self.server.host == "0.0.0.0" {
            "127.0.0.1"
        } else {
            self.server.host.as_str()
        };
        format!("http://{host}:{}", self.server.port)
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9563
}

fn default_ws_url() -> String {
    "wss://grok.com/ws/imagine/listen".to_string()
}

fn default_age_verification_url() -> String {
    "https://grok.com/rest/auth/set-birth-date".to_string()
}

fn default_generation_timeout() -> u64 {
    120
}

fn default_credential_file() -> PathBuf {
    PathBuf::from("key.txt")
}

fn default_strategy() -> String {
    "hybrid".to_string()
}

fn default_daily_limit() -> u32 {
    10
}

fn default_images_dir() -> PathBuf {
    PathBuf::from("data/images")
}

fn default_image_count() -> usize {
    4
}

fn default_aspect_ratio() -> String {
    "2:3".to_string()
}

fn default_max_retries() -> u32 {
    5
}

fn default_max_blocked_retries() -> u32 {
    3
}
