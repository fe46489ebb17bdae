// src/cli.rs

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "grok-imagine-gateway",
    version,
    about = "OpenAI-compatible gateway for Grok Imagine with intelligent SSO credential rotation"
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Log level filter
    #[arg(short, long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Emit JSON-formatted logs
    #[arg(long, env = "JSON_LOGS")]
    pub json_logs: bool,
}
