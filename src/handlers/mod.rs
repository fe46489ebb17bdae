// src/handlers/mod.rs

pub mod chat;
pub mod images;

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use std::sync::Arc;

/// Bearer-key check against the configured gateway key. An unset key means
/// open access.
pub(crate) fn verify_api_key(config: &AppConfig, headers: &HeaderMap) -> Result<()> {
    let Some(expected) = config.server.api_key.as_ref() else {
        return Ok(());
    };

    let provided = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AppError::InvalidClientApiKey)?;

    if provided != expected.expose_secret() {
        return Err(AppError::InvalidClientApiKey);
    }
    Ok(())
}

/// Maps OpenAI image sizes onto upstream aspect ratios.
pub(crate) fn size_to_aspect_ratio(size: &str) -> &'static str {
    match size {
        "1024x1024" | "512x512" | "256x256" => "1:1",
        "1024x1536" => "2:3",
        "1536x1024" => "3:2",
        _ => "2:3",
    }
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "service": "Grok Imagine Gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let status = state.pool.status().await?;
    Ok(Json(json!({
        "status": "healthy",
        "credentials": status.total,
        "credentials_failed": status.failed_count,
    })))
}

pub async fn list_models() -> Json<Value> {
    Json(json!({
        "object": "list",
        "data": [{
            "id": "grok-imagine",
            "object": "model",
            "created": 1_700_000_000,
            "owned_by": "xai",
        }],
    }))
}
