// src/admin.rs

use crate::error::Result;
use crate::handlers::verify_api_key;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::{delete, get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

pub fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(status))
        .route("/credentials/reload", post(reload_credentials))
        .route("/credentials/reset-usage", post(reset_usage))
        .route("/images/list", get(list_images))
        .route("/images/clear", delete(clear_images))
}

async fn status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    verify_api_key(&state.config, &headers)?;
    let pool_status = state.pool.status().await?;
    Ok(Json(json!({
        "service": "running",
        "pool": pool_status,
        "config": {
            "host": state.config.server.host,
            "port": state.config.server.port,
            "images_dir": state.config.media.images_dir.display().to_string(),
            "base_url": state.config.public_base_url(),
            "credential_file": state.config.pool.credential_file.display().to_string(),
            "redis_enabled": state.config.pool.redis_url.is_some(),
            "rotation_strategy": state.config.pool.strategy,
            "daily_limit": state.config.pool.daily_limit,
        },
    })))
}

async fn reload_credentials(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    verify_api_key(&state.config, &headers)?;
    let count = state.pool.reload().await?;
    info!(count, "credential list reloaded");
    Ok(Json(json!({ "success": true, "count": count })))
}

async fn reset_usage(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    verify_api_key(&state.config, &headers)?;
    state.pool.reset_daily_usage().await?;
    info!("manual daily usage reset");
    Ok(Json(json!({ "success": true, "message": "daily usage counters reset" })))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

async fn list_images(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>> {
    verify_api_key(&state.config, &headers)?;

    let dir = &state.config.media.images_dir;
    let base_url = state.config.public_base_url();
    let mut images = Vec::new();

    if dir.exists() {
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_jpg = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg"));
            if !is_jpg {
                continue;
            }
            let metadata = entry.metadata().await?;
            let modified = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map_or(0, |d| d.as_secs());
            let filename = entry.file_name().to_string_lossy().to_string();
            images.push((
                modified,
                json!({
                    "filename": filename,
                    "url": format!("{base_url}/images/{filename}"),
                    "size": metadata.len(),
                }),
            ));
        }
    }

    images.sort_by(|a, b| b.0.cmp(&a.0));
    images.truncate(params.limit);
    let images: Vec<Value> = images.into_iter().map(|(_, value)| value).collect();

    Ok(Json(json!({ "count": images.len(), "images": images })))
}

async fn clear_images(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    verify_api_key(&state.config, &headers)?;

    let dir = &state.config.media.images_dir;
    let mut deleted = 0usize;
    if dir.exists() {
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
                deleted += 1;
            }
        }
    }

    info!(deleted, "image cache cleared");
    Ok(Json(json!({ "success": true, "deleted": deleted })))
}
