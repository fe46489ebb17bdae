// src/lib.rs

pub mod admin;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod imagine;
pub mod pool;
pub mod state;

use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Request as AxumRequest},
    response::IntoResponse,
    routing::{get, post},
};
use std::{path::PathBuf, sync::Arc, time::Instant};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

pub use config::AppConfig;
pub use error::{AppError, Result};
pub use state::AppState;

/// Builds the application router over the shared state.
pub fn create_router(state: Arc<AppState>) -> Router {
    let images_dir = state.config.media.images_dir.clone();

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/v1/models", get(handlers::list_models))
        .route("/v1/images/generations", post(handlers::images::generate_images))
        .route("/v1/chat/completions", post(handlers::chat::chat_completions))
        .nest("/admin", admin::admin_routes())
        .nest_service("/images", ServeDir::new(images_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Middleware adding a request id and a per-request tracing span.
async fn trace_requests(
    mut req: AxumRequest<Body>,
    next: axum::middleware::Next,
) -> impl IntoResponse {
    let request_id = Uuid::new_v4();
    let start_time = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        http.method = %method,
        url.path = %path,
    );

    req.extensions_mut().insert(request_id);

    async move {
        let mut response = next.run(req).await;
        let elapsed = start_time.elapsed();

        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert("X-Request-ID", value);
        }

        info!(
            http.response.duration = ?elapsed,
            http.status_code = response.status().as_u16(),
            "Finished processing request"
        );

        response
    }
    .instrument(span)
    .await
}

/// Loads configuration, initializes state and assembles the router.
pub async fn run(config_path_override: Option<PathBuf>) -> Result<(Router, AppConfig)> {
    info!("Starting Grok Imagine Gateway...");

    let config_path = config_path_override.unwrap_or_else(|| {
        std::env::var("CONFIG_PATH").map_or_else(|_| PathBuf::from("config.yaml"), PathBuf::from)
    });
    let config = config::load_config(&config_path).map_err(|e| {
        error!(config.path = %config_path.display(), error = ?e, "Failed to load configuration. Exiting.");
        e
    })?;

    info!(
        server.port = config.server.port,
        pool.strategy = %config.pool.strategy,
        pool.daily_limit = config.pool.daily_limit,
        pool.redis = config.pool.redis_url.is_some(),
        upstream.url = %config.upstream.ws_url,
        "Configuration loaded and validated successfully."
    );

    let state = AppState::new(config.clone()).await.map_err(|e| {
        error!(error = ?e, "Failed to initialize application state. Exiting.");
        e
    })?;

    let app = create_router(Arc::new(state)).layer(axum::middleware::from_fn(trace_requests));

    Ok((app, config))
}
