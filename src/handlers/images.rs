// src/handlers/images.rs

use crate::error::{AppError, Result};
use crate::handlers::{size_to_aspect_ratio, verify_api_key};
use crate::imagine::{GenerationEvent, GenerationRequest, spawn_generation};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

fn default_model() -> String {
    "grok-imagine".to_string()
}

fn default_size() -> String {
    "1024x1536".to_string()
}

fn default_response_format() -> String {
    "url".to_string()
}

/// OpenAI-compatible image generation request.
#[derive(Debug, Deserialize)]
pub struct ImageGenerationRequest {
    pub prompt: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub n: Option<usize>,
    #[serde(default = "default_size")]
    pub size: String,
    #[serde(default = "default_response_format")]
    pub response_format: String,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub struct ImageData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b64_json: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImageGenerationResponse {
    pub created: i64,
    pub data: Vec<ImageData>,
}

/// `POST /v1/images/generations`. With `stream: true` the response is an
/// SSE sequence of `progress` events closed by one `complete` or `error`
/// event; otherwise a regular JSON body.
pub async fn generate_images(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ImageGenerationRequest>,
) -> Result<Response> {
    verify_api_key(&state.config, &headers)?;

    if request.prompt.trim().is_empty() {
        return Err(AppError::BadRequest("prompt must not be empty".to_string()));
    }
    let n = request
        .n
        .unwrap_or(state.config.generation.default_image_count);
    if !(1..=4).contains(&n) {
        return Err(AppError::BadRequest("n must be between 1 and 4".to_string()));
    }

    info!(
        prompt = %request.prompt.chars().take(50).collect::<String>(),
        n,
        stream = request.stream,
        "image generation request"
    );

    let generation = GenerationRequest {
        prompt: request.prompt,
        aspect_ratio: size_to_aspect_ratio(&request.size).to_string(),
        n,
        enable_nsfw: true,
        credential: None,
        max_retries: state.config.generation.max_retries,
    };

    if request.stream {
        let events = spawn_generation(state.client.clone(), generation).map(event_to_sse);
        return Ok(Sse::new(events).keep_alive(KeepAlive::default()).into_response());
    }

    let images = state.client.generate(generation).await?;
    let data = if request.response_format == "b64_json" {
        images
            .b64
            .into_iter()
            .map(|b64| ImageData {
                url: None,
                b64_json: Some(b64),
            })
            .collect()
    } else {
        images
            .urls
            .into_iter()
            .map(|url| ImageData {
                url: Some(url),
                b64_json: None,
            })
            .collect()
    };

    Ok(Json(ImageGenerationResponse {
        created: chrono::Utc::now().timestamp(),
        data,
    })
    .into_response())
}

fn event_to_sse(event: GenerationEvent) -> std::result::Result<Event, axum::Error> {
    match event {
        GenerationEvent::Progress {
            image_id,
            stage,
            is_final,
            completed,
            total,
            ..
        } => Event::default().event("progress").json_data(json!({
            "image_id": image_id,
            "stage": stage,
            "is_final": is_final,
            "completed": completed,
            "total": total,
            "progress": format!("{completed}/{total}"),
        })),
        GenerationEvent::Result { success: true, urls, .. } => {
            Event::default().event("complete").json_data(json!({
                "created": chrono::Utc::now().timestamp(),
                "data": urls.iter().map(|url| json!({ "url": url })).collect::<Vec<_>>(),
            }))
        }
        GenerationEvent::Result {
            error, error_code, ..
        } => Event::default().event("error").json_data(json!({
            "error": error.unwrap_or_else(|| "generation failed".to_string()),
            "error_code": error_code,
        })),
    }
}
