// src/handlers/chat.rs

use crate::error::{AppError, Result};
use crate::handlers::verify_api_key;
use crate::imagine::{GenerationEvent, GenerationRequest, spawn_generation};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::{StreamExt, stream};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

fn default_model() -> String {
    "grok-imagine".to_string()
}

fn default_stream() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// OpenAI-compatible chat completion request. The last user message is the
/// image prompt.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default = "default_model")]
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default)]
    pub n: Option<usize>,
}

fn extract_prompt(messages: &[ChatMessage]) -> Option<String> {
    messages
        .iter()
        .rev()
        .find(|message| message.role == "user" && !message.content.trim().is_empty())
        .map(|message| message.content.trim().to_string())
}

fn markdown_images(urls: &[String]) -> String {
    urls.iter()
        .map(|url| format!("![image]({url})"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn chat_chunk(id: &str, model: &str, delta: Value, finish_reason: Option<&str>) -> Value {
    json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": chrono::Utc::now().timestamp(),
        "model": model,
        "choices": [{
            "index": 0,
            "delta": delta,
            "finish_reason": finish_reason,
        }],
    })
}

/// `POST /v1/chat/completions`. Streaming mode emits progress as
/// `chat.completion.chunk` deltas and closes with markdown image links, a
/// stop chunk and `[DONE]`.
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Response> {
    verify_api_key(&state.config, &headers)?;

    let prompt = extract_prompt(&request.messages)
        .ok_or_else(|| AppError::BadRequest("no user message with content".to_string()))?;
    let n = request
        .n
        .unwrap_or(state.config.generation.default_image_count);
    if !(1..=4).contains(&n) {
        return Err(AppError::BadRequest("n must be between 1 and 4".to_string()));
    }

    info!(
        prompt = %prompt.chars().take(50).collect::<String>(),
        n,
        stream = request.stream,
        "chat completion request"
    );

    let generation = GenerationRequest {
        prompt,
        aspect_ratio: state.config.generation.default_aspect_ratio.clone(),
        n,
        enable_nsfw: true,
        credential: None,
        max_retries: state.config.generation.max_retries,
    };

    if !request.stream {
        let images = state.client.generate(generation).await?;
        let completion = json!({
            "id": format!("chatcmpl-{}", Uuid::new_v4()),
            "object": "chat.completion",
            "created": chrono::Utc::now().timestamp(),
            "model": request.model,
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": markdown_images(&images.urls),
                },
                "finish_reason": "stop",
            }],
        });
        return Ok(Json(completion).into_response());
    }

    let completion_id = format!("chatcmpl-{}", Uuid::new_v4());
    let model = request.model;

    let opening = chat_chunk(&completion_id, &model, json!({ "role": "assistant" }), None);
    let opening_events = vec![sse_json(opening)];

    let generation_events = spawn_generation(state.client.clone(), generation).flat_map({
        let completion_id = completion_id.clone();
        let model = model.clone();
        move |event| {
            let events = match event {
                GenerationEvent::Progress {
                    stage,
                    completed,
                    total,
                    ..
                } => {
                    vec![sse_json(chat_chunk(
                        &completion_id,
                        &model,
                        json!({
                            "thinking": format!("Generating images ({stage})... {completed}/{total}"),
                        }),
                        None,
                    ))]
                }
                GenerationEvent::Result { success: true, urls, .. } => vec![
                    sse_json(chat_chunk(
                        &completion_id,
                        &model,
                        json!({ "content": markdown_images(&urls) }),
                        None,
                    )),
                    sse_json(chat_chunk(&completion_id, &model, json!({}), Some("stop"))),
                    sse_done(),
                ],
                GenerationEvent::Result { error, .. } => vec![
                    sse_json(chat_chunk(
                        &completion_id,
                        &model,
                        json!({
                            "content": format!(
                                "Generation failed: {}",
                                error.unwrap_or_else(|| "unknown error".to_string())
                            ),
                        }),
                        None,
                    )),
                    sse_json(chat_chunk(&completion_id, &model, json!({}), Some("stop"))),
                    sse_done(),
                ],
            };
            stream::iter(events)
        }
    });

    let events = stream::iter(opening_events).chain(generation_events);
    Ok(Sse::new(events).keep_alive(KeepAlive::default()).into_response())
}

fn sse_json(value: Value) -> std::result::Result<Event, axum::Error> {
    Ok(Event::default().data(value.to_string()))
}

fn sse_done() -> std::result::Result<Event, axum::Error> {
    Ok(Event::default().data("[DONE]"))
}
