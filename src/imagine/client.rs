// src/imagine/client.rs

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::imagine::media::{GeneratedImages, MediaStore};
use crate::imagine::protocol::{GenerationMessage, UpstreamFrame};
use crate::imagine::retry::{self, RetryPolicy};
use crate::imagine::session::{
    BLOCKED_READ_TIMEOUT_WINDOW, BLOCKED_STEADY_WINDOW, GenerationSession,
};
use crate::imagine::stream::ProgressSender;
use crate::pool::{self, CredentialPool};
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, Secret};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Per-read wait inside the receive loop.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);
/// Liveness ping cadence on the upstream socket.
pub const PING_INTERVAL: Duration = Duration::from_secs(20);
/// Budget for the WebSocket handshake itself.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const BIRTH_DATE: &str = "2001-01-01T16:00:00.000Z";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// One logical generate call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub aspect_ratio: String,
    pub n: usize,
    pub enable_nsfw: bool,
    /// Pinned credential: bypasses pool selection and disables rotation.
    pub credential: Option<String>,
    pub max_retries: u32,
}

/// Drives generation sessions against the upstream imagine service.
pub struct ImagineClient {
    ws_url: String,
    age_verification_url: String,
    cf_clearance: Option<Secret<String>>,
    generation_timeout: Duration,
    max_blocked_retries: u32,
    pool: Arc<CredentialPool>,
    media: MediaStore,
    http: reqwest::Client,
}

impl ImagineClient {
    pub fn new(config: &AppConfig, pool: Arc<CredentialPool>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            ws_url: config.upstream.ws_url.clone(),
            age_verification_url: config.upstream.age_verification_url.clone(),
            cf_clearance: config.upstream.cf_clearance.clone(),
            generation_timeout: Duration::from_secs(config.upstream.generation_timeout_secs),
            max_blocked_retries: config.generation.max_blocked_retries,
            pool,
            media: MediaStore::new(config.media.images_dir.clone(), config.public_base_url()),
            http,
        })
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    /// End-to-end generation with rotation retries.
    pub async fn generate(&self, request: GenerationRequest) -> Result<GeneratedImages> {
        self.generate_with_progress(request, None).await
    }

    /// Same, with progress updates flowing into the streaming bridge.
    pub async fn generate_with_progress(
        &self,
        request: GenerationRequest,
        progress: Option<ProgressSender>,
    ) -> Result<GeneratedImages> {
        let policy = RetryPolicy {
            max_retries: request.max_retries,
            max_blocked_retries: self.max_blocked_retries,
        };
        let pinned = request.credential.as_deref();
        let progress = progress.as_ref();
        let request = &request;

        retry::run_with_rotation(&self.pool, &policy, pinned, |credential| async move {
            self.ensure_age_verified(&credential).await;
            self.do_generate(&credential, request, progress).await
        })
        .await
    }

    /// One attempt: connect, send the request message, consume frames until
    /// completion, a heuristic fires, an error frame short-circuits, or the
    /// attempt budget runs out, then persist what was captured.
    #[instrument(skip_all, fields(credential = %pool::preview(credential)))]
    async fn do_generate(
        &self,
        credential: &str,
        request: &GenerationRequest,
        progress: Option<&ProgressSender>,
    ) -> Result<GeneratedImages> {
        let request_id = Uuid::new_v4();
        let message =
            GenerationMessage::new(&request_id, &request.prompt, &request.aspect_ratio, request.enable_nsfw);

        let mut ws_request = self
            .ws_url
            .as_str()
            .into_client_request()
            .map_err(|e| AppError::ConnectionError(format!("invalid upstream url: {e}")))?;
        let cookie = HeaderValue::from_str(&format!("sso={credential}; sso-rw={credential}"))
            .map_err(|e| AppError::ConnectionError(format!("credential not header-safe: {e}")))?;
        let headers = ws_request.headers_mut();
        headers.insert(header::COOKIE, cookie);
        headers.insert(header::ORIGIN, HeaderValue::from_static("https://grok.com"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));

        info!(url = %self.ws_url, request_id = %request_id, "connecting to upstream");
        let (mut ws, _) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(ws_request))
            .await
            .map_err(|_| AppError::ConnectionError("websocket connect timed out".to_string()))?
            .map_err(|e| AppError::ConnectionError(format!("websocket connect failed: {e}")))?;

        ws.send(Message::Text(serde_json::to_string(&message)?))
            .await
            .map_err(|e| AppError::ConnectionError(format!("failed to send request: {e}")))?;
        info!(prompt = %truncate(&request.prompt, 50), n = request.n, "generation request sent");

        let deadline = Instant::now() + self.generation_timeout;
        let mut session = GenerationSession::new(request.n);
        let mut upstream_error: Option<AppError> = None;
        let mut last_activity = Instant::now();
        let mut last_ping = Instant::now();
        let mut deadline_hit = false;

        loop {
            let now = Instant::now();
            if now >= deadline {
                deadline_hit = true;
                break;
            }
            if now.duration_since(last_ping) >= PING_INTERVAL {
                if ws.send(Message::Ping(Vec::new())).await.is_err() {
                    warn!("liveness ping failed; upstream gone");
                    break;
                }
                last_ping = now;
            }

            match tokio::time::timeout(READ_TIMEOUT, ws.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => {
                    let now = Instant::now();
                    last_activity = now;

                    let frame = match serde_json::from_str::<UpstreamFrame>(&text) {
                        Ok(frame) => frame,
                        Err(e) => {
                            debug!(error = %e, "unparseable upstream frame");
                            continue;
                        }
                    };

                    match frame {
                        UpstreamFrame::Image { blob, url } => {
                            if blob.is_empty() || url.is_empty() {
                                continue;
                            }
                            if let Some(update) = session.observe_frame(&url, blob, now) {
                                info!(
                                    image = %short_id(&update.image_id),
                                    stage = %update.stage,
                                    size = update.blob_size,
                                    completed = session.completed(),
                                    total = request.n,
                                    "image progress"
                                );
                                if let Some(sender) = progress {
                                    sender.send(&update, session.completed(), session.total()).await;
                                }
                            }
                        }
                        UpstreamFrame::Error { err_code, err_msg } => {
                            warn!(code = %err_code, message = %err_msg, "upstream error frame");
                            let error = AppError::from_upstream(&err_code, &err_msg);
                            if matches!(error, AppError::RateLimited(_)) {
                                return Err(error);
                            }
                            upstream_error = Some(error);
                        }
                        UpstreamFrame::Other => {}
                    }

                    if session.completed() >= request.n {
                        info!(completed = session.completed(), "all finals collected");
                        break;
                    }
                    if session.blocked_since_medium(Instant::now(), BLOCKED_STEADY_WINDOW) {
                        warn!("blocked: medium frames without a final past the steady window");
                        return Err(AppError::Blocked(
                            "no final image produced after the moderation checkpoint".to_string(),
                        ));
                    }
                }
                Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                    warn!("upstream closed the connection");
                    break;
                }
                Ok(Some(Ok(_))) => {
                    // ping/pong/binary keepalive traffic
                }
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "websocket receive error");
                    break;
                }
                Err(_) => {
                    let now = Instant::now();
                    if session.blocked_since_medium(now, BLOCKED_READ_TIMEOUT_WINDOW) {
                        warn!("blocked: read timeout with mediums and no final");
                        return Err(AppError::Blocked(
                            "no final image produced after the moderation checkpoint".to_string(),
                        ));
                    }
                    if session.idle_complete(now, last_activity) {
                        info!(
                            completed = session.completed(),
                            "stream idle; finishing with collected finals"
                        );
                        break;
                    }
                }
            }
        }

        let images = self.media.persist(&session, request.n).await;
        if !images.is_empty() {
            return Ok(images);
        }
        if let Some(error) = upstream_error {
            return Err(error);
        }
        if session.check_blocked() {
            return Err(AppError::Blocked(
                "no final image produced after the moderation checkpoint".to_string(),
            ));
        }
        if deadline_hit {
            return Err(AppError::Timeout(self.generation_timeout.as_secs()));
        }
        Err(AppError::IncompleteGeneration)
    }

    /// Lazily verifies a credential's age gate before its first use.
    /// Best-effort: a failure is logged and generation proceeds anyway.
    async fn ensure_age_verified(&self, credential: &str) {
        match self.pool.age_verified(credential).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "could not read age-verification flag");
                return;
            }
        }

        info!(credential = %pool::preview(credential), "credential not age-verified; verifying");
        if self.verify_age(credential).await {
            if let Err(e) = self.pool.set_age_verified(credential, true).await {
                warn!(error = %e, "failed to persist age-verification flag");
            }
        } else {
            warn!(
                credential = %pool::preview(credential),
                "age verification failed; continuing with generation anyway"
            );
        }
    }

    async fn verify_age(&self, credential: &str) -> bool {
        let Some(cf_clearance) = self.cf_clearance.as_ref() else {
            warn!("cf_clearance not configured; skipping age verification");
            return false;
        };

        let cookie = format!(
            "sso={credential}; sso-rw={credential}; cf_clearance={}",
            cf_clearance.expose_secret()
        );
        let response = self
            .http
            .post(&self.age_verification_url)
            .header(reqwest::header::COOKIE, cookie)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ORIGIN, "https://grok.com")
            .header(reqwest::header::REFERER, "https://grok.com/")
            .json(&serde_json::json!({ "birthDate": BIRTH_DATE }))
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                info!("age verification succeeded");
                true
            }
            Ok(response) => {
                warn!(status = %response.status(), "age verification rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, "age verification request failed");
                false
            }
        }
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
