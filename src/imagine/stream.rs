// src/imagine/stream.rs
//
// Bridge between a generation attempt and an SSE consumer: a producer task
// pushes progress into a bounded channel, the consumer reads a finite event
// sequence ending in exactly one result event. Dropping the consumer aborts
// the producer, so no generation keeps running for an abandoned stream.

use crate::error::AppError;
use crate::imagine::client::{GenerationRequest, ImagineClient};
use crate::imagine::media::GeneratedImages;
use crate::imagine::protocol::ImageStage;
use crate::imagine::session::ImageProgress;
use futures_util::Stream;
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Depth of the bridge queue. Progress producers block (backpressure) when
/// the consumer falls this far behind.
pub const EVENT_QUEUE_DEPTH: usize = 32;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationEvent {
    Progress {
        image_id: String,
        stage: ImageStage,
        blob_size: usize,
        is_final: bool,
        completed: usize,
        total: usize,
    },
    Result {
        success: bool,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        urls: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_code: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl GenerationEvent {
    pub fn success(images: &GeneratedImages) -> Self {
        Self::Result {
            success: true,
            urls: images.urls.clone(),
            error_code: None,
            error: None,
        }
    }

    pub fn failure(error: &AppError) -> Self {
        Self::Result {
            success: false,
            urls: Vec::new(),
            error_code: Some(error.error_code().to_string()),
            error: Some(error.to_string()),
        }
    }
}

/// Best-effort progress forwarding into the bridge queue. A dropped consumer
/// is logged, never fatal to the generation.
#[derive(Clone)]
pub struct ProgressSender {
    tx: mpsc::Sender<GenerationEvent>,
}

impl From<mpsc::Sender<GenerationEvent>> for ProgressSender {
    fn from(tx: mpsc::Sender<GenerationEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSender {
    pub async fn send(&self, image: &ImageProgress, completed: usize, total: usize) {
        let event = GenerationEvent::Progress {
            image_id: image.image_id.clone(),
            stage: image.stage,
            blob_size: image.blob_size,
            is_final: image.is_final,
            completed,
            total,
        };
        if self.tx.send(event).await.is_err() {
            warn!("progress consumer dropped; continuing generation without updates");
        }
    }
}

/// Finite, non-restartable event sequence for one generation: zero or more
/// progress events followed by exactly one result event.
pub struct GenerationStream {
    rx: mpsc::Receiver<GenerationEvent>,
    task: JoinHandle<()>,
    finished: bool,
}

impl GenerationStream {
    pub fn new(rx: mpsc::Receiver<GenerationEvent>, task: JoinHandle<()>) -> Self {
        Self {
            rx,
            task,
            finished: false,
        }
    }
}

impl Stream for GenerationStream {
    type Item = GenerationEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if matches!(event, GenerationEvent::Result { .. }) {
                    this.finished = true;
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for GenerationStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Runs one generation in a background task and returns its event stream.
pub fn spawn_generation(client: Arc<ImagineClient>, request: GenerationRequest) -> GenerationStream {
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let progress = ProgressSender { tx: tx.clone() };
    let task = tokio::spawn(async move {
        let outcome = client.generate_with_progress(request, Some(progress)).await;
        let event = match &outcome {
            Ok(images) => GenerationEvent::success(images),
            Err(error) => GenerationEvent::failure(error),
        };
        if tx.send(event).await.is_err() {
            debug!("generation stream abandoned before the result event");
        }
    });
    GenerationStream::new(rx, task)
}
