// src/imagine/media.rs

use crate::error::Result;
use crate::imagine::session::GenerationSession;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Outcome of a successful attempt: public URLs plus the raw transport
/// payloads, in persistence order.
#[derive(Debug, Clone, Default)]
pub struct GeneratedImages {
    pub urls: Vec<String>,
    pub b64: Vec<String>,
}

impl GeneratedImages {
    pub fn count(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// Writes generated images to the configured directory and assembles their
/// public references.
#[derive(Debug, Clone)]
pub struct MediaStore {
    images_dir: PathBuf,
    base_url: String,
}

impl MediaStore {
    pub fn new(images_dir: PathBuf, base_url: String) -> Self {
        Self {
            images_dir,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.images_dir).await?;
        Ok(())
    }

    /// Persists the session's best candidates, up to `limit`. Finals are
    /// written as `.jpg`, intermediates as `.png`. Individual failures are
    /// logged and skipped; the attempt still succeeds with whatever saved.
    pub async fn persist(&self, session: &GenerationSession, limit: usize) -> GeneratedImages {
        let mut result = GeneratedImages::default();
        if session.is_empty() {
            return result;
        }

        if let Err(e) = self.ensure_dir().await {
            error!(dir = %self.images_dir.display(), error = %e, "cannot create images directory");
            return result;
        }

        for image in session.best_candidates(limit) {
            let bytes = match BASE64.decode(&image.blob) {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!(image = %image.image_id, error = %e, "failed to decode image payload");
                    continue;
                }
            };

            let ext = if image.is_final { "jpg" } else { "png" };
            let filename = format!("{}.{}", image.image_id, ext);
            let path = self.images_dir.join(&filename);
            if let Err(e) = tokio::fs::write(&path, &bytes).await {
                error!(file = %filename, error = %e, "failed to write image");
                continue;
            }

            info!(
                file = %filename,
                size_kb = bytes.len() / 1024,
                stage = %image.stage,
                "image saved"
            );
            result.urls.push(format!("{}/images/{}", self.base_url, filename));
            result.b64.push(image.blob.clone());
        }

        result
    }
}
