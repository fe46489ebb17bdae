// src/imagine/session.rs

use crate::imagine::protocol::{self, ImageStage};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Blocked heuristic window on the steady receive path.
pub const BLOCKED_STEADY_WINDOW: Duration = Duration::from_secs(15);
/// Blocked heuristic window after a per-read timeout. Kept distinct from the
/// steady window on purpose.
pub const BLOCKED_READ_TIMEOUT_WINDOW: Duration = Duration::from_secs(10);
/// With at least one final in hand, a stream quiet for this long is treated
/// as complete.
pub const IDLE_COMPLETION_WINDOW: Duration = Duration::from_secs(10);

/// Recorded state of one image across its refinement stages.
#[derive(Debug, Clone)]
pub struct ImageProgress {
    pub image_id: String,
    pub stage: ImageStage,
    pub blob: String,
    pub blob_size: usize,
    pub url: String,
    pub is_final: bool,
}

/// Per-attempt tracking of image frames.
///
/// Stage transitions are monotonic: a frame at or below an image's recorded
/// stage is ignored, and a finalized image is never touched again.
pub struct GenerationSession {
    total: usize,
    images: HashMap<String, ImageProgress>,
    completed: usize,
    first_medium_at: Option<Instant>,
}

impl GenerationSession {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            images: HashMap::new(),
            completed: 0,
            first_medium_at: None,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Count of images that reached the final stage.
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Records one media frame. Returns the updated progress when the frame
    /// advanced the image to a higher stage (or introduced it); `None` for
    /// frames that are ignored. Callers emit at most one progress event per
    /// returned update, which yields exactly one event per stage transition.
    pub fn observe_frame(&mut self, url: &str, blob: String, now: Instant) -> Option<ImageProgress> {
        let image_id = protocol::extract_image_id(url)?.to_string();
        let blob_size = blob.len();
        let stage = protocol::classify_stage(url, blob_size);

        if stage == ImageStage::Medium && self.first_medium_at.is_none() {
            self.first_medium_at = Some(now);
        }

        if let Some(existing) = self.images.get(&image_id) {
            if existing.stage >= stage {
                return None;
            }
        }

        let is_final = stage == ImageStage::Final;
        if is_final {
            self.completed += 1;
        }
        let progress = ImageProgress {
            image_id: image_id.clone(),
            stage,
            blob,
            blob_size,
            url: url.to_string(),
            is_final,
        };
        self.images.insert(image_id, progress.clone());
        Some(progress)
    }

    /// The post-hoc blocked signature: a medium pass happened but nothing
    /// ever reached final.
    pub fn check_blocked(&self) -> bool {
        self.completed == 0
            && self
                .images
                .values()
                .any(|image| image.stage == ImageStage::Medium)
    }

    /// Timing-based blocked heuristic: a medium frame arrived, no final
    /// followed, and more than `window` has passed since that first medium.
    pub fn blocked_since_medium(&self, now: Instant, window: Duration) -> bool {
        match self.first_medium_at {
            Some(first_medium) if self.completed == 0 => {
                now.saturating_duration_since(first_medium) > window
            }
            _ => false,
        }
    }

    /// Idle-completion heuristic: at least one final exists and the stream
    /// has gone quiet, so finish with what we have instead of waiting out
    /// the full attempt budget.
    pub fn idle_complete(&self, now: Instant, last_activity: Instant) -> bool {
        self.completed > 0
            && now.saturating_duration_since(last_activity) > IDLE_COMPLETION_WINDOW
    }

    /// Images worth persisting: finals outrank non-finals, larger payloads
    /// outrank smaller, at most `limit` entries. Identifiers are unique by
    /// construction of the map.
    pub fn best_candidates(&self, limit: usize) -> Vec<&ImageProgress> {
        let mut images: Vec<&ImageProgress> = self.images.values().collect();
        images.sort_by(|a, b| {
            (b.is_final, b.blob_size, &a.image_id).cmp(&(a.is_final, a.blob_size, &b.image_id))
        });
        images.truncate(limit);
        images
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
