// src/imagine/mod.rs

pub mod client;
pub mod media;
pub mod protocol;
pub mod retry;
pub mod session;
pub mod stream;

pub use client::{GenerationRequest, ImagineClient};
pub use media::{GeneratedImages, MediaStore};
pub use protocol::ImageStage;
pub use retry::RetryPolicy;
pub use session::{GenerationSession, ImageProgress};
pub use stream::{GenerationEvent, GenerationStream, ProgressSender, spawn_generation};
