// src/imagine/protocol.rs
//
// Wire shapes for the upstream imagine WebSocket: one outbound
// `conversation.item.create` message per generation, inbound image/error
// frames, and the size/extension rules that classify a frame's stage.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payloads above this size carried in a `.jpg` reference are the hi-res
/// final render.
pub const FINAL_PAYLOAD_THRESHOLD: usize = 100_000;
/// Payloads above this size are the mid-quality pass that follows the
/// moderation checkpoint.
pub const MEDIUM_PAYLOAD_THRESHOLD: usize = 30_000;

static IMAGE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/images/([a-f0-9-]+)\.(png|jpg)").expect("image id pattern"));

/// Quality tier of a progressively refined image. The order is load-bearing:
/// recorded stages never regress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStage {
    Preview,
    Medium,
    Final,
}

impl ImageStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preview => "preview",
            Self::Medium => "medium",
            Self::Final => "final",
        }
    }
}

impl std::fmt::Display for ImageStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pulls the image identifier out of an embedded reference URL.
pub fn extract_image_id(url: &str) -> Option<&str> {
    IMAGE_ID_RE
        .captures(url)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
}

/// The final render is the hi-res `.jpg`, well above 100KB.
pub fn is_final_image(url: &str, payload_size: usize) -> bool {
    url.ends_with(".jpg") && payload_size > FINAL_PAYLOAD_THRESHOLD
}

pub fn classify_stage(url: &str, payload_size: usize) -> ImageStage {
    if is_final_image(url, payload_size) {
        ImageStage::Final
    } else if payload_size > MEDIUM_PAYLOAD_THRESHOLD {
        ImageStage::Medium
    } else {
        ImageStage::Preview
    }
}

/// Outbound generation request message.
#[derive(Debug, Serialize)]
pub struct GenerationMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    timestamp: i64,
    item: MessageItem<'a>,
}

#[derive(Debug, Serialize)]
struct MessageItem<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
struct ContentPart<'a> {
    #[serde(rename = "requestId")]
    request_id: String,
    text: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    properties: GenerationProperties<'a>,
}

#[derive(Debug, Serialize)]
struct GenerationProperties<'a> {
    section_count: u32,
    is_kids_mode: bool,
    enable_nsfw: bool,
    skip_upsampler: bool,
    is_initial: bool,
    aspect_ratio: &'a str,
}

impl<'a> GenerationMessage<'a> {
    pub fn new(request_id: &Uuid, prompt: &'a str, aspect_ratio: &'a str, enable_nsfw: bool) -> Self {
        Self {
            kind: "conversation.item.create",
            timestamp: chrono::Utc::now().timestamp_millis(),
            item: MessageItem {
                kind: "message",
                content: vec![ContentPart {
                    request_id: request_id.to_string(),
                    text: prompt,
                    kind: "input_text",
                    properties: GenerationProperties {
                        section_count: 0,
                        is_kids_mode: false,
                        enable_nsfw,
                        skip_upsampler: false,
                        is_initial: false,
                        aspect_ratio,
                    },
                }],
            },
        }
    }
}

/// Inbound frames. Anything but an image or error frame is ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpstreamFrame {
    Image {
        #[serde(default)]
        blob: String,
        #[serde(default)]
        url: String,
    },
    Error {
        #[serde(default)]
        err_code: String,
        #[serde(default)]
        err_msg: String,
    },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_id_extraction() {
        assert_eq!(
            extract_image_id("https://assets.grok.com/images/0a1b2c3d-4e5f-6071-8293-a4b5c6d7e8f9.jpg"),
            Some("0a1b2c3d-4e5f-6071-8293-a4b5c6d7e8f9")
        );
        assert_eq!(
            extract_image_id("https://assets.grok.com/images/deadbeef.png"),
            Some("deadbeef")
        );
        assert_eq!(extract_image_id("https://grok.com/other/path.jpg"), None);
    }

    #[test]
    fn stage_thresholds() {
        // jpg above the final threshold is the hi-res render
        assert_eq!(classify_stage("/images/a1.jpg", 150_000), ImageStage::Final);
        // size alone is not enough without the hi-res extension
        assert_eq!(classify_stage("/images/a1.png", 150_000), ImageStage::Medium);
        assert_eq!(classify_stage("/images/a1.png", 40_000), ImageStage::Medium);
        assert_eq!(classify_stage("/images/a1.jpg", 100_000), ImageStage::Medium);
        assert_eq!(classify_stage("/images/a1.png", 30_000), ImageStage::Preview);
        assert_eq!(classify_stage("/images/a1.png", 5_000), ImageStage::Preview);
    }

    #[test]
    fn stage_order() {
        assert!(ImageStage::Preview < ImageStage::Medium);
        assert!(ImageStage::Medium < ImageStage::Final);
    }

    #[test]
    fn frames_deserialize() {
        let image: UpstreamFrame =
            serde_json::from_str(r#"{"type":"image","blob":"aGk=","url":"/images/ab.png"}"#)
                .unwrap();
        assert!(matches!(image, UpstreamFrame::Image { .. }));

        let error: UpstreamFrame =
            serde_json::from_str(r#"{"type":"error","err_code":"rate_limit_exceeded","err_msg":"slow down"}"#)
                .unwrap();
        assert!(matches!(error, UpstreamFrame::Error { .. }));

        let other: UpstreamFrame = serde_json::from_str(r#"{"type":"keepalive"}"#).unwrap();
        assert!(matches!(other, UpstreamFrame::Other));
    }

    #[test]
    fn generation_message_shape() {
        let id = Uuid::new_v4();
        let message = GenerationMessage::new(&id, "a red fox", "2:3", true);
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "conversation.item.create");
        assert_eq!(value["item"]["type"], "message");
        let content = &value["item"]["content"][0];
        assert_eq!(content["requestId"], id.to_string());
        assert_eq!(content["type"], "input_text");
        assert_eq!(content["properties"]["aspect_ratio"], "2:3");
        assert_eq!(content["properties"]["enable_nsfw"], true);
        assert_eq!(content["properties"]["is_kids_mode"], false);
        assert_eq!(content["properties"]["skip_upsampler"], false);
    }
}
