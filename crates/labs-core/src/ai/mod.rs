pub mod gemini;
pub mod wire;

pub use gemini::GeminiClient;

use anyhow::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::warn;

use crate::mode::ImageSize;
use crate::state::ConversationTurn;
use wire::{GroundingMetadata, Part};

/// The generative backend the dispatcher talks to.
///
/// `GeminiClient` is the production implementation; tests substitute a
/// scripted double.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply>;

    async fn generate_image(&self, request: ImageRequest) -> Result<ImageReply>;

    /// Submits a video job and returns its operation handle.
    async fn start_video(&self, request: VideoRequest) -> Result<VideoOperation>;

    /// Re-fetches the status of a previously submitted video job.
    async fn video_status(&self, operation: &VideoOperation) -> Result<VideoOperation>;

    /// Downloads the finished video behind `uri`.
    async fn fetch_video(&self, uri: &str) -> Result<Blob>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub turns: Vec<ConversationTurn>,
    pub system_instruction: Option<String>,
    pub grounded: bool,
    pub thinking_budget: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub aspect_ratio: String,
    pub image_size: ImageSize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoRequest {
    pub model: String,
    pub prompt: String,
    pub count: u32,
    pub resolution: String,
    pub aspect_ratio: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatReply {
    pub text: Option<String>,
    pub grounding: Option<GroundingMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageReply {
    pub parts: Vec<Part>,
}

impl ImageReply {
    /// Decodes the first inline payload. A missing or undecodable payload
    /// yields `None`.
    pub fn first_image(&self) -> Option<Blob> {
        let inline = self.parts.iter().find_map(|p| p.inline_data.as_ref())?;
        match STANDARD.decode(inline.data.as_bytes()) {
            Ok(data) if !data.is_empty() => Some(Blob {
                mime_type: if inline.mime_type.is_empty() {
                    "image/png".to_string()
                } else {
                    inline.mime_type.clone()
                },
                data,
            }),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "discarding undecodable inline image");
                None
            }
        }
    }
}

/// Opaque handle to a long-running video job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoOperation {
    pub name: String,
    pub done: bool,
    pub video_uri: Option<String>,
    pub error: Option<String>,
}

/// What a backend call produced, one variant per mode family.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Chat(ChatReply),
    Image(ImageReply),
    Video(VideoOperation),
}

/// Binary generation output held in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct Blob {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Blob {
    /// `data:` URL a renderer can load directly.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.data))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blob")
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}
