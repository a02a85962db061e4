//! API request and response types.

use crate::rate_limit::RateLimitSnapshot;
use chatline_core::{ImageDetail, Message, SamplingSettings};
use serde::{Deserialize, Serialize};

/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// Default text-to-speech model.
pub const DEFAULT_SPEECH_MODEL: &str = "tts-1";

/// Default vision model.
pub const DEFAULT_VISION_MODEL: &str = "gpt-4-vision-preview";

// ============================================================================
// Request Types
// ============================================================================

/// Chat completion request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    /// Model to use.
    pub model: String,
    /// Messages in the conversation.
    pub messages: Vec<Message>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    /// Nucleus sampling parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Frequency penalty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    /// Presence penalty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    /// Whether to stream the response.
    pub stream: bool,
}

impl ChatCompletionRequest {
    /// Build a request from a model, messages and resolved sampling settings.
    pub fn new(model: impl Into<String>, messages: Vec<Message>, sampling: &SamplingSettings) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: sampling.temperature,
            max_tokens: sampling.max_tokens,
            top_p: sampling.top_p,
            frequency_penalty: sampling.frequency_penalty,
            presence_penalty: sampling.presence_penalty,
            stream: false,
        }
    }

    /// Set streaming.
    #[must_use]
    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// Per-call overrides for a chat completion.
///
/// Unset fields fall back to the client configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionOptions {
    /// Model override.
    pub model: Option<String>,
    /// Sampling overrides.
    pub sampling: SamplingSettings,
}

impl CompletionOptions {
    /// Create empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Override the temperature.
    #[must_use]
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.sampling.temperature = Some(temperature);
        self
    }

    /// Override max tokens.
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u64) -> Self {
        self.sampling.max_tokens = Some(max_tokens);
        self
    }

    /// Override top-p.
    #[must_use]
    pub fn top_p(mut self, top_p: f64) -> Self {
        self.sampling.top_p = Some(top_p);
        self
    }
}

/// Embedding input: one text or a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    /// Single text.
    Single(String),
    /// Batch of texts.
    Batch(Vec<String>),
}

impl From<&str> for EmbeddingInput {
    fn from(s: &str) -> Self {
        EmbeddingInput::Single(s.to_string())
    }
}

impl From<String> for EmbeddingInput {
    fn from(s: String) -> Self {
        EmbeddingInput::Single(s)
    }
}

impl From<Vec<String>> for EmbeddingInput {
    fn from(v: Vec<String>) -> Self {
        EmbeddingInput::Batch(v)
    }
}

/// Embedding request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingRequest {
    /// Model to use.
    pub model: String,
    /// Text to embed.
    pub input: EmbeddingInput,
}

/// Moderation request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModerationRequest {
    /// Text to classify.
    pub input: String,
}

/// Options for text-to-speech.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeechOptions {
    /// Model to use.
    pub model: String,
    /// Voice name.
    pub voice: String,
    /// Audio format.
    pub response_format: String,
    /// Playback speed.
    pub speed: f64,
}

impl Default for SpeechOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_SPEECH_MODEL.to_string(),
            voice: "alloy".to_string(),
            response_format: "mp3".to_string(),
            speed: 1.0,
        }
    }
}

impl SpeechOptions {
    /// Set the voice.
    #[must_use]
    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    /// Set the audio format.
    #[must_use]
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.response_format = format.into();
        self
    }

    /// Set the speed.
    #[must_use]
    pub fn speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SpeechRequest<'a> {
    pub model: &'a str,
    pub input: &'a str,
    pub voice: &'a str,
    pub response_format: &'a str,
    pub speed: f64,
}

/// Options for image analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct VisionOptions {
    /// Model to use.
    pub model: String,
    /// Maximum tokens to generate.
    pub max_tokens: u64,
    /// Requested detail level.
    pub detail: ImageDetail,
}

impl Default for VisionOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_VISION_MODEL.to_string(),
            max_tokens: 300,
            detail: ImageDetail::Auto,
        }
    }
}

/// Image given to [`crate::ChatClient::analyze_image`].
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    /// Remote or `data:` URL.
    Url(String),
    /// Raw image bytes with their MIME type; sent as a base64 data URL.
    Bytes {
        /// Image bytes.
        data: Vec<u8>,
        /// MIME type, e.g. `image/png`.
        mime: mime::Mime,
    },
}

impl ImageSource {
    /// URL to send in the `image_url` part.
    #[must_use]
    pub fn to_url(&self) -> String {
        use base64::Engine;

        match self {
            ImageSource::Url(url) => url.clone(),
            ImageSource::Bytes { data, mime } => format!(
                "data:{};base64,{}",
                mime.essence_str(),
                base64::engine::general_purpose::STANDARD.encode(data)
            ),
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Chat completion response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatCompletionResponse {
    /// Response ID.
    #[serde(default)]
    pub id: String,
    /// Object type.
    #[serde(default)]
    pub object: String,
    /// Creation timestamp.
    #[serde(default)]
    pub created: u64,
    /// Model used.
    #[serde(default)]
    pub model: String,
    /// Choices.
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    /// Token usage.
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatCompletionResponse {
    /// Text of the first choice.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.choices.first()?.message.content.as_deref()
    }

    /// Finish reason of the first choice.
    #[must_use]
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first()?.finish_reason.as_deref()
    }
}

/// A completion choice.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatChoice {
    /// Choice index.
    #[serde(default)]
    pub index: u32,
    /// Generated message.
    pub message: ResponseMessage,
    /// Finish reason.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Message in a completion response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResponseMessage {
    /// Author role.
    #[serde(default)]
    pub role: Option<String>,
    /// Text content.
    #[serde(default)]
    pub content: Option<String>,
}

/// Token usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens.
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Completion tokens.
    #[serde(default)]
    pub completion_tokens: u64,
    /// Total tokens.
    #[serde(default)]
    pub total_tokens: u64,
}

/// A model entry from `GET /models`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelInfo {
    /// Model name.
    pub id: String,
    /// Object type.
    #[serde(default)]
    pub object: String,
    /// Creation timestamp.
    #[serde(default)]
    pub created: u64,
    /// Owner.
    #[serde(default)]
    pub owned_by: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModelList {
    #[serde(default)]
    pub data: Vec<ModelInfo>,
}

/// Embedding response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmbeddingResponse {
    /// Embeddings in input order.
    pub data: Vec<Embedding>,
    /// Model used.
    #[serde(default)]
    pub model: String,
    /// Token usage.
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// One embedding vector.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Embedding {
    /// Position in the input batch.
    #[serde(default)]
    pub index: usize,
    /// Vector.
    pub embedding: Vec<f32>,
}

/// Moderation response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModerationResponse {
    /// Response ID.
    #[serde(default)]
    pub id: String,
    /// Model used.
    #[serde(default)]
    pub model: String,
    /// One result per input.
    pub results: Vec<ModerationResult>,
}

impl ModerationResponse {
    /// Whether any input was flagged.
    #[must_use]
    pub fn flagged(&self) -> bool {
        self.results.iter().any(|r| r.flagged)
    }
}

/// Moderation verdict for one input.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModerationResult {
    /// Whether the input was flagged.
    pub flagged: bool,
    /// Category verdicts.
    #[serde(default)]
    pub categories: serde_json::Map<String, serde_json::Value>,
    /// Category scores.
    #[serde(default)]
    pub category_scores: serde_json::Map<String, serde_json::Value>,
}

// ============================================================================
// Health
// ============================================================================

/// Outcome of a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// The API answered with 2xx.
    Healthy,
    /// The API answered with a non-2xx status.
    Unhealthy,
    /// No answer (network failure or deadline).
    Error,
}

/// Result of [`crate::ChatClient::health_check`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Overall status.
    pub status: HealthStatus,
    /// HTTP status, when the API answered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Error description, when it did not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Rate-limit snapshot at the time of the check.
    pub rate_limit: RateLimitSnapshot,
}

impl HealthReport {
    /// Whether the API is healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}
