//! Core data types used throughout notescan.
//!
//! This module defines the model profiles, conversation turns, image
//! payloads and request/stream types that flow between the LLM client,
//! the vision and edit paths, and the command-line front end.

use base64::Engine;
use serde::{Deserialize, Serialize};

// --- Provider Kind ---

/// The closed set of API conventions a model endpoint can speak.
///
/// The kind decides the URL shape, how the credential is attached, and the
/// JSON envelope of both the request and the streamed response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// `POST {base}/chat/completions`, bearer token auth.
    #[serde(alias = "openai")]
    OpenaiCompatible,
    /// `POST {base}/v1beta/models/{model}:streamGenerateContent`, key in query.
    Gemini,
}

impl ProviderKind {
    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::OpenaiCompatible => "OpenAI-compatible",
            ProviderKind::Gemini => "Gemini",
        }
    }
}

// --- Model Config ---

/// Latency value meaning "never measured".
pub const UNKNOWN_LATENCY: i64 = -1;

fn unknown_latency() -> i64 {
    UNKNOWN_LATENCY
}

/// A named endpoint profile.
///
/// The `id` is assigned once at creation and never changes; everything else
/// may be edited freely by the configuration store. The LLM client only
/// reads these values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    id: String,
    pub name: String,
    pub provider: ProviderKind,
    /// Secret attached to every outgoing request. May be empty, in which
    /// case URLs can still be built but every call fails fast.
    #[serde(default)]
    pub api_key: String,
    /// Environment variable consulted when `api_key` is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Provider-specific model identifier (e.g. "gemini-2.0-flash").
    pub model: String,
    /// Primary base URL; empty means the provider's public default.
    #[serde(default)]
    pub base_url: String,
    /// Mirrors tried in order after the primary fails.
    #[serde(default)]
    pub backup_urls: Vec<String>,
    /// Last measured round trip in milliseconds, `-1` when unknown.
    #[serde(default = "unknown_latency")]
    pub latency_ms: i64,
}

impl ModelConfig {
    /// Create a profile with a fresh id and default endpoint settings.
    pub fn new(name: impl Into<String>, provider: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            provider,
            api_key: String::new(),
            api_key_env: None,
            model: model.into(),
            base_url: String::new(),
            backup_urls: Vec::new(),
            latency_ms: UNKNOWN_LATENCY,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_backup_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.backup_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Human-readable latency for listings.
    pub fn latency_label(&self) -> String {
        if self.latency_ms < 0 {
            "unknown".to_string()
        } else {
            format!("{} ms", self.latency_ms)
        }
    }
}

// --- Conversation Turns ---

/// Who produced a turn. Gemini calls the assistant side `model`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    #[serde(alias = "model")]
    Assistant,
}

/// One exchange unit replayed as chat history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// Fixed context replayed ahead of the history as a synthetic
/// user/assistant exchange (e.g. "here is the original text" / "got it").
#[derive(Debug, Clone, PartialEq)]
pub struct ContextPair {
    pub user: String,
    pub assistant: String,
}

// --- Images ---

/// An image ready to be attached to a vision request.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAttachment {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImageAttachment {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// `data:{mime};base64,{payload}` form used by OpenAI-style image parts.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64())
    }
}

// --- Completion Request ---

/// Whether the response is consumed as an SSE stream or as one JSON body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Stream,
    Unary,
}

/// Provider-neutral request; each provider encodes it into its own wire
/// format.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Empty means no system instruction is sent.
    pub system_instruction: String,
    pub context: Option<ContextPair>,
    pub history: Vec<ConversationTurn>,
    /// The new user message, always sent last.
    pub user_text: String,
    /// Attached to the new user message (vision path only).
    pub images: Vec<ImageAttachment>,
    pub max_tokens: u32,
    pub delivery: Delivery,
}

impl CompletionRequest {
    /// A streaming request carrying only a user message.
    pub fn new(user_text: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            system_instruction: String::new(),
            context: None,
            history: Vec::new(),
            user_text: user_text.into(),
            images: Vec::new(),
            max_tokens,
            delivery: Delivery::Stream,
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    pub fn with_context(mut self, user: impl Into<String>, assistant: impl Into<String>) -> Self {
        self.context = Some(ContextPair {
            user: user.into(),
            assistant: assistant.into(),
        });
        self
    }

    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_images(mut self, images: Vec<ImageAttachment>) -> Self {
        self.images = images;
        self
    }

    /// Minimal non-streaming request used by connectivity probes.
    pub fn probe(max_tokens: u32) -> Self {
        Self {
            delivery: Delivery::Unary,
            ..Self::new("Hi", max_tokens)
        }
    }
}

// --- Stream Chunk ---

/// A single event from a streaming call.
///
/// Text deltas arrive in order and are never revised; concatenating them
/// reproduces the full reply. Exactly one of `Done` or `Error` ends the
/// stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// The next piece of generated text
    TextDelta(String),
    /// The stream completed successfully
    Done,
    /// The call failed; carries the human-readable reason
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_config_defaults() {
        let config = ModelConfig::new("Flash", ProviderKind::Gemini, "gemini-2.0-flash");
        assert_eq!(config.latency_ms, UNKNOWN_LATENCY);
        assert_eq!(config.latency_label(), "unknown");
        assert!(!config.has_credential());
        assert!(!config.id().is_empty());
    }

    #[test]
    fn test_ids_are_unique_and_survive_serde() {
        let a = ModelConfig::new("A", ProviderKind::OpenaiCompatible, "gpt-4o-mini");
        let b = ModelConfig::new("B", ProviderKind::OpenaiCompatible, "gpt-4o-mini");
        assert_ne!(a.id(), b.id());

        let text = toml::to_string(&a).unwrap();
        let loaded: ModelConfig = toml::from_str(&text).unwrap();
        assert_eq!(loaded.id(), a.id());
        assert_eq!(loaded, a);
    }

    #[test]
    fn test_provider_kind_names() {
        let kind: ProviderKind = serde_json::from_str("\"openai\"").unwrap();
        assert_eq!(kind, ProviderKind::OpenaiCompatible);
        let kind: ProviderKind = serde_json::from_str("\"gemini\"").unwrap();
        assert_eq!(kind, ProviderKind::Gemini);
        assert_eq!(
            serde_json::to_string(&ProviderKind::OpenaiCompatible).unwrap(),
            "\"openai_compatible\""
        );
    }

    #[test]
    fn test_data_url() {
        let image = ImageAttachment::new(vec![0xff, 0xd8, 0xff], "image/jpeg");
        assert_eq!(image.base64(), "/9j/");
        assert_eq!(image.data_url(), "data:image/jpeg;base64,/9j/");
    }

    #[test]
    fn test_connectivity_request_is_unary() {
        let request = CompletionRequest::probe(10);
        assert_eq!(request.delivery, Delivery::Unary);
        assert_eq!(request.max_tokens, 10);
        assert!(request.images.is_empty());
    }
}
