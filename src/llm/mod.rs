//! LLM Client module.
//!
//! This module defines the `ProviderProtocol` trait that abstracts over the
//! wire conventions of the supported API families, and the failover client
//! that drives requests across a model's candidate endpoints.
//!
//! Key concepts:
//! - **Closed provider set**: `ProviderKind` is an enum, and
//!   `ProviderKind::protocol()` picks the one implementation for a call up
//!   front. The failover loop never branches on the provider itself.
//! - **Protocol**: builds the endpoint URL, encodes the request body and
//!   headers, and decodes one SSE `data:` payload into a text fragment
//! - **Failover**: candidates are tried strictly one at a time; see
//!   `failover::LlmClient`

pub mod endpoints;
pub mod failover;
pub mod gemini;
pub mod openai_compatible;
pub mod sse;

pub use failover::LlmClient;

use crate::types::{CompletionRequest, Delivery, ModelConfig, ProviderKind};

/// A request ready to be sent: JSON body plus provider-specific headers.
#[derive(Debug, Clone)]
pub struct EncodedRequest {
    pub body: serde_json::Value,
    pub headers: Vec<(&'static str, String)>,
}

/// Result of decoding the payload of one `data:` line.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent {
    /// Next piece of text
    Fragment(String),
    /// End-of-stream sentinel
    Done,
    /// Nothing to emit (malformed JSON, empty delta, metadata chunk)
    Skip,
}

/// Wire conventions of one provider family.
pub trait ProviderProtocol: Send + Sync {
    /// Display name (for logging).
    fn name(&self) -> &'static str;

    /// Public base URL used when a model leaves `base_url` blank.
    fn default_base_url(&self) -> &'static str;

    /// Full request URL for an already-normalized base URL.
    fn endpoint_url(&self, base: &str, config: &ModelConfig, delivery: Delivery) -> String;

    /// Provider-specific body and headers.
    fn encode(&self, config: &ModelConfig, request: &CompletionRequest) -> EncodedRequest;

    /// Decode the payload that followed `data: ` on one SSE line.
    fn decode_event(&self, data: &str) -> DecodedEvent;
}

static OPENAI_COMPATIBLE: openai_compatible::OpenAiCompatible = openai_compatible::OpenAiCompatible;
static GEMINI: gemini::Gemini = gemini::Gemini;

impl ProviderKind {
    /// The protocol implementation for this provider kind.
    pub fn protocol(&self) -> &'static dyn ProviderProtocol {
        match self {
            ProviderKind::OpenaiCompatible => &OPENAI_COMPATIBLE,
            ProviderKind::Gemini => &GEMINI,
        }
    }
}
