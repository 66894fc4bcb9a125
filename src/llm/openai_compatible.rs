//! OpenAI-compatible protocol implementation.
//!
//! - **Endpoint**: `POST {base}/chat/completions`
//! - **Auth**: `Authorization: Bearer {key}` header
//! - **Stream**: `data: {"choices":[{"delta":{"content":"..."}}]}` lines,
//!   terminated by `data: [DONE]`

use serde::{Deserialize, Serialize};

use super::{DecodedEvent, EncodedRequest, ProviderProtocol};
use crate::types::{CompletionRequest, Delivery, ModelConfig, TurnRole};

pub struct OpenAiCompatible;

// --- API Request Types (OpenAI format) ---

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: ApiContent,
}

/// Plain text, or typed parts when images are attached.
#[derive(Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Parts(Vec<ApiContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentPart {
    Text { text: String },
    ImageUrl { image_url: ApiImageUrl },
}

#[derive(Serialize)]
struct ApiImageUrl {
    url: String,
}

// --- Streaming Response Types ---

#[derive(Deserialize, Debug)]
struct StreamResponseChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    content: Option<String>,
}

fn role_name(role: TurnRole) -> &'static str {
    match role {
        TurnRole::User => "user",
        TurnRole::Assistant => "assistant",
    }
}

fn text_message(role: &'static str, text: &str) -> ApiMessage {
    ApiMessage {
        role,
        content: ApiContent::Text(text.to_string()),
    }
}

impl OpenAiCompatible {
    fn build_messages(&self, request: &CompletionRequest) -> Vec<ApiMessage> {
        let mut messages = Vec::with_capacity(request.history.len() + 4);

        if !request.system_instruction.is_empty() {
            messages.push(text_message("system", &request.system_instruction));
        }
        if let Some(context) = &request.context {
            messages.push(text_message("user", &context.user));
            messages.push(text_message("assistant", &context.assistant));
        }
        for turn in &request.history {
            messages.push(text_message(role_name(turn.role), &turn.content));
        }

        let content = if request.images.is_empty() {
            ApiContent::Text(request.user_text.clone())
        } else {
            let mut parts = vec![ApiContentPart::Text {
                text: request.user_text.clone(),
            }];
            parts.extend(request.images.iter().map(|image| ApiContentPart::ImageUrl {
                image_url: ApiImageUrl {
                    url: image.data_url(),
                },
            }));
            ApiContent::Parts(parts)
        };
        messages.push(ApiMessage {
            role: "user",
            content,
        });

        messages
    }
}

impl ProviderProtocol for OpenAiCompatible {
    fn name(&self) -> &'static str {
        "OpenAI-Compatible"
    }

    fn default_base_url(&self) -> &'static str {
        "https://api.openai.com/v1"
    }

    fn endpoint_url(&self, base: &str, _config: &ModelConfig, _delivery: Delivery) -> String {
        format!("{}/chat/completions", base)
    }

    fn encode(&self, config: &ModelConfig, request: &CompletionRequest) -> EncodedRequest {
        let api_request = ApiRequest {
            model: &config.model,
            messages: self.build_messages(request),
            max_tokens: request.max_tokens,
            stream: request.delivery == Delivery::Stream,
        };

        EncodedRequest {
            body: serde_json::to_value(&api_request).unwrap_or_default(),
            headers: vec![
                ("Authorization", format!("Bearer {}", config.api_key)),
                ("Content-Type", "application/json".to_string()),
            ],
        }
    }

    fn decode_event(&self, data: &str) -> DecodedEvent {
        if data.trim() == "[DONE]" {
            return DecodedEvent::Done;
        }
        let Ok(chunk) = serde_json::from_str::<StreamResponseChunk>(data) else {
            return DecodedEvent::Skip;
        };
        chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|text| !text.is_empty())
            .map(DecodedEvent::Fragment)
            .unwrap_or(DecodedEvent::Skip)
    }
}
