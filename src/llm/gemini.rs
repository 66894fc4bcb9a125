//! Gemini protocol implementation.
//!
//! Differences from the OpenAI-compatible format:
//! - the key travels in the `key=` query parameter, there is no auth header
//! - the system instruction is a top-level `systemInstruction` field
//! - roles are `user`/`model`, and a turn is a list of `parts`
//! - images are `inlineData` parts next to the text part
//! - the stream has no terminator; it ends when the connection closes

use serde::{Deserialize, Serialize};

use super::{DecodedEvent, EncodedRequest, ProviderProtocol};
use crate::types::{CompletionRequest, Delivery, ModelConfig, TurnRole};

pub struct Gemini;

// --- API Request Types ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<ApiContent>,
    contents: Vec<ApiContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct ApiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<ApiPart>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ApiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

// --- Streaming Response Types ---

#[derive(Deserialize, Debug)]
struct StreamResponseChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: Option<String>,
}

fn turn(role: &'static str, text: &str) -> ApiContent {
    ApiContent {
        role: Some(role),
        parts: vec![ApiPart::Text {
            text: text.to_string(),
        }],
    }
}

fn role_name(role: TurnRole) -> &'static str {
    match role {
        TurnRole::User => "user",
        TurnRole::Assistant => "model",
    }
}

impl Gemini {
    fn build_contents(&self, request: &CompletionRequest) -> Vec<ApiContent> {
        let mut contents = Vec::with_capacity(request.history.len() + 3);

        if let Some(context) = &request.context {
            contents.push(turn("user", &context.user));
            contents.push(turn("model", &context.assistant));
        }
        for t in &request.history {
            contents.push(turn(role_name(t.role), &t.content));
        }

        let mut last = turn("user", &request.user_text);
        last.parts.extend(request.images.iter().map(|image| ApiPart::InlineData {
            inline_data: InlineData {
                mime_type: image.mime_type.clone(),
                data: image.base64(),
            },
        }));
        contents.push(last);

        contents
    }
}

impl ProviderProtocol for Gemini {
    fn name(&self) -> &'static str {
        "Gemini"
    }

    fn default_base_url(&self) -> &'static str {
        "https://generativelanguage.googleapis.com"
    }

    fn endpoint_url(&self, base: &str, config: &ModelConfig, delivery: Delivery) -> String {
        match delivery {
            Delivery::Stream => format!(
                "{}/v1beta/models/{}:streamGenerateContent?alt=sse&key={}",
                base, config.model, config.api_key
            ),
            Delivery::Unary => format!(
                "{}/v1beta/models/{}:generateContent?key={}",
                base, config.model, config.api_key
            ),
        }
    }

    fn encode(&self, _config: &ModelConfig, request: &CompletionRequest) -> EncodedRequest {
        let system_instruction = if request.system_instruction.is_empty() {
            None
        } else {
            Some(ApiContent {
                role: None,
                parts: vec![ApiPart::Text {
                    text: request.system_instruction.clone(),
                }],
            })
        };

        let api_request = ApiRequest {
            system_instruction,
            contents: self.build_contents(request),
            generation_config: GenerationConfig {
                max_output_tokens: request.max_tokens,
            },
        };

        EncodedRequest {
            body: serde_json::to_value(&api_request).unwrap_or_default(),
            headers: vec![("Content-Type", "application/json".to_string())],
        }
    }

    fn decode_event(&self, data: &str) -> DecodedEvent {
        let Ok(chunk) = serde_json::from_str::<StreamResponseChunk>(data) else {
            return DecodedEvent::Skip;
        };
        chunk
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .and_then(|content| content.parts.into_iter().next())
            .and_then(|part| part.text)
            .filter(|text| !text.is_empty())
            .map(DecodedEvent::Fragment)
            .unwrap_or(DecodedEvent::Skip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConversationTurn, ImageAttachment, ProviderKind};
    use serde_json::json;

    fn config() -> ModelConfig {
        ModelConfig::new("Flash", ProviderKind::Gemini, "gemini-2.0-flash").with_api_key("k")
    }

    #[test]
    fn test_no_auth_header() {
        let encoded = Gemini.encode(&config(), &CompletionRequest::new("hi", 100));
        assert!(encoded.headers.iter().all(|(name, _)| *name != "Authorization"));
    }

    #[test]
    fn test_system_instruction_and_roles() {
        let request = CompletionRequest::new("shorter please", 8192)
            .with_system_instruction("You edit Markdown.")
            .with_context("Here is the original text:\n\nabc", "Understood.")
            .with_history(vec![
                ConversationTurn::user("fix it"),
                ConversationTurn::assistant("abc."),
            ]);
        let body = Gemini.encode(&config(), &request).body;

        assert_eq!(
            body["systemInstruction"],
            json!({"parts": [{"text": "You edit Markdown."}]})
        );
        let roles: Vec<&str> = body["contents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["user", "model", "user", "model", "user"]);
        assert_eq!(body["contents"][4]["parts"][0]["text"], "shorter please");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);
    }

    #[test]
    fn test_images_inline_with_text() {
        let request = CompletionRequest::new("Transcribe", 4096).with_images(vec![
            ImageAttachment::new(vec![1, 2, 3], "image/png"),
            ImageAttachment::new(vec![0xff, 0xd8, 0xff], "image/jpeg"),
        ]);
        let body = Gemini.encode(&config(), &request).body;
        assert!(body.get("systemInstruction").is_none());
        assert_eq!(
            body["contents"],
            json!([{
                "role": "user",
                "parts": [
                    {"text": "Transcribe"},
                    {"inlineData": {"mimeType": "image/png", "data": "AQID"}},
                    {"inlineData": {"mimeType": "image/jpeg", "data": "/9j/"}},
                ]
            }])
        );
    }

    #[test]
    fn test_decode_event() {
        assert_eq!(
            Gemini.decode_event(r#"{"candidates":[{"content":{"parts":[{"text":"x"},{"text":"y"}],"role":"model"}}]}"#),
            DecodedEvent::Fragment("x".into())
        );
        assert_eq!(Gemini.decode_event(r#"{"candidates":[]}"#), DecodedEvent::Skip);
        assert_eq!(
            Gemini.decode_event(r#"{"candidates":[{"finishReason":"STOP"}]}"#),
            DecodedEvent::Skip
        );
        assert_eq!(Gemini.decode_event("[DONE]"), DecodedEvent::Skip);
    }
}
