//! Chat-style editing of a Markdown excerpt.
//!
//! An `EditSession` holds the text being edited and the append-only history
//! of instructions and replies. Each request replays:
//!
//! ```text
//! system instruction
//! user:      "Here is the original text: ..."   (synthetic context pair)
//! assistant: "Got it. ..."
//! ...history turns...
//! user:      new instruction
//! ```
//!
//! The reply is accumulated in a buffer owned by the streaming call and only
//! appended to the history once the stream has completed.

use std::ops::Range;

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;
use crate::llm::LlmClient;
use crate::types::{CompletionRequest, ConversationTurn, ModelConfig, StreamChunk, TurnRole};

const CONTEXT_ACK: &str =
    "Got it. Tell me how to change the text and I will reply with the revised Markdown.";

/// One edit conversation over a fixed piece of text.
pub struct EditSession {
    original: String,
    system_instruction: String,
    max_tokens: u32,
    history: Vec<ConversationTurn>,
}

impl EditSession {
    pub fn new(original: impl Into<String>, system_instruction: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            original: original.into(),
            system_instruction: system_instruction.into(),
            max_tokens,
            history: Vec::new(),
        }
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    /// The most recent completed reply, if any.
    pub fn latest_reply(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|turn| turn.role == TurnRole::Assistant)
            .map(|turn| turn.content.as_str())
    }

    /// Build the request for a new instruction without touching history.
    pub fn build_request(&self, instruction: &str) -> CompletionRequest {
        CompletionRequest::new(instruction, self.max_tokens)
            .with_system_instruction(self.system_instruction.clone())
            .with_context(
                format!("Here is the original text:\n\n{}", self.original),
                CONTEXT_ACK,
            )
            .with_history(self.history.clone())
    }

    /// Send an instruction, streaming the reply on `chunk_tx`.
    ///
    /// On success the instruction and the complete reply are appended to the
    /// history. On failure the history is left as it was.
    pub async fn send(
        &mut self,
        client: &LlmClient,
        config: &ModelConfig,
        instruction: &str,
        chunk_tx: &mpsc::UnboundedSender<StreamChunk>,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        let request = self.build_request(instruction);
        let reply = client
            .stream_completion(config, &request, chunk_tx, cancel)
            .await?;

        self.history.push(ConversationTurn::user(instruction));
        self.history.push(ConversationTurn::assistant(reply.clone()));
        Ok(reply)
    }
}

/// Replace `range` (byte offsets) of `document` with `replacement`.
pub fn splice_selection(document: &str, range: Range<usize>, replacement: &str) -> Result<String> {
    if range.start > range.end || range.end > document.len() {
        bail!(
            "Selection {}..{} is outside the document ({} bytes)",
            range.start,
            range.end,
            document.len()
        );
    }
    if !document.is_char_boundary(range.start) || !document.is_char_boundary(range.end) {
        bail!(
            "Selection {}..{} does not fall on character boundaries",
            range.start,
            range.end
        );
    }

    let mut out = String::with_capacity(document.len() - range.len() + replacement.len());
    out.push_str(&document[..range.start]);
    out.push_str(replacement);
    out.push_str(&document[range.end..]);
    Ok(out)
}
