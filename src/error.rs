//! Error taxonomy for LLM calls.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the LLM client.
///
/// Malformed SSE lines never show up here: the decoder skips them.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LlmError {
    /// The call could not be attempted (missing credential, no images, ...).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Non-200 status other than 429/5xx. Not retried on other endpoints.
    #[error("request rejected ({status}): {body}")]
    ClientRequest { status: u16, body: String },

    /// 429 or 5xx status.
    #[error("server error ({status}): {body}")]
    TransientServer { status: u16, body: String },

    /// Connection refused, DNS failure, broken body stream, ...
    #[error("transport error: {0}")]
    Transport(String),

    #[error("no response within {}s", .0.as_secs())]
    Timeout(Duration),

    /// Every candidate endpoint failed with a retryable error.
    #[error("all {attempts} endpoint(s) failed, last error: {last}")]
    ExhaustedEndpoints { attempts: usize, last: String },

    /// The connection broke after text was already delivered.
    #[error("stream interrupted after partial output: {0}")]
    StreamInterrupted(String),

    #[error("cancelled")]
    Cancelled,
}

impl LlmError {
    /// Whether the failover driver should move on to the next endpoint.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::TransientServer { .. } | LlmError::Transport(_) | LlmError::Timeout(_)
        )
    }

    /// Classify a non-200 HTTP status.
    pub fn from_status(status: u16, body: String) -> Self {
        if status == 429 || status >= 500 {
            LlmError::TransientServer { status, body }
        } else {
            LlmError::ClientRequest { status, body }
        }
    }
}
