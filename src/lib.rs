//! notescan: photos of handwritten problems to Markdown notes.
//!
//! The library holds the streaming LLM client (endpoint building, request
//! encoding, SSE decoding and endpoint failover) together with the vision
//! and edit paths and the local note store. The `notescan` binary is a
//! thin command-line front end over it.

pub mod config;
pub mod edit;
pub mod error;
pub mod images;
pub mod llm;
pub mod notes;
pub mod types;
pub mod vision;

pub use error::LlmError;
pub use llm::LlmClient;
pub use types::{ConversationTurn, ModelConfig, ProviderKind, StreamChunk};
