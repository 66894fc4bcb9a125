//! Vision transcription: photos of handwritten problems to Markdown.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::LlmError;
use crate::images::{prepare_images, ImagePreprocessor};
use crate::llm::LlmClient;
use crate::types::{CompletionRequest, ModelConfig, StreamChunk};

/// User message sent along with the photos.
pub const TRANSCRIBE_INSTRUCTION: &str =
    "Transcribe the handwritten content in these images into Markdown.";

/// Knobs for a transcription call, usually taken from `AppConfig`.
#[derive(Debug, Clone)]
pub struct TranscribeSettings {
    pub system_instruction: String,
    pub max_tokens: u32,
}

/// Stream a Markdown transcription of `raw_images`.
///
/// Images are prepared concurrently before the request is encoded.
/// Fragments are forwarded on `chunk_tx`; the full text is returned.
pub async fn transcribe(
    client: &LlmClient,
    config: &ModelConfig,
    settings: &TranscribeSettings,
    raw_images: Vec<Vec<u8>>,
    preprocessor: &dyn ImagePreprocessor,
    chunk_tx: &mpsc::UnboundedSender<StreamChunk>,
    cancel: &CancellationToken,
) -> Result<String, LlmError> {
    if raw_images.is_empty() {
        let err = LlmError::Configuration("no images to transcribe".to_string());
        let _ = chunk_tx.send(StreamChunk::Error(err.to_string()));
        return Err(err);
    }

    let images = prepare_images(raw_images, preprocessor).await;
    info!(
        images = images.len(),
        model = %config.model,
        "Starting transcription"
    );

    let request = CompletionRequest::new(TRANSCRIBE_INSTRUCTION, settings.max_tokens)
        .with_system_instruction(settings.system_instruction.clone())
        .with_images(images);

    client
        .stream_completion(config, &request, chunk_tx, cancel)
        .await
}
