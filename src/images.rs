//! Image preparation for vision requests.
//!
//! Captured photos go through an `ImagePreprocessor` (typically a
//! downscale/recompress step) before being attached. Images are independent,
//! so they are prepared concurrently; an image whose preprocessing fails is
//! sent with its original bytes instead of failing the whole batch.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::future::join_all;
use std::path::Path;
use tracing::warn;

use crate::types::ImageAttachment;

/// MIME type assumed when the bytes are not a recognized image format.
pub const FALLBACK_MIME: &str = "image/jpeg";

/// Transforms raw image bytes before upload.
#[async_trait]
pub trait ImagePreprocessor: Send + Sync {
    async fn prepare(&self, bytes: &[u8]) -> Result<Vec<u8>>;
}

/// Uploads images unchanged.
pub struct Passthrough;

#[async_trait]
impl ImagePreprocessor for Passthrough {
    async fn prepare(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// Detect the image MIME type from magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    if infer::is_image(bytes) {
        infer::get(bytes)
            .map(|kind| kind.mime_type())
            .unwrap_or(FALLBACK_MIME)
    } else {
        FALLBACK_MIME
    }
}

/// Prepare every image concurrently, preserving input order.
pub async fn prepare_images(
    raw: Vec<Vec<u8>>,
    preprocessor: &dyn ImagePreprocessor,
) -> Vec<ImageAttachment> {
    let prepared = join_all(raw.into_iter().enumerate().map(|(index, bytes)| async move {
        let result = preprocessor.prepare(&bytes).await;
        match result {
            Ok(out) => out,
            Err(e) => {
                warn!(image = index, error = %e, "Image preprocessing failed, using original bytes");
                bytes
            }
        }
    }))
    .await;

    prepared
        .into_iter()
        .map(|bytes| {
            let mime = sniff_mime(&bytes);
            ImageAttachment::new(bytes, mime)
        })
        .collect()
}

/// Read image files from disk, in the given order.
pub async fn read_image_files(paths: &[impl AsRef<Path>]) -> Result<Vec<Vec<u8>>> {
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read image: {}", path.display()))?;
        images.push(bytes);
    }
    Ok(images)
}
