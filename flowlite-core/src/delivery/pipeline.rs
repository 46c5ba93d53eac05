use super::resolve::resolve_existing;
use super::transcode::{is_png, mime_for, ImageTranscoder, TranscodeOutcome};
use super::{DeliveryRequest, DirectoryLayout};
use crate::error::{FlowliteError, Result};
use bytes::Bytes;
use std::sync::Arc;

/// What happened to the source file after the payload was prepared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Not requested, or nothing was transcoded.
    Kept,
    Deleted,
    /// Requested and allowed, but the filesystem refused.
    Failed(String),
}

/// A prepared response body and its metadata.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub bytes: Bytes,
    pub mime: &'static str,
    pub original_size: usize,
    pub transcode: Option<TranscodeOutcome>,
    pub delete: DeleteOutcome,
}

impl Delivery {
    pub fn compressed_size(&self) -> usize {
        self.bytes.len()
    }

    pub fn was_compressed(&self) -> bool {
        self.transcode == Some(TranscodeOutcome::Converted)
    }

    pub fn deleted(&self) -> bool {
        self.delete == DeleteOutcome::Deleted
    }
}

/// Resolves, reads, optionally transcodes and optionally deletes.
pub struct DeliveryPipeline {
    layout: Arc<dyn DirectoryLayout>,
    transcoder: ImageTranscoder,
}

impl std::fmt::Debug for DeliveryPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryPipeline")
            .field("transcoder", &self.transcoder)
            .finish_non_exhaustive()
    }
}

impl DeliveryPipeline {
    pub fn new(layout: Arc<dyn DirectoryLayout>, transcoder: ImageTranscoder) -> Self {
        Self { layout, transcoder }
    }

    pub async fn deliver(&self, request: &DeliveryRequest) -> Result<Delivery> {
        // Canonicalization touches the filesystem; keep it off the runtime threads.
        let layout = Arc::clone(&self.layout);
        let (kind, subfolder, filename) = (
            request.kind,
            request.subfolder.clone(),
            request.filename.clone(),
        );
        let resolved = tokio::task::spawn_blocking(move || {
            resolve_existing(layout.as_ref(), kind, &subfolder, &filename)
        })
        .await
        .map_err(|e| FlowliteError::Io(std::io::Error::other(e)))?
        .inspect_err(|e| {
            if let FlowliteError::PathEscape { path } = e {
                tracing::warn!(
                    kind = %request.kind,
                    subfolder = %request.subfolder,
                    filename = %request.filename,
                    resolved = %path.display(),
                    "Rejected path outside base directory"
                );
            }
        })?;

        if !tokio::fs::metadata(resolved.path()).await?.is_file() {
            return Err(FlowliteError::NotFound {
                path: resolved.into_path_buf(),
            });
        }

        let data = Bytes::from(tokio::fs::read(resolved.path()).await?);
        let original_size = data.len();

        let (bytes, mime, transcode) = if request.compress && is_png(&request.filename, &data) {
            let out = self.transcoder.transcode_async(data, request.quality).await;
            (out.bytes, out.mime, Some(out.outcome))
        } else {
            let mime = mime_for(&request.filename, &data);
            (data, mime, None)
        };

        let mut delivery = Delivery {
            bytes,
            mime,
            original_size,
            transcode,
            delete: DeleteOutcome::Kept,
        };

        if delivery.was_compressed() {
            let compressed = delivery.compressed_size();
            let ratio = if compressed > 0 {
                original_size as f64 / compressed as f64
            } else {
                1.0
            };
            tracing::info!(
                filename = %request.filename,
                original_kb = original_size / 1024,
                compressed_kb = compressed / 1024,
                ratio = %format!("{:.1}x", ratio),
                "Image sent (PNG→JPEG)"
            );
        } else {
            tracing::info!(
                filename = %request.filename,
                size_kb = original_size / 1024,
                "Image sent (no compression)"
            );
        }

        // Only a source that now exists in another form may be removed.
        if request.delete_after && delivery.was_compressed() {
            delivery.delete = match tokio::fs::remove_file(resolved.path()).await {
                Ok(()) => {
                    tracing::info!(filename = %request.filename, "Deleted original");
                    DeleteOutcome::Deleted
                }
                Err(e) => {
                    tracing::warn!(filename = %request.filename, error = %e, "Failed to delete original");
                    DeleteOutcome::Failed(e.to_string())
                }
            };
        }

        Ok(delivery)
    }
}
