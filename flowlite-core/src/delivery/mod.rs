//! # Image delivery
//!
//! Serves generated images out of the host's output, input and temp
//! directories. A request is resolved against its base directory (and
//! refused if it would leave it), optionally re-encoded from PNG to JPEG,
//! and the source optionally removed once a transcoded copy exists.

mod pipeline;
mod resolve;
mod transcode;

pub use pipeline::{DeleteOutcome, Delivery, DeliveryPipeline};
pub use resolve::{resolve_existing, resolve_path, ResolvedPath};
pub use transcode::{
    is_png, mime_for, ImageTranscoder, TranscodeOutcome, Transcoded, DEFAULT_MAX_DECODE_BYTES,
};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which host directory a file lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryKind {
    #[default]
    Output,
    Input,
    Temp,
}

impl DeliveryKind {
    /// Parse a `type` query value. Unknown values fall back to `Output`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "input" => DeliveryKind::Input,
            "temp" => DeliveryKind::Temp,
            _ => DeliveryKind::Output,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryKind::Output => "output",
            DeliveryKind::Input => "input",
            DeliveryKind::Temp => "temp",
        }
    }
}

impl std::fmt::Display for DeliveryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a [`DeliveryKind`] to its base directory.
pub trait DirectoryLayout: Send + Sync {
    fn base_dir(&self, kind: DeliveryKind) -> PathBuf;
}

/// A fixed set of directories, usually taken from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticLayout {
    pub output: PathBuf,
    pub input: PathBuf,
    pub temp: PathBuf,
}

impl Default for StaticLayout {
    fn default() -> Self {
        Self {
            output: PathBuf::from("output"),
            input: PathBuf::from("input"),
            temp: PathBuf::from("temp"),
        }
    }
}

impl DirectoryLayout for StaticLayout {
    fn base_dir(&self, kind: DeliveryKind) -> PathBuf {
        match kind {
            DeliveryKind::Output => self.output.clone(),
            DeliveryKind::Input => self.input.clone(),
            DeliveryKind::Temp => self.temp.clone(),
        }
    }
}

/// A single image request.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryRequest {
    pub kind: DeliveryKind,
    pub subfolder: String,
    pub filename: String,
    pub compress: bool,
    pub delete_after: bool,
    /// JPEG quality, 1..=100.
    pub quality: u8,
}

impl DeliveryRequest {
    pub fn new(kind: DeliveryKind, subfolder: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            kind,
            subfolder: subfolder.into(),
            filename: filename.into(),
            compress: true,
            delete_after: false,
            quality: 85,
        }
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn delete_after(mut self, delete_after: bool) -> Self {
        self.delete_after = delete_after;
        self
    }

    /// Set the JPEG quality, clamped to 1..=100.
    pub fn quality(mut self, quality: i64) -> Self {
        self.quality = clamp_quality(quality);
        self
    }
}

/// Clamp an arbitrary integer into the JPEG quality range.
pub fn clamp_quality(quality: i64) -> u8 {
    quality.clamp(1, 100) as u8
}
