//! Error types for FlowLite.
//!
//! Uses `thiserror` for the request-facing error taxonomy. Failures that are
//! recovered locally (transcoding, post-send deletion) are not errors here:
//! they are reported through outcome enums in [`crate::delivery`].

use std::path::PathBuf;

/// Top-level error type for the FlowLite core library.
#[derive(Debug, thiserror::Error)]
pub enum FlowliteError {
    #[error("filename required")]
    MissingFilename,

    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Invalid path: {path} escapes its base directory")]
    PathEscape { path: PathBuf },

    #[error("File not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FlowliteError {
    /// HTTP status code this error surfaces as.
    pub fn status(&self) -> u16 {
        match self {
            FlowliteError::MissingFilename | FlowliteError::BadRequest { .. } => 400,
            FlowliteError::PathEscape { .. } => 403,
            FlowliteError::NotFound { .. } => 404,
            _ => 500,
        }
    }

    /// Message safe to hand back to a client.
    ///
    /// Client errors keep their detail; path errors never echo the resolved
    /// filesystem location.
    pub fn client_message(&self) -> String {
        match self {
            FlowliteError::PathEscape { .. } => "Invalid path".to_string(),
            FlowliteError::NotFound { .. } => "File not found".to_string(),
            other => other.to_string(),
        }
    }
}

/// Errors from acquiring a registry snapshot.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry request failed: {message}")]
    Request { message: String },

    #[error("registry returned HTTP {status}")]
    Status { status: u16 },

    #[error("registry snapshot is malformed: {message}")]
    Malformed { message: String },

    #[error("failed to read registry dump {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `FlowliteError`.
pub type Result<T> = std::result::Result<T, FlowliteError>;
