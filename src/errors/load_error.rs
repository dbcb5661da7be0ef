//! Checkpoint loading errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while resolving or decoding a checkpoint.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Checkpoint not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Unsupported checkpoint format: {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed checkpoint manifest: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt checkpoint: {message}")]
    Corrupt { message: String },

    #[error("Checkpoint worker failed: {message}")]
    Worker { message: String },
}

impl LoadError {
    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }
}
