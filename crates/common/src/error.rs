//! Error types for shotdiff

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using the shotdiff Error
pub type Result<T> = std::result::Result<T, Error>;

/// shotdiff error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Scenario \"{name}\" already exists in context {}", context.as_deref().unwrap_or("<root>"))]
    DuplicateScenario {
        name: String,
        context: Option<String>,
    },

    #[error("Failed to read baseline {}: {source}", path.display())]
    BaselineRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write baseline {}: {source}", path.display())]
    BaselineWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Screenshot capture unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("Screenshot capture failed: {0}")]
    Capture(String),

    #[error("Snapshot server is not available: {0}")]
    SyncUnavailable(String),

    #[error("Unknown scenario \"{name}\" in context {}", context.as_deref().unwrap_or("<root>"))]
    UnknownScenarioReference {
        name: String,
        context: Option<String>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    /// Whether this error leaves previously merged client state usable for a retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::SyncUnavailable(_) | Error::CaptureUnavailable(_))
    }
}
