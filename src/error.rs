//! Error types for the render lifecycle and snapshot pipeline

use crate::ImageFormat;
use thiserror::Error;

/// Result type alias for crate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering, exporting or persisting an infographic
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed visual spec content
    #[error("{0}")]
    Spec(String),

    /// The rendering engine rejected the resolved configuration
    #[error("{0}")]
    EngineConstruction(String),

    /// An engine call other than construction failed (e.g. `update`)
    #[error("Engine call failed: {0}")]
    Engine(String),

    /// One export tier failed
    #[error("Export as {format} failed: {reason}")]
    Export { format: ImageFormat, reason: String },

    /// Writing a snapshot to storage failed
    #[error("Persistence failed: {0}")]
    Persistence(String),

    /// The engine threw while being destroyed
    #[error("Teardown failed: {0}")]
    Teardown(String),

    /// A data URL could not be decoded
    #[error("Invalid data URL: {0}")]
    DataUrl(String),

    /// Invalid settings
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error should be surfaced to the user as an inline message.
    ///
    /// Only malformed specs and engine rejections are user-visible; export,
    /// persistence and teardown failures degrade silently.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, Error::Spec(_) | Error::EngineConstruction(_))
    }
}
