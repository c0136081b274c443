//! Error types for ProEdit.

use thiserror::Error;

use crate::ids::ItemId;

/// Main error type for ProEdit operations.
#[derive(Error, Debug)]
pub enum ProEditError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Media error: {0}")]
    Media(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The request is well formed but cannot be carried out (overlap,
    /// out-of-range resize, no room on the target track).
    #[error("Timeline error: {0}")]
    Timeline(String),

    #[error("Track {0} is locked")]
    TrackLocked(ItemId),

    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProEditError {
    /// True for errors that report an infeasible edit rather than a bad call.
    pub fn is_infeasible(&self) -> bool {
        matches!(self, Self::Timeline(_) | Self::TrackLocked(_))
    }
}

/// Result type alias for ProEdit operations.
pub type Result<T> = std::result::Result<T, ProEditError>;
