//! Error types for trackrag
//!
//! Every failure the pipeline can surface is classified into one of a small
//! set of kinds so the orchestrator can decide, per kind, whether to degrade
//! to direct generation or to report the failure.

use thiserror::Error;

/// Main error type for retrieval, generation and storage operations
#[derive(Error, Debug)]
pub enum RagError {
    /// Track name outside the fixed track set
    #[error("Unknown track: {name}. Valid tracks: {valid}")]
    UnknownTrack { name: String, valid: String },

    /// Vector index could not be read or written
    #[error("Knowledge store unavailable: {0}")]
    StoreUnavailable(String),

    /// Peer unreachable, refused the connection, or timed out
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Peer reachable but answered with a non-success status
    #[error("Backend error (HTTP {status}): {message}")]
    BackendError { status: u16, message: String },

    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Direct generation failed after the augmented attempt had already failed
    #[error("Generation failed after fallback (augmented attempt: {augmented}): {source}")]
    GenerationFailed {
        augmented: String,
        #[source]
        source: Box<RagError>,
    },

    /// Pipeline state machine asked for an edge that does not exist
    #[error("Invalid pipeline transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for trackrag operations
pub type Result<T> = std::result::Result<T, RagError>;

impl RagError {
    /// Whether a failure of the augmented generation attempt should move the
    /// orchestrator to direct generation instead of surfacing.
    pub fn triggers_fallback(&self) -> bool {
        matches!(
            self,
            RagError::ConnectionFailed(_)
                | RagError::BackendError { .. }
                | RagError::DecodeError(_)
        )
    }

    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::UnknownTrack { .. } => "unknown_track",
            RagError::StoreUnavailable(_) => "store_unavailable",
            RagError::ConnectionFailed(_) => "connection_failed",
            RagError::BackendError { .. } => "backend_error",
            RagError::DecodeError(_) => "decode_error",
            RagError::GenerationFailed { .. } => "generation_failed",
            RagError::InvalidTransition { .. } => "invalid_transition",
            RagError::ConfigError(_) => "config_error",
            RagError::IoError(_) => "io_error",
        }
    }
}

/// reqwest folds very different failures into one type; split them by what
/// the caller can do about them.
impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RagError::DecodeError(err.to_string())
        } else if let (true, Some(status)) = (err.is_status(), err.status()) {
            RagError::BackendError {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            RagError::ConnectionFailed(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RagError {
    fn from(err: serde_json::Error) -> Self {
        RagError::DecodeError(err.to_string())
    }
}

/// Convert anyhow errors raised by model loading and storage internals
impl From<anyhow::Error> for RagError {
    fn from(err: anyhow::Error) -> Self {
        RagError::StoreUnavailable(format!("{:#}", err))
    }
}
