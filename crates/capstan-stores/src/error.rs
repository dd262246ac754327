//! Store error types

use std::path::PathBuf;

use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors from the notarization service and the release host
#[derive(Debug, Error)]
pub enum StoreError {
    /// The notarization service returned a rejection verdict
    #[error("Notarization rejected (submission {id}, status {status}); see the service log for details")]
    NotarizationRejected { id: String, status: String },

    /// Submission never reached a verdict (transport, auth, service errors)
    #[error("Notarization submission failed: {0}")]
    NotarizationSubmission(String),

    /// Stapling the notarization ticket failed
    #[error("Failed to staple notarization ticket: {0}")]
    StaplingFailed(String),

    /// The bundle carries no valid staple
    #[error("No valid notarization staple on {0}")]
    StapleMissing(PathBuf),

    /// Gatekeeper assessment of the bundle failed
    #[error("Gatekeeper assessment failed for {path}: {reason}")]
    GatekeeperRejected { path: PathBuf, reason: String },

    /// Release record not found on the host
    #[error("No release found for tag {0}")]
    ReleaseNotFound(String),

    /// Publish requested before every required asset landed
    #[error("Refusing to publish {tag}: missing required assets {missing:?}")]
    PublishBarrier { tag: String, missing: Vec<String> },

    /// Asset path is not uploadable
    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    /// API error from the release host
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Tool execution failed
    #[error("Command failed: {tool} - {reason}")]
    ToolFailed { tool: String, reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
