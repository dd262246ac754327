//! Error types for bundle assembly

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for bundle operations
pub type Result<T> = std::result::Result<T, BundleError>;

/// Bundle assembly errors
#[derive(Debug, Error)]
pub enum BundleError {
    /// A staged file is missing or not a regular file
    #[error("Resource {0} does not exist")]
    MissingResource(PathBuf),

    /// Archive creation failed
    #[error("Archive failed for {path}: {reason}")]
    ArchiveFailed { path: PathBuf, reason: String },

    /// Bundling tool execution failed
    #[error("Bundle tool failed: {tool} - {reason}")]
    ToolFailed { tool: String, reason: String },

    /// Zip error
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// HTTP error while fetching the volume icon
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
