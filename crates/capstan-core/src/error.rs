//! Error types for pipeline configuration

use thiserror::Error;

/// Result type alias for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration and secret loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required secret environment variable is unset or empty
    #[error("{0} environment variable is required")]
    MissingSecret(&'static str),

    /// Secret environment variable is set but not usable
    #[error("{name} environment variable is malformed: {reason}")]
    InvalidSecret { name: &'static str, reason: String },

    /// IO error while emitting stage outputs
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
