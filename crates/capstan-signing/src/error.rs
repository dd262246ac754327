//! Error types for signing operations

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for signing operations
pub type Result<T> = std::result::Result<T, SigningError>;

/// Signing-related errors
#[derive(Debug, Error)]
pub enum SigningError {
    /// Keychain could not be created
    #[error("Failed to create keychain at {path}: {reason}")]
    KeychainCreation { path: PathBuf, reason: String },

    /// Keychain could not be unlocked
    #[error("Failed to unlock keychain at {path}: {reason}")]
    KeychainUnlock { path: PathBuf, reason: String },

    /// Notarization credentials could not be stored in the keychain
    #[error("Failed to import notarization credentials: {0}")]
    CredentialImport(String),

    /// Codesigning certificate could not be imported
    #[error("Failed to import codesigning certificate: {0}")]
    CertificateImport(String),

    /// Codesigning certificate blob is not valid base64
    #[error("Codesigning certificate is not valid base64: {0}")]
    CertificateDecode(#[from] base64::DecodeError),

    /// Key partition list could not be granted
    #[error("Failed to set keychain partition list: {0}")]
    PartitionList(String),

    /// Signing failed
    #[error("Failed to sign {path}: {reason}")]
    SigningFailed { path: PathBuf, reason: String },

    /// Local signature verification failed
    #[error("Signature verification failed for {path}: {reason}")]
    VerificationFailed { path: PathBuf, reason: String },

    /// Detached signature was made by an unexpected key
    #[error("Signature {signature} was made by {actual}, expected {expected}")]
    SignatureMismatch {
        signature: PathBuf,
        expected: String,
        actual: String,
    },

    /// Detached signature does not validate against the artifact bytes
    #[error("Signature {signature} does not validate against {path}: {reason}")]
    SignatureInvalid {
        signature: PathBuf,
        path: PathBuf,
        reason: String,
    },

    /// Tool execution failed
    #[error("Signing tool failed: {tool} - {reason}")]
    ToolFailed { tool: String, reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
