//! Capstan Signing - trust attestations for release artifacts
//!
//! This crate covers the three signing concerns of the release pipeline:
//! - [`keychain`]: an ephemeral, password-protected keychain holding the
//!   codesigning certificate and notarization credentials for exactly one
//!   pipeline run.
//! - [`codesign`]: per-binary Apple code signatures with hardened runtime
//!   and local verification.
//! - [`gpg`]: detached, armored GPG signatures over arbitrary artifacts
//!   with fingerprint-pinned verification.

pub mod codesign;
pub mod error;
pub mod gpg;
pub mod keychain;

pub use codesign::CodeSigner;
pub use error::{Result, SigningError};
pub use gpg::GpgSigner;
pub use keychain::Keychain;
