//! Exit codes for the CLI

#![allow(dead_code)]

use capstan_bundle::BundleError;
use capstan_core::ConfigError;
use capstan_signing::SigningError;
use capstan_stores::StoreError;

/// Success
pub const SUCCESS: i32 = 0;

/// General error
pub const ERROR: i32 = 1;

/// Configuration or missing-secret error
pub const CONFIG_ERROR: i32 = 2;

/// Keychain, codesigning, or GPG signing error
pub const SIGNING_ERROR: i32 = 3;

/// Staging, disk image, or archive error
pub const BUNDLE_ERROR: i32 = 4;

/// Notarization rejection, submission, or staple error
pub const NOTARIZATION_ERROR: i32 = 5;

/// Release host upload or publish error
pub const UPLOAD_ERROR: i32 = 6;

/// Map a failed pipeline stage to its exit code.
///
/// Verification failures of any kind exit non-zero so the surrounding
/// workflow never treats a failed stage's artifact as releasable.
pub fn for_error(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ConfigError>().is_some() {
        return CONFIG_ERROR;
    }
    if err.downcast_ref::<SigningError>().is_some() {
        return SIGNING_ERROR;
    }
    if err.downcast_ref::<BundleError>().is_some() {
        return BUNDLE_ERROR;
    }
    if let Some(store) = err.downcast_ref::<StoreError>() {
        return match store {
            StoreError::NotarizationRejected { .. }
            | StoreError::NotarizationSubmission(_)
            | StoreError::StaplingFailed(_)
            | StoreError::StapleMissing(_)
            | StoreError::GatekeeperRejected { .. } => NOTARIZATION_ERROR,
            _ => UPLOAD_ERROR,
        };
    }

    ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn signing_errors_get_the_signing_exit_code() {
        let err = anyhow::Error::new(SigningError::VerificationFailed {
            path: PathBuf::from("capstan"),
            reason: "invalid signature".to_string(),
        });
        assert_eq!(for_error(&err), SIGNING_ERROR);
    }

    #[test]
    fn rejection_and_upload_errors_are_distinguished() {
        let rejected = anyhow::Error::new(StoreError::NotarizationRejected {
            id: "2efe2717".to_string(),
            status: "Invalid".to_string(),
        });
        assert_eq!(for_error(&rejected), NOTARIZATION_ERROR);

        let upload = anyhow::Error::new(StoreError::ApiError {
            status: 502,
            message: "bad gateway".to_string(),
        });
        assert_eq!(for_error(&upload), UPLOAD_ERROR);
    }

    #[test]
    fn unknown_errors_fall_back_to_general_failure() {
        let err = anyhow::anyhow!("unexpected");
        assert_eq!(for_error(&err), ERROR);
    }
}
