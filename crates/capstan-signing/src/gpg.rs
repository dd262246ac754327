//! GPG detached signatures

use std::path::{Path, PathBuf};
use std::process::Stdio;

use capstan_core::{PipelineConfig, Secret};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Result, SigningError};

/// Produces and verifies detached, armored GPG signatures with the
/// pipeline's fixed signing key.
pub struct GpgSigner {
    gpg_path: String,
    fingerprint: String,
}

impl GpgSigner {
    /// Create a signer bound to the pipeline's GPG fingerprint.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            gpg_path: "gpg".to_string(),
            fingerprint: config.gpg_fingerprint.clone(),
        }
    }

    /// Override the gpg executable path.
    pub fn with_gpg_path(mut self, path: impl Into<String>) -> Self {
        self.gpg_path = path.into();
        self
    }

    /// Signature file name for an artifact: `<file name>.asc` inside
    /// `output_dir`.
    pub fn signature_path(artifact: &Path, output_dir: &Path) -> PathBuf {
        let name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        output_dir.join(format!("{name}.asc"))
    }

    /// Create an ASCII-armored detached signature over `artifact`,
    /// overwriting any prior signature at `signature`.
    ///
    /// Runs in batch mode with no interactive prompts. The passphrase is
    /// delivered on fd 0, never in the argument list, so it is not visible
    /// to other processes.
    pub async fn sign_detached(
        &self,
        artifact: &Path,
        signature: &Path,
        passphrase: &Secret,
    ) -> Result<()> {
        if !artifact.is_file() {
            return Err(SigningError::SigningFailed {
                path: artifact.to_path_buf(),
                reason: "artifact does not exist".to_string(),
            });
        }

        let signature_arg = signature.to_string_lossy().to_string();
        let artifact_arg = artifact.to_string_lossy().to_string();
        let args: [&str; 13] = [
            "--batch",
            "--yes",
            "--armor",
            "--detach-sign",
            "--local-user",
            self.fingerprint.as_str(),
            "--pinentry-mode",
            "loopback",
            "--passphrase-fd",
            "0",
            "--output",
            signature_arg.as_str(),
            artifact_arg.as_str(),
        ];

        info!(artifact = %artifact.display(), "creating GPG signature");
        debug!(fingerprint = %self.fingerprint, "signing key");

        let mut child = Command::new(&self.gpg_path)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(passphrase.expose().as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SigningError::SigningFailed {
                path: artifact.to_path_buf(),
                reason: stderr.to_string(),
            });
        }

        Ok(())
    }

    /// Verify a detached signature against the artifact bytes and the
    /// expected signing key.
    pub async fn verify(
        &self,
        artifact: &Path,
        signature: &Path,
        expected_fingerprint: &str,
    ) -> Result<()> {
        let signature_arg = signature.to_string_lossy().to_string();
        let artifact_arg = artifact.to_string_lossy().to_string();

        // --status-fd emits machine-readable verdict lines on stdout.
        let output = Command::new(&self.gpg_path)
            .args([
                "--batch",
                "--status-fd",
                "1",
                "--verify",
                signature_arg.as_str(),
                artifact_arg.as_str(),
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        let status = String::from_utf8_lossy(&output.stdout);
        classify_verify_status(&status, expected_fingerprint, artifact, signature)
    }
}

/// Map gpg `--status-fd` output to a verification verdict.
///
/// `VALIDSIG` carries the signing-key fingerprint (first field) and the
/// primary-key fingerprint (last field); the pinned fingerprint may be
/// either. `BADSIG` means the artifact bytes do not match; `ERRSIG` means
/// the signature could not be checked at all.
fn classify_verify_status(
    status: &str,
    expected_fingerprint: &str,
    artifact: &Path,
    signature: &Path,
) -> Result<()> {
    if let Some(fields) = status
        .lines()
        .find_map(|line| line.strip_prefix("[GNUPG:] VALIDSIG "))
        .map(|rest| rest.split_whitespace().collect::<Vec<_>>())
    {
        let signing_key = fields.first().copied().unwrap_or_default();
        let primary_key = fields.last().copied().unwrap_or_default();

        if signing_key.eq_ignore_ascii_case(expected_fingerprint)
            || primary_key.eq_ignore_ascii_case(expected_fingerprint)
        {
            debug!(artifact = %artifact.display(), "GPG signature verified");
            return Ok(());
        }

        return Err(SigningError::SignatureMismatch {
            signature: signature.to_path_buf(),
            expected: expected_fingerprint.to_string(),
            actual: signing_key.to_string(),
        });
    }

    let reason = if status.contains("[GNUPG:] BADSIG") {
        "bad signature over artifact bytes"
    } else if status.contains("[GNUPG:] ERRSIG") {
        "signature could not be checked"
    } else {
        "no valid signature found"
    };

    Err(SigningError::SignatureInvalid {
        signature: signature.to_path_buf(),
        path: artifact.to_path_buf(),
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPECTED: &str = "3F0B6C8A9D41E27586CC01D4B95A2E71D0C3F8A4";

    fn artifact() -> &'static Path {
        Path::new("dist/capstan-nightly.tar.gz")
    }

    fn signature() -> &'static Path {
        Path::new("dist/capstan-nightly.tar.gz.asc")
    }

    #[test]
    fn validsig_with_expected_fingerprint_passes() {
        let status = format!(
            "[GNUPG:] SIG_ID abc123 2026-08-07 1754524800\n\
             [GNUPG:] VALIDSIG {EXPECTED} 2026-08-07 1754524800 0 4 0 1 10 00 {EXPECTED}\n\
             [GNUPG:] TRUST_ULTIMATE 0 pgp\n"
        );
        assert!(classify_verify_status(&status, EXPECTED, artifact(), signature()).is_ok());
    }

    #[test]
    fn validsig_matches_primary_key_fingerprint() {
        // Signature made by a signing subkey whose primary key is pinned.
        let subkey = "1111222233334444555566667777888899990000";
        let status = format!(
            "[GNUPG:] VALIDSIG {subkey} 2026-08-07 1754524800 0 4 0 1 10 00 {EXPECTED}\n"
        );
        assert!(classify_verify_status(&status, EXPECTED, artifact(), signature()).is_ok());
    }

    #[test]
    fn validsig_with_unexpected_key_is_a_mismatch() {
        let other = "AAAA222233334444555566667777888899990000";
        let status =
            format!("[GNUPG:] VALIDSIG {other} 2026-08-07 1754524800 0 4 0 1 10 00 {other}\n");

        let err = classify_verify_status(&status, EXPECTED, artifact(), signature()).unwrap_err();
        match err {
            SigningError::SignatureMismatch {
                expected, actual, ..
            } => {
                assert_eq!(expected, EXPECTED);
                assert_eq!(actual, other);
            }
            other => panic!("expected SignatureMismatch, got {other:?}"),
        }
    }

    #[test]
    fn badsig_is_invalid() {
        let status = "[GNUPG:] BADSIG AF57A37CAC061452 Capstan Release Signing\n";
        let err = classify_verify_status(status, EXPECTED, artifact(), signature()).unwrap_err();
        assert!(matches!(err, SigningError::SignatureInvalid { .. }));
    }

    #[test]
    fn errsig_is_invalid() {
        let status = "[GNUPG:] ERRSIG AF57A37CAC061452 1 10 00 1754524800 9 -\n";
        let err = classify_verify_status(status, EXPECTED, artifact(), signature()).unwrap_err();
        assert!(matches!(err, SigningError::SignatureInvalid { .. }));
    }

    #[test]
    fn empty_status_is_invalid() {
        let err = classify_verify_status("", EXPECTED, artifact(), signature()).unwrap_err();
        assert!(matches!(err, SigningError::SignatureInvalid { .. }));
    }

    #[test]
    fn signature_path_appends_asc_in_output_dir() {
        let path = GpgSigner::signature_path(
            Path::new("target/capstan-nightly.dmg"),
            Path::new("dist/nightly"),
        );
        assert_eq!(path, Path::new("dist/nightly/capstan-nightly.dmg.asc"));
    }
}
