//! macOS code signing

use std::path::Path;
use std::process::Stdio;

use capstan_core::PipelineConfig;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Result, SigningError};
use crate::keychain::Keychain;

/// Applies and verifies Apple code signatures on single binaries.
pub struct CodeSigner {
    codesign_path: String,
    identity: String,
}

impl CodeSigner {
    /// Create a code signer using the pipeline's Developer ID identity.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            codesign_path: "/usr/bin/codesign".to_string(),
            identity: config.codesign_identity.clone(),
        }
    }

    /// Override the codesign executable path.
    pub fn with_codesign_path(mut self, path: impl Into<String>) -> Self {
        self.codesign_path = path.into();
        self
    }

    /// Sign a binary in place with hardened runtime, strict validation,
    /// and a secure timestamp, replacing any prior signature.
    pub async fn sign(&self, binary: &Path, keychain: &Keychain) -> Result<()> {
        if !binary.is_file() {
            return Err(SigningError::SigningFailed {
                path: binary.to_path_buf(),
                reason: "binary does not exist".to_string(),
            });
        }

        let args = sign_args(&self.identity, keychain.path(), binary);

        info!(binary = %binary.display(), "codesigning");
        self.run_codesign(&args)
            .await
            .map_err(|err| SigningError::SigningFailed {
                path: binary.to_path_buf(),
                reason: err.to_string(),
            })?;

        Ok(())
    }

    /// Verify the signature on a binary.
    ///
    /// With `check_notarization` set, verification also requires a valid
    /// notarization ticket; used after stapling for the distributable check.
    pub async fn verify(&self, binary: &Path, check_notarization: bool) -> Result<()> {
        let args = verify_args(binary, check_notarization);

        self.run_codesign(&args)
            .await
            .map_err(|err| SigningError::VerificationFailed {
                path: binary.to_path_buf(),
                reason: err.to_string(),
            })?;

        debug!(binary = %binary.display(), check_notarization, "signature verified");
        Ok(())
    }

    /// Show signature details for a binary, for operator diagnostics.
    pub async fn display(&self, binary: &Path, check_notarization: bool) -> Result<String> {
        let mut args = vec!["--display".to_string()];
        if check_notarization {
            args.push("--check-notarization".to_string());
        }
        args.push("-vvv".to_string());
        args.push(binary.to_string_lossy().to_string());

        self.run_codesign(&args).await
    }

    /// Run codesign, returning merged diagnostic output on success.
    ///
    /// codesign writes its diagnostics to stderr even on success.
    async fn run_codesign(&self, args: &[String]) -> Result<String> {
        debug!(?args, "running codesign");

        let output = Command::new(&self.codesign_path)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(SigningError::ToolFailed {
                tool: "codesign".to_string(),
                reason: if stderr.is_empty() { stdout } else { stderr },
            });
        }

        Ok(if stdout.is_empty() { stderr } else { stdout })
    }
}

fn sign_args(identity: &str, keychain: &Path, binary: &Path) -> Vec<String> {
    vec![
        "--keychain".to_string(),
        keychain.to_string_lossy().to_string(),
        "--sign".to_string(),
        identity.to_string(),
        "--options=runtime".to_string(),
        "--strict=all".to_string(),
        "--timestamp".to_string(),
        "-vvv".to_string(),
        "--force".to_string(),
        binary.to_string_lossy().to_string(),
    ]
}

fn verify_args(binary: &Path, check_notarization: bool) -> Vec<String> {
    let mut args = vec!["--verify".to_string()];
    if check_notarization {
        args.push("--check-notarization".to_string());
    }
    args.push("--deep".to_string());
    args.push("--strict=all".to_string());
    args.push("-vvv".to_string());
    args.push(binary.to_string_lossy().to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_args_enable_hardened_runtime_and_force() {
        let args = sign_args(
            "Developer ID Application: Test (TEAMID0000)",
            Path::new("/tmp/build.keychain-db"),
            Path::new("target/release/capstan"),
        );

        assert!(args.contains(&"--options=runtime".to_string()));
        assert!(args.contains(&"--timestamp".to_string()));
        assert!(args.contains(&"--force".to_string()));
        assert_eq!(args.last().unwrap(), "target/release/capstan");
        assert!(args.contains(&"--keychain".to_string()));
    }

    #[test]
    fn verify_args_are_strict_by_default() {
        let args = verify_args(Path::new("capstan"), false);
        assert!(args.contains(&"--deep".to_string()));
        assert!(args.contains(&"--strict=all".to_string()));
        assert!(!args.contains(&"--check-notarization".to_string()));
    }

    #[test]
    fn verify_args_check_notarization_in_strict_mode() {
        let args = verify_args(Path::new("capstan"), true);
        assert!(args.contains(&"--check-notarization".to_string()));
    }
}
