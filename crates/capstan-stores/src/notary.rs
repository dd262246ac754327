//! Apple notarization using notarytool
//!
//! Submission blocks until the service returns a terminal verdict; the
//! service owns the wait and any polling, so there is no pipeline-imposed
//! timeout. The API behind notarytool intermittently answers HTTP 500, so
//! every invocation runs in a bounded retry loop with exponential backoff.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use capstan_core::PipelineConfig;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};

const DEFAULT_XCRUN_PATH: &str = "/usr/bin/xcrun";
const DEFAULT_SPCTL_PATH: &str = "/usr/sbin/spctl";

/// Attempts per notarytool invocation before a server error is terminal.
const NOTARYTOOL_ATTEMPTS: u32 = 3;

/// Submits bundles to the notarization service under a keychain-scoped
/// credential profile.
pub struct Notarizer {
    xcrun_path: String,
    spctl_path: String,
    profile: String,
    keychain_path: PathBuf,
}

/// Terminal verdict returned by `notarytool submit --wait`.
#[derive(Debug)]
pub struct SubmissionVerdict {
    /// Submission identifier, used to fetch the service's diagnostic log.
    pub id: String,
    /// Service status string (`Accepted`, `Invalid`, `Rejected`).
    pub status: String,
}

impl SubmissionVerdict {
    pub fn is_accepted(&self) -> bool {
        self.status == "Accepted"
    }
}

impl Notarizer {
    /// Create a notarizer bound to the pipeline's credential profile and
    /// the run's keychain.
    pub fn new(config: &PipelineConfig, keychain_path: &Path) -> Self {
        Self {
            xcrun_path: DEFAULT_XCRUN_PATH.to_string(),
            spctl_path: DEFAULT_SPCTL_PATH.to_string(),
            profile: config.credentials_profile.clone(),
            keychain_path: keychain_path.to_path_buf(),
        }
    }

    /// Override the xcrun executable path.
    pub fn with_xcrun_path(mut self, path: impl Into<String>) -> Self {
        self.xcrun_path = path.into();
        self
    }

    /// Submit a bundle and block until the service returns a terminal
    /// verdict.
    ///
    /// Returns the submission id on acceptance. A rejection fetches the
    /// service log so the operator sees why, then fails with the
    /// submission id attached.
    pub async fn submit_and_wait(&self, bundle: &Path) -> Result<String> {
        let bundle_arg = bundle.to_string_lossy().to_string();
        let keychain_arg = self.keychain_path.to_string_lossy().to_string();

        info!(bundle = %bundle.display(), "submitting for notarization");
        let stdout = self
            .run_notarytool(&[
                "submit",
                &bundle_arg,
                "--keychain-profile",
                &self.profile,
                "--keychain",
                &keychain_arg,
                "--output-format",
                "json",
                "--wait",
            ])
            .await?;

        let verdict = parse_submission(&stdout)?;
        if verdict.is_accepted() {
            info!(id = %verdict.id, "notarization accepted");
            return Ok(verdict.id);
        }

        match self.fetch_log(&verdict.id).await {
            Ok(log) => warn!(id = %verdict.id, %log, "notarization log"),
            Err(err) => warn!(id = %verdict.id, %err, "could not fetch notarization log"),
        }
        Err(StoreError::NotarizationRejected {
            id: verdict.id,
            status: verdict.status,
        })
    }

    /// Fetch the service's diagnostic log for a submission.
    pub async fn fetch_log(&self, submission_id: &str) -> Result<String> {
        let keychain_arg = self.keychain_path.to_string_lossy().to_string();
        self.run_notarytool(&[
            "log",
            submission_id,
            "--keychain-profile",
            &self.profile,
            "--keychain",
            &keychain_arg,
        ])
        .await
    }

    /// Staple the notarization ticket to the bundle so offline verification
    /// succeeds.
    pub async fn staple(&self, bundle: &Path) -> Result<()> {
        let bundle_arg = bundle.to_string_lossy().to_string();
        let output = Command::new(&self.xcrun_path)
            .args(["stapler", "staple", "-v", bundle_arg.as_str()])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StoreError::StaplingFailed(stderr.to_string()));
        }

        info!(bundle = %bundle.display(), "stapled notarization ticket");
        Ok(())
    }

    /// Verify the bundle is distributable: the staple validates and
    /// Gatekeeper accepts the primary signature.
    ///
    /// A missing staple is reported distinctly from a notarization
    /// rejection; an accepted submission without a staple is a stapling
    /// failure, not a service verdict.
    pub async fn validate(&self, bundle: &Path) -> Result<()> {
        let bundle_arg = bundle.to_string_lossy().to_string();

        let staple_check = Command::new(&self.xcrun_path)
            .args(["stapler", "validate", "-v", bundle_arg.as_str()])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        if !staple_check.status.success() {
            return Err(StoreError::StapleMissing(bundle.to_path_buf()));
        }
        debug!(bundle = %bundle.display(), "staple validated");

        let assessment = Command::new(&self.spctl_path)
            .args([
                "-a",
                "-t",
                "open",
                "--context",
                "context:primary-signature",
                bundle_arg.as_str(),
                "-v",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        if !assessment.status.success() {
            let stderr = String::from_utf8_lossy(&assessment.stderr);
            return Err(StoreError::GatekeeperRejected {
                path: bundle.to_path_buf(),
                reason: stderr.to_string(),
            });
        }

        info!(bundle = %bundle.display(), "Gatekeeper assessment passed");
        Ok(())
    }

    /// Run a notarytool subcommand, retrying the service's intermittent
    /// HTTP 500 responses with exponential backoff.
    async fn run_notarytool(&self, args: &[&str]) -> Result<String> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!(
                command = args.first().copied().unwrap_or_default(),
                attempt, "running notarytool"
            );

            let output = Command::new(&self.xcrun_path)
                .arg("notarytool")
                .args(args)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .await?;

            if output.status.success() {
                return Ok(String::from_utf8_lossy(&output.stdout).to_string());
            }

            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            if is_internal_server_error(&stderr) && attempt < NOTARYTOOL_ATTEMPTS {
                let delay = Duration::from_secs(1 << (attempt - 1));
                warn!(attempt, ?delay, "notarytool hit a server error, retrying");
                tokio::time::sleep(delay).await;
                continue;
            }

            return Err(StoreError::NotarizationSubmission(stderr));
        }
    }
}

fn is_internal_server_error(stderr: &str) -> bool {
    stderr.contains("HTTP status code: 500")
}

#[derive(Debug, Deserialize)]
struct SubmissionResponse {
    id: Option<String>,
    status: Option<String>,
}

/// Parse the JSON verdict printed by `notarytool submit --wait`.
fn parse_submission(stdout: &str) -> Result<SubmissionVerdict> {
    let response: SubmissionResponse = serde_json::from_str(stdout)?;

    let id = response.id.ok_or_else(|| {
        StoreError::NotarizationSubmission(
            "notarytool response carried no submission id".to_string(),
        )
    })?;
    let status = response.status.unwrap_or_else(|| "Unknown".to_string());

    Ok(SubmissionVerdict { id, status })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_submission_parses() {
        let stdout = r#"{
            "id": "2efe2717-52ef-43a5-96dc-0797e4ca1041",
            "status": "Accepted",
            "message": "Processing complete"
        }"#;

        let verdict = parse_submission(stdout).unwrap();
        assert!(verdict.is_accepted());
        assert_eq!(verdict.id, "2efe2717-52ef-43a5-96dc-0797e4ca1041");
    }

    #[test]
    fn rejected_submission_keeps_id_for_diagnostics() {
        let stdout = r#"{
            "id": "7b0bda1e-02fd-4e92-b2b2-0e0b6a9a2fd1",
            "status": "Invalid",
            "message": "Processing complete"
        }"#;

        let verdict = parse_submission(stdout).unwrap();
        assert!(!verdict.is_accepted());
        assert_eq!(verdict.status, "Invalid");
        assert_eq!(verdict.id, "7b0bda1e-02fd-4e92-b2b2-0e0b6a9a2fd1");
    }

    #[test]
    fn response_without_id_is_a_submission_error() {
        let err = parse_submission(r#"{"status": "Accepted"}"#).unwrap_err();
        assert!(matches!(err, StoreError::NotarizationSubmission(_)));
    }

    #[test]
    fn malformed_response_is_a_json_error() {
        let err = parse_submission("Conducting pre-submission checks").unwrap_err();
        assert!(matches!(err, StoreError::Json(_)));
    }

    #[test]
    fn server_errors_are_detected_for_retry() {
        assert!(is_internal_server_error(
            "Error: HTTP status code: 500. Internal Server Error"
        ));
        assert!(!is_internal_server_error(
            "Error: HTTP status code: 401. Unauthorized"
        ));
    }
}
