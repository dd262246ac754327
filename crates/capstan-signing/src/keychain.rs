//! Ephemeral signing keychain lifecycle
//!
//! The codesigning and notarization process runs against an isolated,
//! file-backed keychain with a per-run random password. The keychain holds
//! Apple ID credentials for `notarytool` and the codesigning certificate
//! for `codesign`, and is destroyed when the run ends.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use capstan_core::Secret;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Result, SigningError};

/// Tool identifiers granted use of imported keys without prompting.
pub const PARTITION_LIST: &str = "apple-tool:,apple:,codesign:";

const DEFAULT_SECURITY_PATH: &str = "/usr/bin/security";
const DEFAULT_XCRUN_PATH: &str = "/usr/bin/xcrun";

/// An ephemeral keychain scoped to one pipeline run.
///
/// [`Keychain::destroy`] consumes the value, so the keychain cannot be
/// deleted twice or used after deletion.
pub struct Keychain {
    path: PathBuf,
    password: Secret,
    security_path: String,
    xcrun_path: String,
}

impl Keychain {
    /// Create a new keychain file at `path` protected by `password`.
    ///
    /// A keychain left behind by a crashed run is deleted first. The new
    /// keychain is appended to the user keychain search list: `codesign`
    /// does not search keychains passed via `--keychain` unless they are
    /// also on the search list.
    pub async fn create(path: PathBuf, password: Secret) -> Result<Self> {
        Self::create_with_tools(
            path,
            password,
            DEFAULT_SECURITY_PATH.to_string(),
            DEFAULT_XCRUN_PATH.to_string(),
        )
        .await
    }

    /// Create a keychain using explicit `security` and `xcrun` executables.
    pub async fn create_with_tools(
        path: PathBuf,
        password: Secret,
        security_path: String,
        xcrun_path: String,
    ) -> Result<Self> {
        let keychain = Self {
            path,
            password,
            security_path,
            xcrun_path,
        };

        let path_arg = keychain.path_arg();

        if let Err(err) = keychain.run_security(&["delete-keychain", &path_arg]).await {
            debug!(%err, "no pre-existing keychain to delete");
        }

        keychain
            .run_security(&[
                "create-keychain",
                "-p",
                keychain.password.expose(),
                &path_arg,
            ])
            .await
            .map_err(|err| SigningError::KeychainCreation {
                path: keychain.path.clone(),
                reason: err.to_string(),
            })?;
        info!(path = %keychain.path.display(), "created keychain");

        keychain.register_in_search_list().await?;

        Ok(keychain)
    }

    /// Path to the keychain file, for `--keychain` arguments.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Set the auto-lock timeout on the keychain.
    pub async fn configure(&self, idle_timeout_secs: u32) -> Result<()> {
        let path_arg = self.path_arg();
        let timeout = idle_timeout_secs.to_string();
        self.run_security(&["set-keychain-settings", "-lut", &timeout, &path_arg])
            .await?;
        debug!(idle_timeout_secs, "set keychain lock timeout");
        Ok(())
    }

    /// Unlock the keychain. Must succeed before any import or signing
    /// operation.
    pub async fn unlock(&self) -> Result<()> {
        let path_arg = self.path_arg();
        self.run_security(&["unlock-keychain", "-p", self.password.expose(), &path_arg])
            .await
            .map_err(|err| SigningError::KeychainUnlock {
                path: self.path.clone(),
                reason: err.to_string(),
            })?;
        info!(path = %self.path.display(), "unlocked keychain");
        Ok(())
    }

    /// Store notarization service credentials under `profile` inside the
    /// keychain, for later reference by name.
    pub async fn import_credentials(
        &self,
        profile: &str,
        apple_id: &str,
        app_password: &Secret,
        team_id: &str,
    ) -> Result<()> {
        let path_arg = self.path_arg();
        let output = Command::new(&self.xcrun_path)
            .args([
                "notarytool",
                "store-credentials",
                profile,
                "--apple-id",
                apple_id,
                "--password",
                app_password.expose(),
                "--team-id",
                team_id,
                "--keychain",
                path_arg.as_str(),
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SigningError::CredentialImport(stderr.to_string()));
        }

        info!(profile, "stored notarization credentials");
        Ok(())
    }

    /// Import a base64-encoded PKCS#12 certificate blob into the keychain.
    ///
    /// The decoded certificate is written to a temporary directory that is
    /// removed before this call returns, on failure as well; the plaintext
    /// certificate never outlives the import.
    pub async fn import_certificate(
        &self,
        encoded: &Secret,
        certificate_password: &Secret,
    ) -> Result<()> {
        let decoded = BASE64.decode(encoded.expose())?;

        let scratch = tempfile::tempdir()?;
        let certificate = scratch.path().join("certificate.p12");
        tokio::fs::write(&certificate, &decoded).await?;

        let path_arg = self.path_arg();
        let certificate_arg = certificate.to_string_lossy().to_string();
        let result = self
            .run_security(&[
                "import",
                &certificate_arg,
                "-k",
                &path_arg,
                "-T",
                "/usr/bin/codesign",
                "-P",
                certificate_password.expose(),
            ])
            .await;

        let cleanup = scratch.close();

        result.map_err(|err| SigningError::CertificateImport(err.to_string()))?;
        cleanup?;

        info!("imported codesigning certificate");
        Ok(())
    }

    /// Authorize the partition-list tools to use imported keys without
    /// additional prompts.
    pub async fn grant_partition_list(&self) -> Result<()> {
        let path_arg = self.path_arg();
        self.run_security(&[
            "set-key-partition-list",
            "-S",
            PARTITION_LIST,
            "-s",
            "-k",
            self.password.expose(),
            &path_arg,
        ])
        .await
        .map_err(|err| SigningError::PartitionList(err.to_string()))?;

        debug!(tools = PARTITION_LIST, "granted key partition list");
        Ok(())
    }

    /// Delete the keychain file.
    ///
    /// Consumes the keychain. A keychain that is already gone is not an
    /// error; the run's teardown must always succeed at this step.
    pub async fn destroy(self) -> Result<()> {
        let path_arg = self.path_arg();
        match self.run_security(&["delete-keychain", &path_arg]).await {
            Ok(_) => {
                info!(path = %self.path.display(), "deleted keychain");
                Ok(())
            }
            Err(err) if !self.path.exists() => {
                warn!(path = %self.path.display(), %err, "keychain already absent");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn path_arg(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    /// Append this keychain to the user keychain search list.
    async fn register_in_search_list(&self) -> Result<()> {
        let listing = self.run_security(&["list-keychains", "-d", "user"]).await?;

        let mut search_path: Vec<String> = listing
            .lines()
            .map(|line| line.trim().trim_matches('"').to_string())
            .filter(|entry| !entry.is_empty())
            .collect();
        search_path.push(self.path_arg());

        let mut args = vec!["list-keychains", "-d", "user", "-s"];
        args.extend(search_path.iter().map(String::as_str));
        self.run_security(&args).await?;

        debug!(entries = search_path.len(), "set keychain search path");
        Ok(())
    }

    /// Run a `security` subcommand, returning stdout on success.
    ///
    /// Only the subcommand name is logged; several subcommands take the
    /// keychain password in their argument list.
    async fn run_security(&self, args: &[&str]) -> Result<String> {
        debug!(
            command = args.first().copied().unwrap_or_default(),
            "running security"
        );

        let output = Command::new(&self.security_path)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(SigningError::ToolFailed {
                tool: "security".to_string(),
                reason: if stderr.is_empty() { stdout } else { stderr },
            });
        }

        Ok(stdout)
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    /// Write a `security` shim that logs invocations and mimics keychain
    /// file handling, so lifecycle behavior is testable off-macOS.
    fn fake_security(dir: &Path) -> (String, PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let log = dir.join("invocations.log");
        let script = dir.join("security");
        let body = format!(
            concat!(
                "#!/bin/sh\n",
                "printf '%s\\n' \"$*\" >> {log}\n",
                "for last in \"$@\"; do :; done\n",
                "case \"$1\" in\n",
                "  create-keychain) : > \"$last\" ;;\n",
                "  delete-keychain) [ -e \"$last\" ] || exit 1; rm -f \"$last\" ;;\n",
                "  list-keychains) echo '    \"/tmp/login.keychain-db\"' ;;\n",
                "esac\n",
                "exit 0\n",
            ),
            log = log.display()
        );
        std::fs::write(&script, body).unwrap();

        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        (script.to_string_lossy().to_string(), log)
    }

    fn invocations(log: &Path) -> Vec<String> {
        std::fs::read_to_string(log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn create_provisions_file_and_search_list() {
        let dir = tempfile::tempdir().unwrap();
        let (tool, log) = fake_security(dir.path());
        let keychain_file = dir.path().join("notarization.keychain-db");

        let keychain = Keychain::create_with_tools(
            keychain_file.clone(),
            Secret::new("test-password".to_string()),
            tool.clone(),
            tool,
        )
        .await
        .unwrap();

        assert!(keychain_file.exists());
        assert_eq!(keychain.path(), keychain_file.as_path());

        let calls = invocations(&log);
        assert!(calls.iter().any(|c| c.starts_with("create-keychain")));
        // Search list is re-set with the new keychain appended.
        assert!(calls
            .iter()
            .any(|c| c.starts_with("list-keychains -d user -s")
                && c.contains("notarization.keychain-db")));
    }

    #[tokio::test]
    async fn destroy_removes_keychain_file() {
        let dir = tempfile::tempdir().unwrap();
        let (tool, log) = fake_security(dir.path());
        let keychain_file = dir.path().join("notarization.keychain-db");

        let keychain = Keychain::create_with_tools(
            keychain_file.clone(),
            Secret::new("test-password".to_string()),
            tool.clone(),
            tool,
        )
        .await
        .unwrap();

        keychain.destroy().await.unwrap();
        assert!(!keychain_file.exists());

        // Exactly one delete after the keychain file was created.
        let calls = invocations(&log);
        let created_at = calls
            .iter()
            .position(|c| c.starts_with("create-keychain"))
            .unwrap();
        let deletes_after_create = calls[created_at..]
            .iter()
            .filter(|c| c.starts_with("delete-keychain"))
            .count();
        assert_eq!(deletes_after_create, 1);
    }

    #[tokio::test]
    async fn destroy_still_runs_when_signing_step_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (tool, _log) = fake_security(dir.path());
        let keychain_file = dir.path().join("notarization.keychain-db");

        let keychain = Keychain::create_with_tools(
            keychain_file.clone(),
            Secret::new("test-password".to_string()),
            tool.clone(),
            tool,
        )
        .await
        .unwrap();

        // Mirror the pipeline shape: the failing stage result is held while
        // teardown runs, then propagated.
        let signing: Result<()> = Err(SigningError::SigningFailed {
            path: PathBuf::from("target/release/capstan"),
            reason: "simulated codesign failure".to_string(),
        });

        keychain.destroy().await.unwrap();
        assert!(!keychain_file.exists());
        assert!(signing.is_err());
    }

    #[tokio::test]
    async fn certificate_import_rejects_bad_base64() {
        let dir = tempfile::tempdir().unwrap();
        let (tool, _log) = fake_security(dir.path());
        let keychain_file = dir.path().join("notarization.keychain-db");

        let keychain = Keychain::create_with_tools(
            keychain_file,
            Secret::new("test-password".to_string()),
            tool.clone(),
            tool,
        )
        .await
        .unwrap();

        let err = keychain
            .import_certificate(
                &Secret::new("not!valid!base64".to_string()),
                &Secret::new("cert-password".to_string()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SigningError::CertificateDecode(_)));

        keychain.destroy().await.unwrap();
    }
}
