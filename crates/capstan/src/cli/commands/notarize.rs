//! macOS sign-and-notarize stage

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use console::style;
use tracing::{info, warn};
use uuid::Uuid;

use capstan_bundle::DiskImageBuilder;
use capstan_core::config::keychain_path;
use capstan_core::{output, Artifact, ArtifactKind, PipelineConfig, Secret};
use capstan_signing::{CodeSigner, Keychain};
use capstan_stores::Notarizer;

use crate::cli::Cli;

/// Content type of the disk image, reported to the release workflow.
const DISK_IMAGE_CONTENT_TYPE: &str = "application/x-apple-diskimage";

/// Keychain auto-lock timeout covering one pipeline run.
const KEYCHAIN_IDLE_TIMEOUT_SECS: u32 = 900;

/// Codesign, bundle, and notarize macOS release binaries
#[derive(Debug, Args)]
pub struct NotarizeCommand {
    /// Release name, used for the staging directory and disk image
    #[arg(required = true)]
    pub release: String,

    /// Path to a binary to codesign and include in the bundle
    #[arg(short, long = "binary", required = true)]
    pub binaries: Vec<PathBuf>,

    /// Path to a resource file to include in the bundle
    #[arg(short, long = "resource")]
    pub resources: Vec<PathBuf>,

    /// URL to a .icns file to use as the disk image volume icon
    #[arg(long)]
    pub dmg_icon_url: Option<String>,

    /// Directory receiving the staging directory and disk image
    #[arg(long, default_value = "dist")]
    pub dist_dir: PathBuf,
}

impl NotarizeCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<()> {
        for file in self.binaries.iter().chain(&self.resources) {
            anyhow::ensure!(
                file.is_file(),
                "input file {} does not exist",
                file.display()
            );
        }

        let config = PipelineConfig::default();

        // Read every secret before any keychain state exists, so a missing
        // secret cannot leave a half-provisioned keychain behind.
        let certificate = Secret::from_env("MACOS_CERTIFICATE")?;
        let certificate_password = Secret::from_env("MACOS_CERTIFICATE_PASSPHRASE")?;
        let app_password = Secret::from_env("MACOS_NOTARIZE_APP_PASSWORD")?;

        let keychain =
            Keychain::create(keychain_path(), Secret::new(Uuid::new_v4().to_string())).await?;

        // The signing stages run against a borrowed keychain; teardown
        // consumes it afterwards, on the failure path as well.
        let run = self
            .run_signed_pipeline(
                &config,
                &keychain,
                &certificate,
                &certificate_password,
                &app_password,
                cli.verbose,
            )
            .await;
        if let Err(err) = keychain.destroy().await {
            warn!(%err, "failed to delete keychain");
        }
        let bundle = run?;

        let artifact = Artifact::new(bundle.clone(), ArtifactKind::Bundle, self.release.as_str());
        output::emit_artifact(&artifact, DISK_IMAGE_CONTENT_TYPE)?;
        println!(
            "{} {}",
            style("Notarized").green().bold(),
            bundle.display()
        );
        Ok(())
    }

    /// Everything that needs the provisioned keychain: per-binary
    /// codesigning, bundling, notarization, stapling, and the final
    /// distributable checks.
    async fn run_signed_pipeline(
        &self,
        config: &PipelineConfig,
        keychain: &Keychain,
        certificate: &Secret,
        certificate_password: &Secret,
        app_password: &Secret,
        verbose: bool,
    ) -> anyhow::Result<PathBuf> {
        keychain.configure(KEYCHAIN_IDLE_TIMEOUT_SECS).await?;
        keychain.unlock().await?;
        keychain
            .import_credentials(
                &config.credentials_profile,
                &config.apple_id,
                app_password,
                &config.team_id,
            )
            .await?;
        keychain
            .import_certificate(certificate, certificate_password)
            .await?;
        keychain.grant_partition_list().await?;

        let signer = CodeSigner::new(config);
        for binary in &self.binaries {
            signer.sign(binary, keychain).await?;
            signer.verify(binary, false).await?;
        }

        let staging = capstan_bundle::stage(
            &self.dist_dir,
            &self.release,
            &self.binaries,
            &self.resources,
        )?;

        let dmg_builder = DiskImageBuilder::new(config);
        let dmg_path = self.dist_dir.join(format!("{}.dmg", self.release));
        let bundle = dmg_builder
            .build(&staging, &dmg_path, self.dmg_icon_url.as_deref())
            .await?;

        // The disk image itself is signed before submission.
        signer.sign(&bundle, keychain).await?;
        signer.verify(&bundle, false).await?;

        let notarizer = Notarizer::new(config, keychain.path());
        let submission_id = notarizer.submit_and_wait(&bundle).await?;
        match notarizer.fetch_log(&submission_id).await {
            Ok(log) => info!(submission_id = %submission_id, %log, "notarization log"),
            Err(err) => warn!(submission_id = %submission_id, %err, "could not fetch notarization log"),
        }

        notarizer.staple(&bundle).await?;
        notarizer.validate(&bundle).await?;

        // The stapled image's binaries must still pass strict verification,
        // ticket included.
        let mounted = dmg_builder.attach(&bundle, false).await?;
        let checks = self
            .verify_mounted_binaries(&signer, mounted.path(), verbose)
            .await;
        let detach = mounted.detach().await;
        checks?;
        detach?;

        Ok(bundle)
    }

    async fn verify_mounted_binaries(
        &self,
        signer: &CodeSigner,
        mount: &Path,
        verbose: bool,
    ) -> anyhow::Result<()> {
        for binary in &self.binaries {
            let name = binary
                .file_name()
                .context("binary path has no file name")?;
            let mounted_binary = mount.join(name);

            signer.verify(&mounted_binary, true).await?;
            let details = signer.display(&mounted_binary, true).await?;
            if verbose {
                println!("{details}");
            }
            info!(binary = %mounted_binary.display(), "signature verified with ticket");
        }
        Ok(())
    }
}
