//! GPG signing stage

use std::path::PathBuf;

use clap::Args;
use console::style;

use capstan_core::{output, PipelineConfig, Secret};
use capstan_signing::GpgSigner;

use crate::cli::Cli;

/// Create and verify a detached GPG signature over an artifact
#[derive(Debug, Args)]
pub struct GpgSignCommand {
    /// Release name, used for the signature output directory
    #[arg(required = true)]
    pub release: String,

    /// Path to the artifact to sign
    #[arg(short, long)]
    pub artifact: PathBuf,

    /// Directory receiving the signature file
    #[arg(long, default_value = "dist")]
    pub dist_dir: PathBuf,
}

impl GpgSignCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, _cli: &Cli) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.artifact.is_file(),
            "artifact file {} does not exist",
            self.artifact.display()
        );

        let config = PipelineConfig::default();
        let passphrase = Secret::from_env("GPG_PASSPHRASE")?;

        let output_dir = self.dist_dir.join(&self.release);
        std::fs::create_dir_all(&output_dir)?;

        let signer = GpgSigner::new(&config);
        let signature = GpgSigner::signature_path(&self.artifact, &output_dir);

        signer
            .sign_detached(&self.artifact, &signature, &passphrase)
            .await?;
        // Self-verify against the pinned fingerprint before the signature
        // is treated as shippable.
        signer
            .verify(&self.artifact, &signature, &config.gpg_fingerprint)
            .await?;

        output::emit("signature", &signature.to_string_lossy())?;
        println!(
            "{} {}",
            style("Signed").green().bold(),
            signature.display()
        );
        Ok(())
    }
}
