//! Release asset upload stage

use std::path::PathBuf;

use clap::Args;
use console::style;

use capstan_stores::ReleaseClient;

use crate::cli::Cli;

/// Attach a signed artifact to a release record
#[derive(Debug, Args)]
pub struct UploadCommand {
    /// Tag of the release the asset attaches to
    #[arg(required = true)]
    pub tag: String,

    /// Path to the asset to upload
    #[arg(long)]
    pub asset: PathBuf,

    /// Content type reported to the release host
    #[arg(long)]
    pub content_type: String,
}

impl UploadCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, _cli: &Cli) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.asset.is_file(),
            "asset file {} does not exist",
            self.asset.display()
        );

        let client = ReleaseClient::from_env()?;
        client
            .upload(&self.tag, &self.asset, &self.content_type)
            .await?;

        println!(
            "{} {} -> {}",
            style("Uploaded").green().bold(),
            self.asset.display(),
            self.tag
        );
        Ok(())
    }
}
