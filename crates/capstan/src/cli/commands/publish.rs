//! Release publish stage

use clap::Args;
use console::style;

use capstan_stores::ReleaseClient;

use crate::cli::Cli;

/// Publish a draft release once all required assets have landed
#[derive(Debug, Args)]
pub struct PublishCommand {
    /// Tag of the release to publish
    #[arg(required = true)]
    pub tag: String,

    /// Asset name that must be present before publishing (repeatable)
    #[arg(long = "require", required = true)]
    pub required: Vec<String>,
}

impl PublishCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, _cli: &Cli) -> anyhow::Result<()> {
        let client = ReleaseClient::from_env()?;
        client.publish(&self.tag, &self.required).await?;

        println!("{} {}", style("Published").green().bold(), self.tag);
        Ok(())
    }
}
