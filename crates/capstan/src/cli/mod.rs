//! CLI definition and command handling

pub mod commands;

use clap::{Parser, Subcommand};

use commands::{
    GpgSignCommand, NotarizeCommand, PackageCommand, PublishCommand, UploadCommand,
};

/// Capstan - release signing and notarization pipeline
#[derive(Debug, Parser)]
#[command(name = "capstan")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available pipeline stages
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Codesign, bundle, and notarize macOS release binaries
    Notarize(NotarizeCommand),

    /// Stage and compress a release archive for one target
    Package(PackageCommand),

    /// Create and verify a detached GPG signature over an artifact
    GpgSign(GpgSignCommand),

    /// Attach a signed artifact to a release record
    Upload(UploadCommand),

    /// Publish a draft release once all required assets have landed
    Publish(PublishCommand),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> anyhow::Result<()> {
        match self.command {
            Commands::Notarize(ref cmd) => cmd.execute(&self),
            Commands::Package(ref cmd) => cmd.execute(&self),
            Commands::GpgSign(ref cmd) => cmd.execute(&self),
            Commands::Upload(ref cmd) => cmd.execute(&self),
            Commands::Publish(ref cmd) => cmd.execute(&self),
        }
    }
}
