//! Release archive stage

use std::path::PathBuf;

use clap::Args;
use console::style;

use capstan_bundle::{compress, stage, ArchiveFormat};
use capstan_core::{output, Artifact, ArtifactKind};

use crate::cli::Cli;

/// Stage and compress a release archive for one target
#[derive(Debug, Args)]
pub struct PackageCommand {
    /// Release name, used as the archive's top-level directory
    #[arg(required = true)]
    pub release: String,

    /// Target triple the archive is built for
    #[arg(long)]
    pub target: String,

    /// Path to a binary to include in the archive
    #[arg(short, long = "binary", required = true)]
    pub binaries: Vec<PathBuf>,

    /// Path to a resource file to include in the archive
    #[arg(short, long = "resource")]
    pub resources: Vec<PathBuf>,

    /// Directory receiving the staging directory and archive
    #[arg(long, default_value = "dist")]
    pub dist_dir: PathBuf,
}

impl PackageCommand {
    pub fn execute(&self, _cli: &Cli) -> anyhow::Result<()> {
        let format = ArchiveFormat::for_target(&self.target);

        let staging = stage(
            &self.dist_dir,
            &self.release,
            &self.binaries,
            &self.resources,
        )?;
        let archive = compress(&staging, format)?;

        let artifact = Artifact::new(archive.clone(), ArtifactKind::Archive, self.release.as_str());
        output::emit_artifact(&artifact, format.content_type())?;
        println!(
            "{} {}",
            style("Packaged").green().bold(),
            archive.display()
        );
        Ok(())
    }
}
