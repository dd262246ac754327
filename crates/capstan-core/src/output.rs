//! Stage outputs for the orchestrating workflow
//!
//! Each pipeline stage reports its results as `key=value` lines. When the
//! `GITHUB_OUTPUT` file is available the line is appended there so the
//! workflow can wire stage outputs together; otherwise it goes to stdout.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::artifact::Artifact;
use crate::error::Result;

/// Report a produced artifact and its content type as stage outputs.
pub fn emit_artifact(artifact: &Artifact, content_type: &str) -> Result<()> {
    debug!(kind = %artifact.kind, release = %artifact.release, "reporting artifact");
    emit("asset", &artifact.path.to_string_lossy())?;
    emit("content_type", content_type)
}

/// Emit a stage output for the surrounding workflow.
pub fn emit(name: &str, value: &str) -> Result<()> {
    if let Some(output_file) = std::env::var_os("GITHUB_OUTPUT") {
        write_output(Path::new(&output_file), name, value)?;
    } else {
        println!("{name}={value}");
    }

    debug!(name, value, "stage output");
    Ok(())
}

/// Append one `key=value` line to an output file.
pub fn write_output(path: &Path, name: &str, value: &str) -> Result<()> {
    let mut out = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(out, "{name}={value}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_output_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outputs");

        write_output(&path, "asset", "dist/capstan.dmg").unwrap();
        write_output(&path, "content_type", "application/x-apple-diskimage").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "asset=dist/capstan.dmg\ncontent_type=application/x-apple-diskimage\n"
        );
    }
}
