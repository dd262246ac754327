//! Disk image assembly
//!
//! Builds the compressed, read-only UDZO disk image submitted to the
//! notarization service and shipped to users. The image is first created
//! read-write so the volume icon can be set, then shrunk to fit and
//! converted.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use capstan_core::PipelineConfig;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{BundleError, Result};

const DEFAULT_HDIUTIL_PATH: &str = "/usr/bin/hdiutil";
const DEFAULT_SETFILE_PATH: &str = "/usr/bin/SetFile";
const DEFAULT_DU_PATH: &str = "/usr/bin/du";

/// Builds distribution disk images for one release.
pub struct DiskImageBuilder {
    hdiutil_path: String,
    setfile_path: String,
    du_path: String,
    volume_name: String,
}

/// An attached disk image; detach before the image is converted or
/// submitted.
pub struct MountedImage {
    mount_path: PathBuf,
    hdiutil_path: String,
}

impl MountedImage {
    /// Mount point of the attached volume.
    pub fn path(&self) -> &Path {
        &self.mount_path
    }

    /// Detach the volume.
    pub async fn detach(self) -> Result<()> {
        let mount_arg = self.mount_path.to_string_lossy().to_string();
        run_tool(&self.hdiutil_path, "hdiutil", &["detach", &mount_arg]).await?;
        debug!(mount = %self.mount_path.display(), "detached disk image");
        Ok(())
    }
}

impl DiskImageBuilder {
    /// Create a builder using the pipeline's volume name.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            hdiutil_path: DEFAULT_HDIUTIL_PATH.to_string(),
            setfile_path: DEFAULT_SETFILE_PATH.to_string(),
            du_path: DEFAULT_DU_PATH.to_string(),
            volume_name: config.volume_name.clone(),
        }
    }

    /// Produce a compressed, read-only disk image of `staging_dir` at
    /// `output`, overwriting any existing image.
    ///
    /// `notarytool submit` accepts UDIF disk images, signed flat installer
    /// packages, and zip files; a read-write image is created first so an
    /// optional volume icon can be installed, then converted to
    /// zlib-compressed UDZO.
    pub async fn build(
        &self,
        staging_dir: &Path,
        output: &Path,
        icon_url: Option<&str>,
    ) -> Result<PathBuf> {
        let writable = writable_image_path(output);

        match std::fs::remove_file(output) {
            Ok(()) => debug!(path = %output.display(), "removed stale disk image"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let staging_arg = staging_dir.to_string_lossy().to_string();
        let writable_arg = writable.to_string_lossy().to_string();
        run_tool(
            &self.hdiutil_path,
            "hdiutil",
            &[
                "create",
                "-volname",
                &self.volume_name,
                "-srcfolder",
                &staging_arg,
                "-ov",
                "-format",
                "UDRW",
                "-verbose",
                &writable_arg,
            ],
        )
        .await?;
        info!(image = %writable.display(), "created writable disk image");

        if let Some(url) = icon_url {
            let mounted = self.attach(&writable, true).await?;
            let icon_result = self.set_volume_icon(mounted.path(), url).await;
            let detach_result = mounted.detach().await;
            icon_result?;
            detach_result?;
        }

        let size_mb = self.image_size_mb(&writable).await?;
        let size_arg = format!("{size_mb}m");
        run_tool(
            &self.hdiutil_path,
            "hdiutil",
            &["resize", "-size", &size_arg, &writable_arg],
        )
        .await?;
        debug!(size_mb, "shrunk disk image to fit");

        let output_arg = output.to_string_lossy().to_string();
        run_tool(
            &self.hdiutil_path,
            "hdiutil",
            &[
                "convert",
                &writable_arg,
                "-format",
                "UDZO",
                "-imagekey",
                "zlib-level=9",
                "-o",
                &output_arg,
            ],
        )
        .await?;
        std::fs::remove_file(&writable)?;

        info!(image = %output.display(), "created compressed disk image");
        Ok(output.to_path_buf())
    }

    /// Attach a disk image and return its mount guard.
    pub async fn attach(&self, image: &Path, readwrite: bool) -> Result<MountedImage> {
        let image_arg = image.to_string_lossy().to_string();
        let mut args = vec!["attach"];
        if readwrite {
            args.extend(["-readwrite", "-noverify", "-noautoopen"]);
        }
        args.push(&image_arg);

        run_tool(&self.hdiutil_path, "hdiutil", &args).await?;

        let mount_path = Path::new("/Volumes").join(&self.volume_name);
        debug!(mount = %mount_path.display(), "attached disk image");
        Ok(MountedImage {
            mount_path,
            hdiutil_path: self.hdiutil_path.clone(),
        })
    }

    /// Install a volume icon fetched from `url` onto the mounted volume.
    ///
    /// Only `https` URLs are accepted; anything else is skipped rather than
    /// failing the build, matching the icon's cosmetic role.
    async fn set_volume_icon(&self, mount: &Path, url: &str) -> Result<()> {
        let parsed = match url::Url::parse(url) {
            Ok(parsed) if parsed.scheme() == "https" => parsed,
            Ok(_) | Err(_) => {
                warn!(url, "skipping invalid volume icon URL");
                return Ok(());
            }
        };

        info!(%parsed, "fetching volume icon");
        let icon_bytes = reqwest::get(parsed).await?.error_for_status()?.bytes().await?;

        let icns = mount.join(".VolumeIcon.icns");
        tokio::fs::write(&icns, &icon_bytes).await?;

        let icns_arg = icns.to_string_lossy().to_string();
        let mount_arg = mount.to_string_lossy().to_string();
        run_tool(&self.setfile_path, "SetFile", &["-c", "icnC", &icns_arg]).await?;
        // Mark the volume root as having a custom icon.
        run_tool(&self.setfile_path, "SetFile", &["-a", "C", &mount_arg]).await?;

        debug!(mount = %mount.display(), "volume icon installed");
        Ok(())
    }

    /// Size of the image contents in megabytes, with headroom for the
    /// resize.
    async fn image_size_mb(&self, image: &Path) -> Result<u64> {
        let image_arg = image.to_string_lossy().to_string();
        let stdout = run_tool(&self.du_path, "du", &["-B", "512", "-s", &image_arg]).await?;

        let blocks = parse_du_blocks(&stdout).ok_or_else(|| BundleError::ToolFailed {
            tool: "du".to_string(),
            reason: format!("unparseable output: {stdout}"),
        })?;
        Ok(blocks_to_mb(blocks))
    }
}

/// Writable scratch image path next to the final image:
/// `name.dmg` -> `name-temp.dmg`.
fn writable_image_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "image".to_string());
    output.with_file_name(format!("{stem}-temp.dmg"))
}

fn parse_du_blocks(stdout: &str) -> Option<u64> {
    stdout.split_whitespace().next()?.parse().ok()
}

fn blocks_to_mb(blocks_512: u64) -> u64 {
    (blocks_512 * 512 / 1000 / 1000) + 1
}

async fn run_tool(path: &str, tool: &str, args: &[&str]) -> Result<String> {
    debug!(tool, ?args, "running bundle tool");

    let output = Command::new(path)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if !output.status.success() {
        return Err(BundleError::ToolFailed {
            tool: tool.to_string(),
            reason: if stderr.is_empty() { stdout } else { stderr },
        });
    }

    Ok(stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writable_image_sits_next_to_final_image() {
        let writable = writable_image_path(Path::new("dist/capstan-nightly.dmg"));
        assert_eq!(writable, Path::new("dist/capstan-nightly-temp.dmg"));
    }

    #[test]
    fn du_output_parses_to_megabytes() {
        // `du -B 512 -s` output: "<blocks>\t<path>"
        let blocks = parse_du_blocks("16384\t/tmp/capstan-temp.dmg\n").unwrap();
        assert_eq!(blocks, 16384);
        // 16384 * 512 bytes = ~8.4 MB, plus one for headroom
        assert_eq!(blocks_to_mb(blocks), 9);
    }

    #[test]
    fn unparseable_du_output_is_none() {
        assert!(parse_du_blocks("").is_none());
        assert!(parse_du_blocks("not-a-number /tmp/x.dmg").is_none());
    }
}
