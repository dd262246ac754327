//! Platform download archives

use std::fs::File;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::info;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{BundleError, Result};

/// Download archive container for one target platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// `.zip`, used for Windows targets
    Zip,
    /// `.tar.gz`, used everywhere else
    TarGz,
}

impl ArchiveFormat {
    /// Pick the archive format for a target triple.
    pub fn for_target(target: &str) -> Self {
        if target.contains("windows") {
            Self::Zip
        } else {
            Self::TarGz
        }
    }

    /// File extension without a leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
        }
    }

    /// Content type reported to the release host.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Zip => "application/zip",
            Self::TarGz => "application/gzip",
        }
    }
}

/// Compress a staging directory into a sibling archive.
///
/// The archive's top-level entry is the staging directory itself, so
/// extraction reproduces `<release_name>/<files>`.
pub fn compress(staging_dir: &Path, format: ArchiveFormat) -> Result<PathBuf> {
    let dir_name = staging_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| BundleError::ArchiveFailed {
            path: staging_dir.to_path_buf(),
            reason: "staging directory has no name".to_string(),
        })?;

    let archive_path = staging_dir.with_file_name(format!("{dir_name}.{}", format.extension()));

    match format {
        ArchiveFormat::Zip => write_zip(staging_dir, &dir_name, &archive_path)?,
        ArchiveFormat::TarGz => write_tar_gz(staging_dir, &dir_name, &archive_path)?,
    }

    info!(archive = %archive_path.display(), "created release archive");
    Ok(archive_path)
}

fn write_tar_gz(staging_dir: &Path, dir_name: &str, archive_path: &Path) -> Result<()> {
    let file = File::create(archive_path)?;
    let encoder = GzEncoder::new(file, Compression::best());
    let mut builder = tar::Builder::new(encoder);

    builder.append_dir_all(dir_name, staging_dir)?;
    builder.into_inner()?.finish()?;
    Ok(())
}

fn write_zip(staging_dir: &Path, dir_name: &str, archive_path: &Path) -> Result<()> {
    let file = File::create(archive_path)?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    writer.add_directory(format!("{dir_name}/"), options)?;

    for entry in WalkDir::new(staging_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(staging_dir)
            .map_err(|err| BundleError::ArchiveFailed {
                path: entry.path().to_path_buf(),
                reason: err.to_string(),
            })?;
        let name = std::iter::once(dir_name.to_string())
            .chain(
                relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().to_string()),
            )
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            writer.add_directory(format!("{name}/"), options)?;
            continue;
        }

        let mut file_options = options;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = entry.metadata().map_err(std::io::Error::from)?;
            file_options = file_options.unix_permissions(metadata.permissions().mode());
        }

        writer.start_file(name, file_options)?;
        let mut source = File::open(entry.path())?;
        std::io::copy(&mut source, &mut writer)?;
    }

    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staging_fixture(dir: &Path) -> PathBuf {
        let staging = dir.join("capstan-nightly");
        std::fs::create_dir_all(staging.join("docs")).unwrap();
        std::fs::write(staging.join("capstan"), b"#!binary").unwrap();
        std::fs::write(staging.join("README.md"), b"readme").unwrap();
        std::fs::write(staging.join("docs").join("LICENSE"), b"license").unwrap();
        staging
    }

    #[test]
    fn windows_targets_get_zip() {
        assert_eq!(
            ArchiveFormat::for_target("x86_64-pc-windows-msvc"),
            ArchiveFormat::Zip
        );
        assert_eq!(
            ArchiveFormat::for_target("aarch64-apple-darwin"),
            ArchiveFormat::TarGz
        );
        assert_eq!(
            ArchiveFormat::for_target("x86_64-unknown-linux-gnu"),
            ArchiveFormat::TarGz
        );
    }

    #[test]
    fn zip_preserves_top_level_directory() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staging_fixture(dir.path());

        let archive = compress(&staging, ArchiveFormat::Zip).unwrap();
        assert!(archive.to_string_lossy().ends_with("capstan-nightly.zip"));

        let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.iter().all(|n| n.starts_with("capstan-nightly/")));
        assert!(names.contains(&"capstan-nightly/README.md".to_string()));
        assert!(names.contains(&"capstan-nightly/docs/LICENSE".to_string()));
    }

    #[test]
    fn tar_gz_preserves_top_level_directory() {
        let dir = tempfile::tempdir().unwrap();
        let staging = staging_fixture(dir.path());

        let archive = compress(&staging, ArchiveFormat::TarGz).unwrap();
        assert!(archive.to_string_lossy().ends_with("capstan-nightly.tar.gz"));

        let decoder = flate2::read::GzDecoder::new(File::open(&archive).unwrap());
        let mut tar = tar::Archive::new(decoder);
        let paths: Vec<PathBuf> = tar
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().into_owned())
            .collect();

        assert!(!paths.is_empty());
        assert!(paths
            .iter()
            .all(|p| p.starts_with("capstan-nightly")));
        assert!(paths.contains(&PathBuf::from("capstan-nightly/capstan")));
    }

    #[test]
    fn content_types_match_format() {
        assert_eq!(ArchiveFormat::Zip.content_type(), "application/zip");
        assert_eq!(ArchiveFormat::TarGz.content_type(), "application/gzip");
    }
}
