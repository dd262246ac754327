//! Staging directory assembly

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{BundleError, Result};

/// Assemble a fresh staging directory named `release_name` under
/// `dist_dir`, containing the binaries and resources in order.
///
/// Any pre-existing staging directory of the same name is removed first, so
/// re-running a job leaves exactly the current call's file set.
pub fn stage(
    dist_dir: &Path,
    release_name: &str,
    binaries: &[PathBuf],
    resources: &[PathBuf],
) -> Result<PathBuf> {
    let staging = dist_dir.join(release_name);

    match std::fs::remove_dir_all(&staging) {
        Ok(()) => debug!(path = %staging.display(), "removed stale staging directory"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }
    std::fs::create_dir_all(&staging)?;

    for file in binaries.iter().chain(resources) {
        if !file.is_file() {
            return Err(BundleError::MissingResource(file.clone()));
        }
        let name = file
            .file_name()
            .ok_or_else(|| BundleError::MissingResource(file.clone()))?;
        std::fs::copy(file, staging.join(name))?;
    }

    info!(
        path = %staging.display(),
        files = binaries.len() + resources.len(),
        "staged release files"
    );
    Ok(staging)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn stage_copies_binaries_and_resources() {
        let dir = tempfile::tempdir().unwrap();
        let binary = touch(dir.path(), "capstan", "binary");
        let readme = touch(dir.path(), "README.md", "readme");

        let staging = stage(
            dir.path(),
            "capstan-nightly",
            &[binary],
            &[readme],
        )
        .unwrap();

        assert!(staging.join("capstan").is_file());
        assert!(staging.join("README.md").is_file());
    }

    #[test]
    fn second_run_replaces_first_runs_file_set() {
        let dir = tempfile::tempdir().unwrap();
        let first = touch(dir.path(), "LICENSE", "license");
        let second = touch(dir.path(), "THIRDPARTY", "notices");

        stage(dir.path(), "capstan-nightly", &[], &[first]).unwrap();
        let staging = stage(dir.path(), "capstan-nightly", &[], &[second]).unwrap();

        assert!(!staging.join("LICENSE").exists());
        assert!(staging.join("THIRDPARTY").is_file());

        let entries: Vec<_> = std::fs::read_dir(&staging).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn missing_resource_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");

        let err = stage(dir.path(), "capstan-nightly", &[], &[missing.clone()]).unwrap_err();
        match err {
            BundleError::MissingResource(path) => assert_eq!(path, missing),
            other => panic!("expected MissingResource, got {other:?}"),
        }
    }
}
