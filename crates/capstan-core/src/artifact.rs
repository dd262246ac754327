//! Release artifacts

use std::fmt;
use std::path::PathBuf;

/// Semantic kind of a release artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// An executable produced by the build
    Binary,
    /// A documentation or license file shipped alongside the binaries
    Resource,
    /// A compressed download archive
    Archive,
    /// A disk image bundle for Apple distribution
    Bundle,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary => write!(f, "binary"),
            Self::Resource => write!(f, "resource"),
            Self::Archive => write!(f, "archive"),
            Self::Bundle => write!(f, "bundle"),
        }
    }
}

/// A file produced by the pipeline, identified by its path and the release
/// it belongs to. Immutable once produced.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub release: String,
}

impl Artifact {
    pub fn new(path: PathBuf, kind: ArtifactKind, release: impl Into<String>) -> Self {
        Self {
            path,
            kind,
            release: release.into(),
        }
    }

    /// File name under which the artifact appears on the release record.
    pub fn asset_name(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_name_is_the_file_name() {
        let artifact = Artifact::new(
            PathBuf::from("dist/capstan-nightly.dmg"),
            ArtifactKind::Bundle,
            "capstan-nightly",
        );
        assert_eq!(artifact.asset_name().as_deref(), Some("capstan-nightly.dmg"));
    }

    #[test]
    fn kinds_render_lowercase() {
        assert_eq!(ArtifactKind::Archive.to_string(), "archive");
        assert_eq!(ArtifactKind::Bundle.to_string(), "bundle");
    }
}
