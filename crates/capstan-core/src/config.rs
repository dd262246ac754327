//! Pipeline identity configuration

use std::path::PathBuf;

/// Fixed identity constants for one release pipeline.
///
/// Components receive a borrowed `PipelineConfig` instead of reading ambient
/// globals, so tests can substitute fake identities.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Fingerprint of the GPG key used for detached release signatures.
    pub gpg_fingerprint: String,

    /// Developer ID Application identity used by codesign.
    pub codesign_identity: String,

    /// Apple ID that owns the codesigning identity.
    pub apple_id: String,

    /// Team ID belonging to the codesigning identity.
    pub team_id: String,

    /// Name of the notarytool credentials profile stored in the build
    /// keychain.
    pub credentials_profile: String,

    /// Volume name for the distribution disk image.
    pub volume_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            gpg_fingerprint: "3F0B6C8A9D41E27586CC01D4B95A2E71D0C3F8A4".to_string(),
            codesign_identity: "Developer ID Application: Capstan Project (KX47PQJ3T8)".to_string(),
            apple_id: "apple-codesign@capstanruntime.org".to_string(),
            team_id: "KX47PQJ3T8".to_string(),
            credentials_profile: "capstan-apple-codesign-notarize".to_string(),
            volume_name: "Capstan nightly".to_string(),
        }
    }
}

/// Absolute path to the ephemeral keychain for one pipeline run.
///
/// On CI runners this lives in `RUNNER_TEMP`, a directory emptied at the
/// start and end of each job. Elsewhere it resolves against the working
/// directory.
pub fn keychain_path() -> PathBuf {
    if let Some(runner_temp) = std::env::var_os("RUNNER_TEMP") {
        return PathBuf::from(runner_temp).join("notarization.keychain-db");
    }

    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("notarization.keychain-db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_identity_constants_are_consistent() {
        let config = PipelineConfig::default();
        assert!(config.codesign_identity.contains(&config.team_id));
        assert_eq!(config.gpg_fingerprint.len(), 40);
        assert!(config.gpg_fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn keychain_path_is_absolute_under_runner_temp() {
        // RUNNER_TEMP is consulted first when present; the filename is fixed.
        assert!(keychain_path().ends_with("notarization.keychain-db"));
    }
}
