//! GitHub release asset publishing
//!
//! Uploads signed artifacts to a release record and flips the record from
//! draft to public once every per-target job has delivered its assets.
//! Uploads are idempotent by asset name: a same-named asset is replaced,
//! never duplicated, so re-running a job for a tag is safe.

use std::path::Path;

use capstan_core::Secret;
use reqwest::header;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Result, StoreError};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "capstan-release-pipeline";

/// A release record on the host.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub id: u64,
    pub tag_name: String,
    pub draft: bool,
    pub upload_url: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// A named asset attached to a release.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub id: u64,
    pub name: String,
}

/// How an upload proceeds for a given asset name.
#[derive(Debug, PartialEq, Eq)]
enum UploadPlan {
    /// No asset of this name exists yet.
    Create,
    /// A prior asset of this name must be deleted first.
    Replace { asset_id: u64 },
}

/// Client for the release host's REST API.
pub struct ReleaseClient {
    client: reqwest::Client,
    api_base: String,
    repository: String,
    token: Secret,
}

impl ReleaseClient {
    /// Create a client for `owner/name` authenticated with `token`.
    pub fn new(repository: String, token: Secret) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            repository,
            token,
        })
    }

    /// Create a client from `GITHUB_REPOSITORY` and `GITHUB_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let repository = std::env::var("GITHUB_REPOSITORY")
            .map_err(|_| StoreError::ConfigurationError("GITHUB_REPOSITORY not set".to_string()))?;
        let token = Secret::from_env("GITHUB_TOKEN")
            .map_err(|err| StoreError::ConfigurationError(err.to_string()))?;
        Self::new(repository, token)
    }

    /// Override the API base URL.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Attach `asset` to the release for `tag`, replacing any existing
    /// asset with the same file name.
    pub async fn upload(&self, tag: &str, asset: &Path, content_type: &str) -> Result<()> {
        let name = asset
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| StoreError::InvalidArtifact(asset.display().to_string()))?;

        let release = self.find_release(tag).await?;
        if let UploadPlan::Replace { asset_id } = plan_upload(&release, &name) {
            info!(%name, "replacing existing release asset");
            self.delete_asset(asset_id).await?;
        }

        let bytes = tokio::fs::read(asset).await?;
        let response = self
            .client
            .post(upload_url(&release.upload_url))
            .query(&[("name", name.as_str())])
            .bearer_auth(self.token.expose())
            .header(header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        ensure_success(response, "asset upload").await?;

        info!(tag, %name, content_type, "uploaded release asset");
        Ok(())
    }

    /// Flip the release for `tag` from draft to public, once every
    /// required asset name is present.
    ///
    /// Publishing with assets still missing is refused; an already-public
    /// release is left untouched so re-runs stay safe.
    pub async fn publish(&self, tag: &str, required_assets: &[String]) -> Result<()> {
        let release = self.find_release(tag).await?;

        let missing = missing_assets(&release, required_assets);
        if !missing.is_empty() {
            return Err(StoreError::PublishBarrier {
                tag: tag.to_string(),
                missing,
            });
        }

        if !release.draft {
            info!(tag, "release is already public");
            return Ok(());
        }

        let url = format!(
            "{}/repos/{}/releases/{}",
            self.api_base, self.repository, release.id
        );
        let response = self
            .client
            .patch(url)
            .bearer_auth(self.token.expose())
            .json(&serde_json::json!({ "draft": false }))
            .send()
            .await?;
        ensure_success(response, "release publish").await?;

        info!(tag, "published release");
        Ok(())
    }

    /// Look up the release for `tag`, drafts included.
    ///
    /// The by-tag endpoint only returns published releases, so this lists
    /// and filters instead.
    async fn find_release(&self, tag: &str) -> Result<Release> {
        let url = format!(
            "{}/repos/{}/releases?per_page=100",
            self.api_base, self.repository
        );
        let response = self
            .client
            .get(url)
            .bearer_auth(self.token.expose())
            .send()
            .await?;
        let response = ensure_success(response, "release lookup").await?;

        let releases: Vec<Release> = response.json().await?;
        debug!(tag, candidates = releases.len(), "resolved release list");

        releases
            .into_iter()
            .find(|release| release.tag_name == tag)
            .ok_or_else(|| StoreError::ReleaseNotFound(tag.to_string()))
    }

    async fn delete_asset(&self, asset_id: u64) -> Result<()> {
        let url = format!(
            "{}/repos/{}/releases/assets/{}",
            self.api_base, self.repository, asset_id
        );
        let response = self
            .client
            .delete(url)
            .bearer_auth(self.token.expose())
            .send()
            .await?;
        ensure_success(response, "asset delete").await?;
        Ok(())
    }
}

/// Decide whether an upload creates or replaces the named asset.
fn plan_upload(release: &Release, asset_name: &str) -> UploadPlan {
    match release.assets.iter().find(|asset| asset.name == asset_name) {
        Some(existing) => UploadPlan::Replace {
            asset_id: existing.id,
        },
        None => UploadPlan::Create,
    }
}

/// Required asset names not yet attached to the release.
fn missing_assets(release: &Release, required: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|name| !release.assets.iter().any(|asset| &asset.name == *name))
        .cloned()
        .collect()
}

/// Strip the `{?name,label}` URI-template suffix from an upload URL.
fn upload_url(template: &str) -> String {
    template
        .split('{')
        .next()
        .unwrap_or(template)
        .to_string()
}

async fn ensure_success(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(StoreError::ApiError {
        status: status.as_u16(),
        message: format!("{action}: {message}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(assets: &[(u64, &str)], draft: bool) -> Release {
        Release {
            id: 42,
            tag_name: "nightly-2026-08-07".to_string(),
            draft,
            upload_url:
                "https://uploads.example.com/repos/capstan/capstan/releases/42/assets{?name,label}"
                    .to_string(),
            assets: assets
                .iter()
                .map(|(id, name)| ReleaseAsset {
                    id: *id,
                    name: name.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn fresh_asset_name_is_created() {
        let release = release(&[], true);
        assert_eq!(
            plan_upload(&release, "capstan-nightly.tar.gz"),
            UploadPlan::Create
        );
    }

    #[test]
    fn same_name_upload_replaces_rather_than_duplicates() {
        let release = release(&[(7, "capstan-nightly.tar.gz")], true);
        assert_eq!(
            plan_upload(&release, "capstan-nightly.tar.gz"),
            UploadPlan::Replace { asset_id: 7 }
        );
    }

    #[test]
    fn barrier_reports_missing_assets() {
        let required = vec![
            "capstan-nightly-x86_64.dmg".to_string(),
            "capstan-nightly-aarch64.dmg".to_string(),
            "capstan-nightly.tar.gz".to_string(),
        ];
        let release = release(
            &[
                (1, "capstan-nightly-x86_64.dmg"),
                (2, "capstan-nightly.tar.gz"),
            ],
            true,
        );

        let missing = missing_assets(&release, &required);
        assert_eq!(missing, vec!["capstan-nightly-aarch64.dmg".to_string()]);
    }

    #[test]
    fn barrier_clears_when_all_assets_landed() {
        let required = vec![
            "capstan-nightly-x86_64.dmg".to_string(),
            "capstan-nightly-aarch64.dmg".to_string(),
            "capstan-nightly.tar.gz".to_string(),
        ];
        let release = release(
            &[
                (1, "capstan-nightly-x86_64.dmg"),
                (2, "capstan-nightly-aarch64.dmg"),
                (3, "capstan-nightly.tar.gz"),
            ],
            true,
        );

        assert!(missing_assets(&release, &required).is_empty());
    }

    #[test]
    fn upload_url_drops_uri_template() {
        let release = release(&[], true);
        assert_eq!(
            upload_url(&release.upload_url),
            "https://uploads.example.com/repos/capstan/capstan/releases/42/assets"
        );
    }
}
