//! Maps a resolved version onto the download location of its build.
//!
//! Release tags use a fixed asset URL template and need no API call. Branch
//! commits are looked up through the CI: the newest completed run of the build
//! workflow must have built exactly that commit, and its artifact named after
//! the platform key is the one to fetch.

use anyhow::{Context, Result};
use reqwest::Url;
use tracing::debug;

use super::github::{ReleaseSource, WorkflowRun};
use super::platform::Platform;
use super::version::VersionId;
use crate::config::UpstreamConfig;
use crate::errors::LauncherError;

/// A resolved download location and the version it was resolved for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    /// URL of the ZIP archive to download.
    pub url: String,
    /// Version the archive contains.
    pub version: VersionId,
}

/// Returns the release asset URL for `tag` on `platform`.
///
/// The tag is percent-encoded as a single path segment.
///
/// # Errors
///
/// Returns `Config` if the configured host does not form a valid URL.
pub fn release_asset_url(
    upstream: &UpstreamConfig,
    tag: &str,
    platform: Platform,
) -> Result<String, LauncherError> {
    let base = format!("https://{}/", upstream.host);
    let mut url = Url::parse(&base)
        .map_err(|e| LauncherError::config(format!("invalid release host {}: {e}", upstream.host)))?;
    let asset = format!(
        "{}-{}-{}.zip",
        upstream.artifact_prefix,
        platform.os(),
        platform.arch()
    );
    url.path_segments_mut()
        .map_err(|()| LauncherError::config(format!("invalid release host {}", upstream.host)))?
        .pop_if_empty()
        .extend([
            upstream.owner.as_str(),
            upstream.repo.as_str(),
            "releases",
            "download",
            tag,
            asset.as_str(),
        ]);
    Ok(url.into())
}

/// Locates the downloadable archive of `version` for `platform`.
///
/// # Errors
///
/// - `NotFound` if the branch has no completed runs, the newest run built a
///   different commit, or the run has no artifact for the platform
/// - `Network` / `Remote` from the underlying API calls
pub async fn locate<S: ReleaseSource + ?Sized>(
    source: &S,
    upstream: &UpstreamConfig,
    branch: &str,
    version: &VersionId,
    platform: Platform,
) -> Result<ArtifactRef> {
    if version.is_tag() {
        let url = release_asset_url(upstream, version.as_str(), platform)?;
        debug!(%version, %url, "using release asset");
        return Ok(ArtifactRef {
            url,
            version: version.clone(),
        });
    }

    let runs = source
        .workflow_runs(branch)
        .await
        .context("list build runs")?;
    let run = newest_run(runs).ok_or_else(|| {
        LauncherError::not_found(format!("no completed build runs for branch {branch}"))
    })?;

    if run.head_sha != version.as_str() {
        return Err(LauncherError::not_found(format!(
            "no build for commit {version} yet (latest run {} built {})",
            run.id, run.head_sha
        ))
        .into());
    }
    debug!(
        run_id = run.id,
        head_branch = run.head_branch.as_deref().unwrap_or(branch),
        created_at = %run.created_at,
        "selected build run"
    );

    let artifacts = source
        .run_artifacts(run.id)
        .await
        .context("list run artifacts")?;
    let artifact = artifacts
        .into_iter()
        .find(|a| a.name == platform.key())
        .ok_or_else(|| {
            LauncherError::not_found(format!(
                "no {platform} artifact in build run {} for commit {version}",
                run.id
            ))
        })?;
    debug!(
        name = %artifact.name,
        size = artifact.size_in_bytes,
        url = %artifact.archive_download_url,
        "selected artifact"
    );

    Ok(ArtifactRef {
        url: artifact.archive_download_url,
        version: version.clone(),
    })
}

/// Picks the most recently created run, regardless of the order given.
fn newest_run(mut runs: Vec<WorkflowRun>) -> Option<WorkflowRun> {
    runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    runs.into_iter().next()
}
