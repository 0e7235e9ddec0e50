//! Remote source of launcher builds.
//!
//! [`ReleaseSource`] is everything the materialization core needs from the
//! outside world: a branch head, the build runs of a branch, the artifacts of a
//! run, and a way to download a URL to a file. [`GithubClient`] implements it
//! against the GitHub REST API.
//!
//! ## Endpoints
//!
//! - `GET /repos/<owner>/<repo>/commits/<branch>` → `{ "sha": ... }`
//! - `GET /repos/<owner>/<repo>/actions/workflows/<workflow>/runs?branch=<branch>&status=completed`
//! - `GET /repos/<owner>/<repo>/actions/runs/<id>/artifacts`
//!
//! Non-success API responses carry a JSON body with a `message` field, which
//! is surfaced verbatim in the resulting error.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::download::download_to_file;
use crate::config::UpstreamConfig;
use crate::errors::LauncherError;

/// User-Agent header for HTTP requests.
const USER_AGENT: &str = concat!("bootstrap-launcher/", env!("CARGO_PKG_VERSION"));

/// Media type requested from the REST API.
const API_MEDIA_TYPE: &str = "application/vnd.github.v3+json";

/// Downloads may take this many times longer than an API call.
const DOWNLOAD_TIMEOUT_FACTOR: u32 = 10;

/// A completed CI build run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkflowRun {
    /// Run identifier used to list its artifacts.
    pub id: u64,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
    /// Branch the run was triggered for.
    #[serde(default)]
    pub head_branch: Option<String>,
    /// Commit the run built.
    pub head_sha: String,
}

/// A build artifact attached to a run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Artifact {
    /// Artifact name; launcher builds are named by platform key.
    pub name: String,
    /// Archive size as reported by the API.
    #[serde(default)]
    pub size_in_bytes: u64,
    /// URL of the zipped artifact.
    pub archive_download_url: String,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct WorkflowRunList {
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Deserialize)]
struct ArtifactList {
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    artifacts: Vec<Artifact>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Everything the core asks of the remote.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Returns the head commit of `branch`.
    ///
    /// Fails with `NotFound` when the branch does not exist upstream.
    async fn head_commit(&self, branch: &str) -> Result<String>;

    /// Returns completed build runs of `branch`, in whatever order the remote
    /// reports them.
    async fn workflow_runs(&self, branch: &str) -> Result<Vec<WorkflowRun>>;

    /// Returns the artifacts attached to run `run_id`.
    async fn run_artifacts(&self, run_id: u64) -> Result<Vec<Artifact>>;

    /// Downloads `url` to `dest`, returning the number of bytes written.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// GitHub REST API client.
#[derive(Debug, Clone)]
pub struct GithubClient {
    api: reqwest::Client,
    downloads: reqwest::Client,
    api_url: String,
    owner: String,
    repo: String,
    workflow: String,
    access_token: Option<String>,
}

impl GithubClient {
    /// Creates a client for the configured upstream repository.
    ///
    /// `timeout` bounds each API request; downloads get a proportionally
    /// longer budget. An empty access token is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the HTTP client cannot be built.
    pub fn new(
        upstream: &UpstreamConfig,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api = build_client(timeout)?;
        let downloads = build_client(timeout.saturating_mul(DOWNLOAD_TIMEOUT_FACTOR))?;

        Ok(Self {
            api,
            downloads,
            api_url: upstream.api_url.trim_end_matches('/').to_string(),
            owner: upstream.owner.clone(),
            repo: upstream.repo.clone(),
            workflow: upstream.workflow.clone(),
            access_token: access_token.filter(|t| !t.trim().is_empty()),
        })
    }

    /// Builds `<api>/repos/<owner>/<repo>/<segments...>`, percent-encoding
    /// each segment.
    ///
    /// A segment containing `/` is split on it, so `feature/x` stays a
    /// two-level path while `#`, `?` and `%` never leave the path.
    fn repo_url(&self, segments: &[&str]) -> Result<Url, LauncherError> {
        let mut url = Url::parse(&self.api_url).map_err(|e| {
            LauncherError::config(format!("invalid API URL {}: {e}", self.api_url))
        })?;
        url.path_segments_mut()
            .map_err(|()| LauncherError::config(format!("invalid API URL {}", self.api_url)))?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.repo.as_str()])
            .extend(segments.iter().flat_map(|s| s.split('/')));
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.header(AUTHORIZATION, format!("token {token}")),
            None => request,
        }
    }

    /// Performs an API GET and decodes a successful JSON body.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, LauncherError> {
        debug!(%url, "GET");
        let request = self.authorize(self.api.get(url.clone()).header(ACCEPT, API_MEDIA_TYPE));

        let response = request
            .send()
            .await
            .map_err(|e| LauncherError::network(format!("GET {url}"), e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LauncherError::network(format!("read response from {url}"), e))?;

        if !status.is_success() {
            return Err(LauncherError::remote(status.as_u16(), api_error_message(&body)));
        }

        serde_json::from_str(&body)
            .map_err(|e| LauncherError::network(format!("unexpected response body from {url}"), e))
    }
}

/// Extracts the upstream `message` from an error body, falling back to the raw text.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| LauncherError::config(format!("failed to create HTTP client: {e}")).into())
}

#[async_trait]
impl ReleaseSource for GithubClient {
    async fn head_commit(&self, branch: &str) -> Result<String> {
        let url = self.repo_url(&["commits", branch])?;

        match self.get_json::<CommitResponse>(url).await {
            Ok(commit) => Ok(commit.sha),
            Err(LauncherError::Remote {
                status: 404 | 422,
                message,
            }) => Err(LauncherError::not_found(format!("branch {branch}: {message}")).into()),
            Err(e) => Err(e.into()),
        }
    }

    async fn workflow_runs(&self, branch: &str) -> Result<Vec<WorkflowRun>> {
        let mut url = self.repo_url(&["actions", "workflows", self.workflow.as_str(), "runs"])?;
        url.query_pairs_mut()
            .append_pair("branch", branch)
            .append_pair("status", "completed");

        let list: WorkflowRunList = self.get_json(url).await?;
        debug!(branch, total = list.total_count, "listed workflow runs");
        Ok(list.workflow_runs)
    }

    async fn run_artifacts(&self, run_id: u64) -> Result<Vec<Artifact>> {
        let run_id = run_id.to_string();
        let url = self.repo_url(&["actions", "runs", run_id.as_str(), "artifacts"])?;

        let list: ArtifactList = self.get_json(url).await?;
        debug!(run_id, total = list.total_count, "listed run artifacts");
        Ok(list.artifacts)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let request = self.authorize(self.downloads.get(url));
        download_to_file(request, url, dest).await
    }
}

#[cfg(test)]
pub mod fake {
    //! In-memory [`ReleaseSource`] with call counters.

    use std::collections::HashMap;
    use std::io::Write;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::{Artifact, ReleaseSource, WorkflowRun};
    use crate::errors::LauncherError;

    #[derive(Default)]
    pub struct FakeSource {
        heads: HashMap<String, String>,
        runs: HashMap<String, Vec<WorkflowRun>>,
        artifacts: HashMap<u64, Vec<Artifact>>,
        payloads: HashMap<String, Vec<u8>>,
        head_commit_calls: AtomicUsize,
        workflow_runs_calls: AtomicUsize,
        run_artifacts_calls: AtomicUsize,
        downloads: Mutex<Vec<String>>,
    }

    impl FakeSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_head(mut self, branch: &str, sha: &str) -> Self {
            self.heads.insert(branch.to_string(), sha.to_string());
            self
        }

        pub fn with_run(mut self, branch: &str, id: u64, created_at: &str, sha: &str) -> Self {
            let created_at: DateTime<Utc> = created_at.parse().expect("Should parse timestamp");
            self.runs
                .entry(branch.to_string())
                .or_default()
                .push(WorkflowRun {
                    id,
                    created_at,
                    head_branch: Some(branch.to_string()),
                    head_sha: sha.to_string(),
                });
            self
        }

        pub fn with_artifact(mut self, run_id: u64, name: &str, url: &str) -> Self {
            self.artifacts.entry(run_id).or_default().push(Artifact {
                name: name.to_string(),
                size_in_bytes: 0,
                archive_download_url: url.to_string(),
            });
            self
        }

        pub fn with_payload(mut self, url: &str, bytes: Vec<u8>) -> Self {
            self.payloads.insert(url.to_string(), bytes);
            self
        }

        pub fn head_commit_calls(&self) -> usize {
            self.head_commit_calls.load(Ordering::SeqCst)
        }

        pub fn workflow_runs_calls(&self) -> usize {
            self.workflow_runs_calls.load(Ordering::SeqCst)
        }

        pub fn run_artifacts_calls(&self) -> usize {
            self.run_artifacts_calls.load(Ordering::SeqCst)
        }

        pub fn downloaded_urls(&self) -> Vec<String> {
            self.downloads.lock().expect("Should lock").clone()
        }
    }

    #[async_trait]
    impl ReleaseSource for FakeSource {
        async fn head_commit(&self, branch: &str) -> Result<String> {
            self.head_commit_calls.fetch_add(1, Ordering::SeqCst);
            self.heads
                .get(branch)
                .cloned()
                .ok_or_else(|| LauncherError::not_found(format!("branch {branch}")).into())
        }

        async fn workflow_runs(&self, branch: &str) -> Result<Vec<WorkflowRun>> {
            self.workflow_runs_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.runs.get(branch).cloned().unwrap_or_default())
        }

        async fn run_artifacts(&self, run_id: u64) -> Result<Vec<Artifact>> {
            self.run_artifacts_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.artifacts.get(&run_id).cloned().unwrap_or_default())
        }

        async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
            self.downloads
                .lock()
                .expect("Should lock")
                .push(url.to_string());
            let bytes = self
                .payloads
                .get(url)
                .ok_or_else(|| LauncherError::http(404, "Not Found"))?;
            std::fs::write(dest, bytes)
                .map_err(|e| LauncherError::io(format!("write {}", dest.display()), e))?;
            Ok(bytes.len() as u64)
        }
    }

    /// Builds a ZIP archive in memory from `(path, contents, unix mode)` entries.
    pub fn zip_bytes(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (path, contents, mode) in entries {
            let options = zip::write::SimpleFileOptions::default().unix_permissions(*mode);
            if path.ends_with('/') {
                zip.add_directory(*path, options).expect("Should add directory");
            } else {
                zip.start_file(*path, options).expect("Should start file");
                zip.write_all(contents).expect("Should write");
            }
        }
        zip.finish().expect("Should finish").into_inner()
    }
}
