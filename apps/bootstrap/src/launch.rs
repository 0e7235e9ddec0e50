//! One launcher start: prepare the home, materialize the build for the
//! configured branch and hand off to it.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use tracing::info;

use crate::config::{self, Settings, UpstreamConfig};
use crate::errors::LauncherError;
use crate::release::{
    GithubClient, LauncherPaths, Materializer, Platform, ReleaseSource, version,
};

/// Environment variable carrying the branch to the downstream launcher.
const BRANCH_ENV: &str = "BRANCH";

/// Environment variable carrying the network to the downstream launcher.
const NETWORK_ENV: &str = "NETWORK";

/// Runs the launcher for `settings`, forwarding `args` to the downstream binary.
///
/// # Errors
///
/// Returns the first failure of preparing the home, loading the config or
/// materializing the build, and `ProcessExitCode` when the downstream binary
/// exits unsuccessfully.
pub async fn run(settings: &Settings, args: &[OsString]) -> Result<()> {
    let paths = LauncherPaths::resolve(settings.home.clone(), &settings.network)?;
    paths.ensure_directories()?;

    let file = config::load(&paths.config_file())?;
    let timeout = settings.request_timeout(&file)?;
    let platform = Platform::detect()?;
    let client = GithubClient::new(&file.upstream, file.github.access_token.clone(), timeout)?;

    let executable = materialize(
        &client,
        &file.upstream,
        &paths.versions,
        platform,
        &settings.branch,
    )
    .await?;
    info!(network = %settings.network, dir = %paths.network.display(), "network");

    if is_version_request(args) {
        println!("{}", version_banner());
    }

    hand_off(&executable, args, settings)
}

/// Resolves `branch` and returns the path of its cached executable.
///
/// # Errors
///
/// See [`version::resolve`] and [`Materializer::ensure_local`].
pub async fn materialize<S: ReleaseSource + ?Sized>(
    source: &S,
    upstream: &UpstreamConfig,
    versions_dir: &Path,
    platform: Platform,
    branch: &str,
) -> Result<PathBuf> {
    let version = version::resolve(source, branch).await?;
    info!(branch, %version, "branch");

    let executable = Materializer::new(source, upstream, versions_dir, platform)
        .ensure_local(branch, &version)
        .await?;
    info!(path = %executable.display(), "launcher");
    Ok(executable)
}

/// Returns whether the forwarded arguments ask the downstream for its version.
#[must_use]
pub fn is_version_request(args: &[OsString]) -> bool {
    matches!(args, [only] if only == "version")
}

/// Returns the launcher's own version line.
#[must_use]
pub fn version_banner() -> String {
    let commit = option_env!("BOOTSTRAP_GIT_COMMIT").unwrap_or("unknown");
    let short = commit.get(..7).unwrap_or(commit);
    format!("bootstrap {}-{short}", env!("CARGO_PKG_VERSION"))
}

/// Runs `executable` with `args` and inherited standard streams.
///
/// The downstream binary sees the effective branch and network in its
/// environment.
///
/// # Errors
///
/// Returns an `Io` error if the binary cannot be started and
/// `ProcessExitCode` carrying its exit code when it fails; termination by a
/// signal is reported as code 1.
pub fn hand_off(executable: &Path, args: &[OsString], settings: &Settings) -> Result<()> {
    let status = Command::new(executable)
        .args(args)
        .env(BRANCH_ENV, &settings.branch)
        .env(NETWORK_ENV, &settings.network)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|e| LauncherError::io(format!("failed to execute {}", executable.display()), e))
        .context("run launcher")?;

    if !status.success() {
        let code = status.code().unwrap_or(1);
        return Err(LauncherError::process_exit_code(code).into());
    }
    Ok(())
}
