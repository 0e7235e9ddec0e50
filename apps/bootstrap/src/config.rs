//! Launcher configuration.
//!
//! Settings come from two places: the command line (with environment variable
//! fallbacks, see `main.rs`) and an optional TOML file at
//! `<home>/bootstrap.toml`. Command-line values win.
//!
//! ```toml
//! [github]
//! access-token = "ghp_..."
//!
//! [upstream]
//! api-url = "https://api.github.com"
//! host = "github.com"
//! owner = "opendexnetwork"
//! repo = "opendex-docker"
//! workflow = "build.yml"
//! artifact-prefix = "launcher"
//! binary-name = "launcher"
//!
//! [network]
//! timeout-secs = 30
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use tracing::debug;

use crate::errors::LauncherError;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Contents of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConfigFile {
    /// Credentials for the upstream API.
    pub github: GithubSection,
    /// Where builds come from.
    pub upstream: UpstreamConfig,
    /// Transport settings.
    pub network: NetworkSection,
}

/// `[github]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct GithubSection {
    /// Token sent as `Authorization: token <value>`.
    pub access_token: Option<String>,
}

/// `[upstream]` section: the repository that publishes launcher builds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Base URL of the REST API.
    pub api_url: String,
    /// Host serving release assets.
    pub host: String,
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Workflow file whose runs produce branch builds.
    pub workflow: String,
    /// Prefix of release asset names (`<prefix>-<os>-<arch>.zip`).
    pub artifact_prefix: String,
    /// Executable name inside a build, without extension.
    pub binary_name: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            host: "github.com".to_string(),
            owner: "opendexnetwork".to_string(),
            repo: "opendex-docker".to_string(),
            workflow: "build.yml".to_string(),
            artifact_prefix: "launcher".to_string(),
            binary_name: "launcher".to_string(),
        }
    }
}

/// `[network]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct NetworkSection {
    /// API request timeout; downloads get a multiple of it.
    pub timeout_secs: u64,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Loads the config file at `path`; a missing file yields the defaults.
///
/// # Errors
///
/// Returns an `Io` error if the file exists but cannot be read, and a
/// `Config` error naming the file if it is not valid.
pub fn load(path: &Path) -> Result<ConfigFile> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(ConfigFile::default());
        }
        Err(e) => {
            return Err(
                LauncherError::io(format!("failed to read {}", path.display()), e).into(),
            );
        }
    };

    parse(&content)
        .map_err(|reason| LauncherError::config(format!("{}: {reason}", path.display())).into())
}

fn parse(content: &str) -> Result<ConfigFile, String> {
    toml::from_str(content).map_err(|e| e.to_string())
}

/// How much the launcher reports about itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verbosity {
    /// Warnings and errors only.
    #[default]
    Quiet,
    /// Stage transitions, requests and extracted entries.
    Verbose,
}

impl Verbosity {
    /// Returns the default `tracing` filter directive.
    #[must_use]
    pub fn filter_directive(self) -> &'static str {
        match self {
            Self::Quiet => "bootstrap=warn",
            Self::Verbose => "bootstrap=debug",
        }
    }

    #[must_use]
    pub fn is_verbose(self) -> bool {
        self == Self::Verbose
    }
}

/// Parses the value of the `DEBUG` switch: `true`, `on` or `1`, in any case.
#[must_use]
pub fn parse_debug_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "on" | "1"
    )
}

/// Settings resolved from the command line and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Branch or release tag to run.
    pub branch: String,
    /// Network name; selects the working directory under the home.
    pub network: String,
    /// Home directory override.
    pub home: Option<PathBuf>,
    /// Output verbosity.
    pub verbosity: Verbosity,
    /// Request timeout override in seconds.
    pub timeout_secs: Option<u64>,
}

impl Settings {
    /// Returns the API request timeout, preferring the command-line value over
    /// the file.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error for a zero timeout.
    pub fn request_timeout(&self, file: &ConfigFile) -> Result<Duration> {
        let secs = self.timeout_secs.unwrap_or(file.network.timeout_secs);
        if secs == 0 {
            return Err(LauncherError::config("timeout must be at least one second").into());
        }
        Ok(Duration::from_secs(secs))
    }
}
