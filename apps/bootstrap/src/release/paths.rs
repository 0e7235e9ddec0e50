//! Launcher home directory layout.
//!
//! ```text
//! <home>/                     # BOOTSTRAP_HOME or the per-OS default
//!   bootstrap.toml            # optional config file
//!   launcher/
//!     versions/               # cache root
//!       <version-id>/         # one extracted build per version
//!         launcher[.exe]
//!   <network>/                # working directory of the downstream launcher
//! ```

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use super::probe;
use crate::errors::LauncherError;

/// Environment variable overriding the home directory.
pub const BOOTSTRAP_HOME_ENV: &str = "BOOTSTRAP_HOME";

const CONFIG_FILE: &str = "bootstrap.toml";

/// Resolved paths of one launcher home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherPaths {
    /// Home root.
    pub home: PathBuf,
    /// `<home>/launcher`.
    pub launcher: PathBuf,
    /// `<home>/launcher/versions`, the cache root.
    pub versions: PathBuf,
    /// `<home>/<network>`.
    pub network: PathBuf,
}

impl LauncherPaths {
    /// Builds the layout for `network`, rooted at `home` or at the per-OS
    /// default when `home` is `None`.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the default home cannot be determined or
    /// `network` is not a plain directory name.
    pub fn resolve(home: Option<PathBuf>, network: &str) -> Result<Self> {
        let home = match home {
            Some(home) => home,
            None => default_home()?,
        };
        Self::with_home(home, network)
    }

    /// Builds the layout for `network` under an explicit `home`.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if `network` is empty or contains a path
    /// separator.
    pub fn with_home(home: PathBuf, network: &str) -> Result<Self> {
        let network = network.trim();
        if network.is_empty() {
            return Err(LauncherError::config("network name is empty").into());
        }
        if network.contains(['/', '\\']) || network == "." || network == ".." {
            return Err(LauncherError::config(format!("invalid network name: {network}")).into());
        }

        let launcher = home.join("launcher");
        Ok(Self {
            versions: launcher.join("versions"),
            network: home.join(network),
            launcher,
            home,
        })
    }

    /// Returns the config file path.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.home.join(CONFIG_FILE)
    }

    /// Creates the home, launcher, cache and network directories as needed
    /// and checks that each one is a writable directory.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if a path exists but is not a directory or is
    /// not writable, and an `Io` error if a directory cannot be created.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.home, &self.launcher, &self.versions, &self.network] {
            check_dir(dir)?;
        }
        Ok(())
    }
}

fn check_dir(dir: &Path) -> Result<()> {
    if !probe::exists(dir)? {
        debug!(path = %dir.display(), "creating directory");
        std::fs::create_dir_all(dir).map_err(|e| {
            LauncherError::io(format!("failed to create directory {}", dir.display()), e)
        })?;
    }
    if !probe::is_dir(dir)? {
        return Err(LauncherError::config(format!("{} is not a folder", dir.display())).into());
    }
    if !probe::is_writable(dir)? {
        return Err(LauncherError::config(format!("{} is not writable", dir.display())).into());
    }
    Ok(())
}

/// Returns the per-OS default home directory.
fn default_home() -> Result<PathBuf> {
    let user_home = dirs::home_dir().ok_or_else(|| {
        LauncherError::config(format!(
            "cannot determine home directory; set {BOOTSTRAP_HOME_ENV}"
        ))
    })?;
    home_for_os(std::env::consts::OS, &user_home)
}

/// Returns the home directory for `os` under the user's home.
///
/// # Errors
///
/// Returns a `Config` error for operating systems without a known layout.
pub fn home_for_os(os: &str, user_home: &Path) -> Result<PathBuf> {
    match os {
        "linux" => Ok(user_home.join(".opendex-docker")),
        "macos" => Ok(user_home
            .join("Library")
            .join("Application Support")
            .join("OpendexDocker")),
        "windows" => Ok(user_home
            .join("AppData")
            .join("Local")
            .join("OpendexDocker")),
        _ => Err(LauncherError::config(format!(
            "unsupported operating system {os}; set {BOOTSTRAP_HOME_ENV}"
        ))
        .into()),
    }
}
