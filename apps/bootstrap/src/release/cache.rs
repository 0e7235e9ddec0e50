//! Per-version cache of extracted launcher builds.
//!
//! Each version lives in `<versions>/<version-id>/`, containing the extracted
//! archive with the launcher executable at its top level. An entry is built in
//! a private staging directory and renamed into place only once the
//! executable is known to be present, so an entry directory that exists is
//! always complete. Entries are never modified or removed once published,
//! except for a leftover directory missing its executable, which is moved
//! aside, deleted and fetched again.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::archive;
use super::github::ReleaseSource;
use super::locator;
use super::platform::Platform;
use super::probe;
use super::version::VersionId;
use crate::config::UpstreamConfig;
use crate::errors::LauncherError;

/// Ensures launcher builds are present in the local cache.
pub struct Materializer<'a, S: ReleaseSource + ?Sized> {
    source: &'a S,
    upstream: &'a UpstreamConfig,
    versions_dir: PathBuf,
    platform: Platform,
}

impl<'a, S: ReleaseSource + ?Sized> Materializer<'a, S> {
    /// Creates a materializer caching under `versions_dir`.
    pub fn new(
        source: &'a S,
        upstream: &'a UpstreamConfig,
        versions_dir: impl Into<PathBuf>,
        platform: Platform,
    ) -> Self {
        Self {
            source,
            upstream,
            versions_dir: versions_dir.into(),
            platform,
        }
    }

    /// Returns the cache entry directory of `version`.
    #[must_use]
    pub fn entry_dir(&self, version: &VersionId) -> PathBuf {
        self.versions_dir.join(version.as_str())
    }

    /// Returns where the executable of `version` lives once materialized.
    #[must_use]
    pub fn executable_path(&self, version: &VersionId) -> PathBuf {
        self.entry_dir(version).join(self.executable_name())
    }

    fn executable_name(&self) -> String {
        self.platform.executable_name(&self.upstream.binary_name)
    }

    /// Returns the path of an executable launcher for `version`, downloading
    /// and unpacking it first when it is not cached.
    ///
    /// `branch` is only consulted when the build has to be located.
    ///
    /// # Errors
    ///
    /// - `Config` if `version` is not usable as a directory name
    /// - any error of locating, downloading or unpacking the build, labelled
    ///   with its stage
    /// - `NotFound` if the archive does not contain the executable
    /// - `Io` on local filesystem failures
    pub async fn ensure_local(&self, branch: &str, version: &VersionId) -> Result<PathBuf> {
        check_entry_name(version)?;

        let entry_dir = self.entry_dir(version);
        let executable = self.executable_path(version);

        if probe::exists(&executable)? {
            debug!(%version, path = %executable.display(), "cache hit");
        } else if probe::exists(&entry_dir)? && self.discard_incomplete(version, &entry_dir)? {
            debug!(%version, path = %executable.display(), "entry published concurrently");
        } else {
            self.fetch(branch, version, &entry_dir).await?;
        }

        if probe::ensure_executable(&executable)? {
            debug!(path = %executable.display(), "set execute permission");
        }
        Ok(executable)
    }

    /// Moves a leftover `entry_dir` aside and deletes it if it is still
    /// missing the executable.
    ///
    /// Another process may publish the entry between the caller's checks and
    /// the move. A complete entry caught this way is put back. Returns whether
    /// a complete entry is in place afterwards.
    fn discard_incomplete(&self, version: &VersionId, entry_dir: &Path) -> Result<bool> {
        let nonce: u64 = rand::random();
        let stale = self
            .versions_dir
            .join(format!(".stale-{version}-{nonce:016x}"));
        let name = self.executable_name();

        match std::fs::rename(entry_dir, &stale) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(LauncherError::io(
                    format!("failed to move aside {}", entry_dir.display()),
                    e,
                )
                .into());
            }
        }

        if probe::exists(&stale.join(&name))? {
            if std::fs::rename(&stale, entry_dir).is_err() {
                let _ = std::fs::remove_dir_all(&stale);
            }
            return probe::exists(&entry_dir.join(&name));
        }

        warn!(path = %entry_dir.display(), "removing incomplete cache entry");
        std::fs::remove_dir_all(&stale)
            .map_err(|e| LauncherError::io(format!("failed to remove {}", stale.display()), e))?;
        Ok(false)
    }

    /// Downloads and unpacks `version`, then publishes it at `entry_dir`.
    async fn fetch(&self, branch: &str, version: &VersionId, entry_dir: &Path) -> Result<()> {
        let nonce: u64 = rand::random();
        let staging = self
            .versions_dir
            .join(format!(".staging-{version}-{nonce:016x}"));
        let download = self
            .versions_dir
            .join(format!(".download-{version}-{nonce:016x}"));

        let result = self.fetch_into(branch, version, &staging, &download).await;
        let _ = std::fs::remove_file(&download);

        match result.and_then(|()| publish(&staging, entry_dir, &self.executable_name())) {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = std::fs::remove_dir_all(&staging);
                Err(e)
            }
        }
    }

    async fn fetch_into(
        &self,
        branch: &str,
        version: &VersionId,
        staging: &Path,
        download: &Path,
    ) -> Result<()> {
        std::fs::create_dir_all(staging).map_err(|e| {
            LauncherError::io(format!("failed to create {}", staging.display()), e)
        })?;

        let artifact = locator::locate(self.source, self.upstream, branch, version, self.platform)
            .await
            .context("locate artifact")?;

        info!(version = %artifact.version, url = %artifact.url, "downloading launcher");
        let bytes = self
            .source
            .download(&artifact.url, download)
            .await
            .context("fetch artifact")?;

        let files = archive::extract_archive(download, staging).context("unpack artifact")?;
        debug!(%version, bytes, files, "unpacked launcher");

        let name = self.executable_name();
        if !probe::exists(&staging.join(&name))? {
            return Err(LauncherError::not_found(format!(
                "build {version} does not contain {name}"
            ))
            .into());
        }
        Ok(())
    }
}

/// Renames a completed staging directory to `entry_dir`.
///
/// If another process published the same version first, its entry is kept and
/// the staging directory is discarded.
fn publish(staging: &Path, entry_dir: &Path, executable_name: &str) -> Result<()> {
    match std::fs::rename(staging, entry_dir) {
        Ok(()) => Ok(()),
        Err(_) if probe::exists(&entry_dir.join(executable_name))? => {
            debug!(path = %entry_dir.display(), "entry published concurrently");
            let _ = std::fs::remove_dir_all(staging);
            Ok(())
        }
        Err(e) => Err(LauncherError::io(
            format!(
                "failed to move {} to {}",
                staging.display(),
                entry_dir.display()
            ),
            e,
        )
        .into()),
    }
}

/// Rejects version identifiers that are not a single plain path component.
fn check_entry_name(version: &VersionId) -> Result<()> {
    let name = version.as_str();
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.starts_with('.')
        && !name.contains(['/', '\\']);
    if valid {
        Ok(())
    } else {
        Err(LauncherError::config(format!("invalid version identifier: {name:?}")).into())
    }
}
