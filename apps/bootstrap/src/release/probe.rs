//! Stat-based filesystem queries.
//!
//! Thin wrappers over `std::fs::metadata` that answer the questions the
//! launcher asks about its directories and cached binaries. A missing path is
//! an answer (`false`) for [`exists`]; for every other query it is an error,
//! since the caller is expected to have checked existence first.

use std::path::Path;

use anyhow::Result;

use crate::errors::LauncherError;

/// Owner-write permission bit.
#[cfg(unix)]
const USER_WRITABLE: u32 = 0o200;

/// Owner-execute permission bit.
#[cfg(unix)]
const USER_EXECUTABLE: u32 = 0o100;

/// Mode applied when a binary is missing its execute bit.
#[cfg(unix)]
const EXECUTABLE_MODE: u32 = 0o755;

/// Returns whether `path` exists.
///
/// # Errors
///
/// Returns an `Io` error when the path cannot be stat'ed for a reason other
/// than it not existing (e.g. permission denied on a parent directory).
pub fn exists(path: &Path) -> Result<bool> {
    match std::fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(LauncherError::io(format!("stat {}", path.display()), e).into()),
    }
}

/// Returns whether `path` is a directory.
///
/// # Errors
///
/// Returns an `Io` error if the path cannot be stat'ed.
pub fn is_dir(path: &Path) -> Result<bool> {
    Ok(metadata(path)?.is_dir())
}

/// Returns whether the owner may write to `path`.
///
/// On Windows only the read-only attribute is consulted.
///
/// # Errors
///
/// Returns an `Io` error if the path cannot be stat'ed.
pub fn is_writable(path: &Path) -> Result<bool> {
    let meta = metadata(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        Ok(meta.permissions().mode() & USER_WRITABLE != 0)
    }
    #[cfg(not(unix))]
    {
        Ok(!meta.permissions().readonly())
    }
}

/// Returns whether the owner may execute `path`.
///
/// Always `true` on non-Unix platforms, where there is no execute bit.
///
/// # Errors
///
/// Returns an `Io` error if the path cannot be stat'ed.
pub fn is_executable(path: &Path) -> Result<bool> {
    let meta = metadata(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        Ok(meta.permissions().mode() & USER_EXECUTABLE != 0)
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        Ok(true)
    }
}

/// Sets `0o755` on `path` unless the owner can already execute it.
///
/// Returns `true` when the mode was changed. A no-op on non-Unix platforms.
///
/// # Errors
///
/// Returns an `Io` error if the path cannot be stat'ed or its mode cannot be set.
pub fn ensure_executable(path: &Path) -> Result<bool> {
    if is_executable(path)? {
        return Ok(false);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(EXECUTABLE_MODE);
        std::fs::set_permissions(path, perms)
            .map_err(|e| LauncherError::io(format!("chmod {}", path.display()), e))?;
        Ok(true)
    }
    #[cfg(not(unix))]
    {
        Ok(false)
    }
}

fn metadata(path: &Path) -> Result<std::fs::Metadata> {
    std::fs::metadata(path)
        .map_err(|e| LauncherError::io(format!("stat {}", path.display()), e).into())
}
