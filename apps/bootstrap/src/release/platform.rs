//! Platform detection for launcher artifacts.
//!
//! The platform key (`<os>-<arch>`, e.g. `linux-amd64`) names both the CI
//! artifact for a branch build and the suffix of a release asset. OS and
//! architecture use the upstream build's naming (`darwin`, `amd64`, ...)
//! rather than Rust's `std::env::consts` spelling.
//!
//! ## Supported Platforms
//!
//! - Linux `x86_64` (`linux-amd64`) and ARM64 (`linux-arm64`)
//! - macOS `x86_64` (`darwin-amd64`) and ARM64 (`darwin-arm64`)
//! - Windows `x86_64` (`windows-amd64`)

use anyhow::Result;
use std::fmt;

use crate::errors::LauncherError;

/// A platform with pre-built launcher binaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Linux on `x86_64`
    LinuxAmd64,
    /// Linux on ARM64
    LinuxArm64,
    /// macOS on `x86_64`
    DarwinAmd64,
    /// macOS on ARM64 (Apple Silicon)
    DarwinArm64,
    /// Windows on `x86_64`
    WindowsAmd64,
}

impl Platform {
    /// Detects the current platform based on compile-time configuration.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the current OS/architecture combination has
    /// no upstream builds.
    pub fn detect() -> Result<Self> {
        Self::from_consts(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Maps Rust's OS/arch names onto a supported platform.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error for unsupported combinations.
    pub fn from_consts(os: &str, arch: &str) -> Result<Self> {
        match (os, arch) {
            ("linux", "x86_64") => Ok(Self::LinuxAmd64),
            ("linux", "aarch64") => Ok(Self::LinuxArm64),
            ("macos", "x86_64") => Ok(Self::DarwinAmd64),
            ("macos", "aarch64") => Ok(Self::DarwinArm64),
            ("windows", "x86_64") => Ok(Self::WindowsAmd64),
            _ => Err(LauncherError::config(format!(
                "unsupported platform: {os} on {arch}. \
                 Supported platforms are: linux-amd64, linux-arm64, darwin-amd64, \
                 darwin-arm64, windows-amd64"
            ))
            .into()),
        }
    }

    /// Returns the platform key used for artifact names.
    #[must_use = "returns the platform key without side effects"]
    pub fn key(self) -> &'static str {
        match self {
            Self::LinuxAmd64 => "linux-amd64",
            Self::LinuxArm64 => "linux-arm64",
            Self::DarwinAmd64 => "darwin-amd64",
            Self::DarwinArm64 => "darwin-arm64",
            Self::WindowsAmd64 => "windows-amd64",
        }
    }

    /// Returns the OS component of the key.
    #[must_use = "returns the OS string without side effects"]
    pub fn os(self) -> &'static str {
        match self {
            Self::LinuxAmd64 | Self::LinuxArm64 => "linux",
            Self::DarwinAmd64 | Self::DarwinArm64 => "darwin",
            Self::WindowsAmd64 => "windows",
        }
    }

    /// Returns the architecture component of the key.
    #[must_use = "returns the arch string without side effects"]
    pub fn arch(self) -> &'static str {
        match self {
            Self::LinuxAmd64 | Self::DarwinAmd64 | Self::WindowsAmd64 => "amd64",
            Self::LinuxArm64 | Self::DarwinArm64 => "arm64",
        }
    }

    /// Returns whether this platform is Windows.
    #[must_use = "returns platform check result without side effects"]
    pub fn is_windows(self) -> bool {
        matches!(self, Self::WindowsAmd64)
    }

    /// Returns the executable file extension for this platform.
    ///
    /// Returns `.exe` on Windows, empty string elsewhere.
    #[must_use = "returns the extension string without side effects"]
    pub fn executable_extension(self) -> &'static str {
        if self.is_windows() { ".exe" } else { "" }
    }

    /// Returns the file name of `binary` on this platform.
    #[must_use]
    pub fn executable_name(self, binary: &str) -> String {
        format!("{binary}{}", self.executable_extension())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}
