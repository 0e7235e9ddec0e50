//! Version resolution and materialization of launcher builds.
//!
//! Control flow for one launcher start:
//!
//! 1. [`version::resolve`] turns the configured branch into a [`VersionId`]
//! 2. [`Materializer::ensure_local`] returns the cached executable for it, or
//!    locates ([`locator`]), downloads ([`download`]) and unpacks ([`archive`])
//!    the build first
//! 3. the caller hands off to the returned path
//!
//! ## Module Structure
//!
//! - [`probe`] - stat-based filesystem queries
//! - [`platform`] - OS and architecture detection
//! - [`version`] - version identifiers and branch resolution
//! - [`github`] - remote API client behind the [`ReleaseSource`] trait
//! - [`locator`] - release asset / CI artifact lookup
//! - [`download`] - streaming HTTP download
//! - [`archive`] - ZIP and tar.gz extraction
//! - [`cache`] - per-version cache entries
//! - [`paths`] - launcher home layout

pub mod archive;
pub mod cache;
pub mod download;
pub mod github;
pub mod locator;
pub mod paths;
pub mod platform;
pub mod probe;
pub mod version;

pub use cache::Materializer;
pub use github::{GithubClient, ReleaseSource};
pub use paths::LauncherPaths;
pub use platform::Platform;
