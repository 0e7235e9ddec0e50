//! Version identifiers and branch resolution.
//!
//! A [`VersionId`] is the sole cache key of a materialized launcher. It is
//! either a release tag (self-identifying, recognized lexically as
//! `DD.DD.DD<suffix>`) or the head commit of a branch, which must be asked of
//! the remote every time since branches move.

use std::fmt;

use anyhow::{Context, Result};
use tracing::debug;

use super::github::ReleaseSource;

/// Kind of an immutable version identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionKind {
    /// A dated release tag such as `21.06.03` or `21.06.03-rc1`.
    Tag,
    /// A commit hash resolved from a branch head.
    Commit,
}

/// An immutable identifier for one build of the downstream binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionId {
    value: String,
    kind: VersionKind,
}

impl VersionId {
    /// Creates a tag identifier. The caller is responsible for the pattern check.
    #[must_use]
    pub fn tag(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: VersionKind::Tag,
        }
    }

    /// Creates a commit identifier.
    #[must_use]
    pub fn commit(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: VersionKind::Commit,
        }
    }

    /// Returns the identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Returns whether this is a release tag.
    #[must_use]
    pub fn is_tag(&self) -> bool {
        self.kind == VersionKind::Tag
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Returns whether `reference` is a release tag: two digits, dot, two digits,
/// dot, two digits, then any suffix.
#[must_use]
pub fn is_release_tag(reference: &str) -> bool {
    let bytes = reference.as_bytes();
    if bytes.len() < 8 {
        return false;
    }
    bytes[..8].iter().enumerate().all(|(i, b)| match i {
        2 | 5 => *b == b'.',
        _ => b.is_ascii_digit(),
    })
}

/// Resolves `branch` to an immutable version identifier.
///
/// Release tags are returned as-is without touching the network. Any other
/// reference is looked up as a branch head on every call.
///
/// # Errors
///
/// Propagates `NotFound`, `Network` and `Remote` errors from the source,
/// labelled with the stage.
pub async fn resolve<S: ReleaseSource + ?Sized>(source: &S, branch: &str) -> Result<VersionId> {
    if is_release_tag(branch) {
        debug!(branch, "branch is a release tag");
        return Ok(VersionId::tag(branch));
    }

    let sha = source
        .head_commit(branch)
        .await
        .context("get branch head")?;
    debug!(branch, commit = %sha, "resolved branch head");
    Ok(VersionId::commit(sha))
}
