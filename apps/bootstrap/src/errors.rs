//! Error types for the bootstrap launcher.
//!
//! Every failure of the materialization core is one of the variants of
//! [`LauncherError`]. Functions return `anyhow::Result` and attach a short
//! stage label with `.context(...)`; callers that need to classify a failure
//! use `downcast_ref::<LauncherError>()` on the resulting chain.

use thiserror::Error;

/// Consolidated error type for launcher operations.
#[derive(Debug, Error)]
pub enum LauncherError {
    /// The requested branch, build or artifact does not exist upstream.
    #[error("not found: {message}")]
    NotFound {
        /// What was looked for and why it is missing.
        message: String,
    },

    /// Transport-level failure reaching an API or download host.
    #[error("network error: {message}")]
    Network {
        /// Description of the request that failed.
        message: String,
        /// The underlying transport error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The remote API answered with a failure status.
    ///
    /// `message` is the upstream's own error text.
    #[error("remote error ({status}): {message}")]
    Remote {
        /// HTTP status code returned by the API.
        status: u16,
        /// The `message` field of the upstream error body.
        message: String,
    },

    /// A download answered with a failure status.
    #[error("HTTP error {status}: {body}")]
    Http {
        /// HTTP status code returned by the download host.
        status: u16,
        /// The response body, verbatim.
        body: String,
    },

    /// Local filesystem or archive failure.
    #[error("I/O error: {message}")]
    Io {
        /// Description of the operation that failed.
        message: String,
        /// The underlying error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A required precondition is unmet (home directory, network name, config file).
    #[error("configuration error: {message}")]
    Config {
        /// Description of the unmet precondition.
        message: String,
    },

    /// The downstream binary exited with a non-zero code.
    ///
    /// The code is mirrored as the launcher's own exit status without printing
    /// an additional error message.
    #[error("process exited with code {code}")]
    ProcessExitCode {
        /// The exit code from the downstream binary.
        code: i32,
    },
}

impl LauncherError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a new `Network` error wrapping a transport error.
    #[must_use]
    pub fn network(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new `Remote` error.
    #[must_use]
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        Self::Remote {
            status,
            message: message.into(),
        }
    }

    /// Creates a new `Http` error.
    #[must_use]
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::Http {
            status,
            body: body.into(),
        }
    }

    /// Creates a new `Io` error from an I/O error with context.
    #[must_use]
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new `Io` error from any error source (archive readers, etc.).
    #[must_use]
    pub fn io_other(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new `Io` error without an underlying source.
    #[must_use]
    pub fn io_message(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new `Config` error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a new `ProcessExitCode` error.
    #[must_use]
    pub const fn process_exit_code(code: i32) -> Self {
        Self::ProcessExitCode { code }
    }
}

/// Returns the first [`LauncherError`] in an `anyhow` chain, if any.
#[must_use]
pub fn classify(err: &anyhow::Error) -> Option<&LauncherError> {
    err.chain().find_map(|cause| cause.downcast_ref::<LauncherError>())
}
