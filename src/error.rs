//! Quickstart error types.
//!
//! Errors are categorized by how the run should react:
//!
//! | Category | Variants | Recovery |
//! |----------|----------|----------|
//! | **Config** | `Configuration` | Fix configuration, nothing was contacted |
//! | **Auth** | `Authorization`, `Signing` | Use a shared-key credential |
//! | **Transport** | `Http` | Transient when the connection or deadline failed |
//! | **Remote** | `Service`, `TaskSubmission` | 5xx / 429 are transient, the rest are fatal |
//! | **Local** | `Io`, `Decode` | Fix input files or report the wire mismatch |
//!
//! "Already exists" conflicts on pool/job/container creation are not errors;
//! they surface as [`CreateOutcome::AlreadyExists`](crate::CreateOutcome).
//! A wait that runs out of time is not an error either; it surfaces as
//! [`WaitOutcome::TimedOut`](crate::WaitOutcome).

use std::path::PathBuf;

use thiserror::Error;

/// A required configuration value is missing or malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required field was left empty.
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    /// A field has a value that cannot be used.
    #[error("invalid value for `{key}`: {reason}")]
    Invalid {
        key: &'static str,
        reason: String,
    },
}

/// Which remote service produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Storage,
    Batch,
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Service::Storage => write!(f, "storage"),
            Service::Batch => write!(f, "batch"),
        }
    }
}

/// Errors that can occur while running the quickstart.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuickstartError {
    // ── Config errors ────────────────────────────────────────────────
    /// Configuration error, raised before any remote call.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    // ── Auth errors ──────────────────────────────────────────────────
    /// The connection cannot perform the requested operation, e.g. issuing
    /// a signed URL without a shared key.
    #[error("authorization error: {0}")]
    Authorization(String),

    /// The account key could not be used to sign a request.
    #[error("signing error: {0}")]
    Signing(String),

    // ── Transport errors ─────────────────────────────────────────────
    /// The HTTP request itself failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    // ── Remote errors ────────────────────────────────────────────────
    /// The service answered with a non-success status.
    #[error("{service} service returned HTTP {status} ({code}): {message}")]
    Service {
        service: Service,
        status: u16,
        code: String,
        message: String,
    },

    /// A task in a batch submission was rejected.
    #[error("task {task_id} was rejected ({code}): {message}")]
    TaskSubmission {
        task_id: String,
        code: String,
        message: String,
    },

    /// A response body did not match the expected shape.
    #[error("could not decode response: {0}")]
    Decode(String),

    // ── Local errors ─────────────────────────────────────────────────
    /// Reading a local input file failed.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl QuickstartError {
    /// Create an authorization error with the given message
    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    /// Create a decode error with the given message
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Returns `true` if the failure may go away on a later attempt.
    ///
    /// Nothing in this crate retries; the classification is reported so the
    /// caller can tell a flaky network from a rejected request.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Service { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// The service error code, when the remote side supplied one.
    pub fn service_code(&self) -> Option<&str> {
        match self {
            Self::Service { code, .. } | Self::TaskSubmission { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Result type for quickstart operations.
pub type QuickstartResult<T> = Result<T, QuickstartError>;

/// Longest raw response body kept in a [`QuickstartError::Service`] message.
pub const MAX_ERROR_BODY_BYTES: usize = 512;

/// Cut a raw error body to at most [`MAX_ERROR_BODY_BYTES`], on a char boundary.
pub(crate) fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY_BYTES {
        let end = (0..=MAX_ERROR_BODY_BYTES)
            .rev()
            .find(|&i| body.is_char_boundary(i))
            .unwrap_or(0);
        body.truncate(end);
    }
    body
}
