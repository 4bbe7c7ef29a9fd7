//! Outcomes of idempotent create and delete calls.
//!
//! Creating a pool, job or container that already exists is an expected
//! result, not a failure. The gateways report it through [`CreateOutcome`]
//! and reserve `Err` for everything else.

use serde::{Deserialize, Serialize};

/// Result of an idempotent create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateOutcome {
    /// The resource was created by this call.
    Created,
    /// A resource with the same id was already present.
    AlreadyExists,
}

impl CreateOutcome {
    /// Map a create response onto an outcome.
    ///
    /// Returns `None` when the response is a failure the caller must surface.
    pub fn classify(status: u16, error_code: Option<&str>, conflict_code: &str) -> Option<Self> {
        match status {
            200..=299 => Some(Self::Created),
            409 if error_code == Some(conflict_code) => Some(Self::AlreadyExists),
            _ => None,
        }
    }
}

/// Result of a delete-if-exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteOutcome {
    /// The resource existed and deletion was accepted.
    Deleted,
    /// There was nothing to delete.
    NotFound,
}

impl DeleteOutcome {
    /// Map a delete response onto an outcome; `None` means a real failure.
    pub fn classify(status: u16, error_code: Option<&str>, not_found_code: &str) -> Option<Self> {
        match status {
            200..=299 => Some(Self::Deleted),
            404 if error_code.is_none_or(|code| code == not_found_code) => Some(Self::NotFound),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeleteOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeleteOutcome::Deleted => write!(f, "deleted"),
            DeleteOutcome::NotFound => write!(f, "not found"),
        }
    }
}
