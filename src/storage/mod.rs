//! Storage gateway: the input container and its blobs.
//!
//! The [`StorageGateway`] trait covers the container lifecycle and the
//! upload-then-sign step that produces task inputs. Signed URLs are blob
//! service SAS tokens and can only be issued over a shared-key connection;
//! see [`sas`].

pub mod blob;
pub mod sas;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QuickstartError, QuickstartResult};
use crate::outcome::{CreateOutcome, DeleteOutcome};

/// Lifetime of the signed URL issued for each uploaded blob.
pub const SAS_LIFETIME_SECS: i64 = 60 * 60;

/// Expiry of a signed URL issued at `issued_at`.
pub fn sas_expiry(issued_at: DateTime<Utc>) -> DateTime<Utc> {
    issued_at + TimeDelta::seconds(SAS_LIFETIME_SECS)
}

/// A container that has been ensured on the storage account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    name: String,
}

impl ContainerHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// An uploaded input file and the read-only signed URL that grants access to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFileReference {
    pub local_path: PathBuf,
    pub blob_name: String,
    pub signed_url: String,
    pub expires_on: DateTime<Utc>,
}

/// Operations consumed from the object storage service.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Create the container if it is absent.
    async fn ensure_container(
        &self,
        name: &str,
    ) -> QuickstartResult<(ContainerHandle, CreateOutcome)>;

    /// Upload a local file under its base name and issue a read-only signed
    /// URL for it, valid for [`SAS_LIFETIME_SECS`].
    ///
    /// Fails with [`QuickstartError::Authorization`] when the connection
    /// cannot sign URLs.
    async fn upload_file(
        &self,
        container: &ContainerHandle,
        local_path: &Path,
    ) -> QuickstartResult<InputFileReference>;

    /// Delete the container; reports `NotFound` if it was already gone.
    async fn delete_container_if_exists(
        &self,
        container: &ContainerHandle,
    ) -> QuickstartResult<DeleteOutcome>;
}

/// Blob name for a local file: its base name.
pub fn blob_name_for(local_path: &Path) -> QuickstartResult<String> {
    local_path
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| QuickstartError::Io {
            path: local_path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path has no usable file name",
            ),
        })
}
