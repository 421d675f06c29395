//! File storage collaborators.
//!
//! Upload jobs persist their media through the [`FileStore`] contract and
//! only ever see back an opaque reference plus a public URL. The local-disk
//! implementation lives in [`local`].

pub mod local;

use async_trait::async_trait;
use thiserror::Error;

pub use local::LocalFileStore;

/// Errors that can occur during file store operations.
#[derive(Debug, Error)]
pub enum FileStoreError {
    /// IO operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage directory creation failed.
    #[error("Failed to create storage directory: {0}")]
    DirectoryCreationFailed(String),

    /// The referenced file does not exist.
    #[error("File not found: {0}")]
    NotFound(String),

    /// The reference is malformed or escapes the storage root.
    #[error("Invalid file reference: {0}")]
    InvalidReference(String),
}

/// A stored file: the opaque reference used for deletion and the URL
/// handed to end users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Opaque reference for later deletion.
    pub reference: String,
    /// Publicly reachable URL.
    pub public_url: String,
}

/// Contract for the object store.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Persists `bytes` under the owner's namespace and returns the stored
    /// file handle.
    async fn store(
        &self,
        owner_id: &str,
        bytes: &[u8],
        content_type: &str,
        file_name: &str,
    ) -> Result<StoredFile, FileStoreError>;

    /// Deletes a previously stored file.
    async fn delete(&self, owner_id: &str, reference: &str) -> Result<(), FileStoreError>;
}
