//! Local-disk file store.
//!
//! Files are stored under `{base}/{owner}/{uuid}-{name}` and served by a
//! static file server under a configurable public base URL. Only the
//! reference is stored in job rows; bytes live on disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use super::{FileStore, FileStoreError, StoredFile};

/// File store backed by a local directory.
pub struct LocalFileStore {
    base_path: PathBuf,
    public_base_url: String,
}

impl LocalFileStore {
    /// Creates a new local file store.
    ///
    /// # Arguments
    ///
    /// * `base_path` - Directory files are written under
    /// * `public_base_url` - URL prefix the directory is served from
    pub fn new(base_path: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            public_base_url: public_base_url.into(),
        }
    }

    /// Returns the base storage path.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Keeps file names single-segment and filesystem-safe.
    fn sanitize(name: &str) -> String {
        let cleaned: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if cleaned.is_empty() {
            "upload".to_string()
        } else {
            cleaned
        }
    }

    /// Validates an owner-scoped reference and resolves it to a path.
    fn resolve(&self, owner_id: &str, reference: &str) -> Result<PathBuf, FileStoreError> {
        let parts: Vec<&str> = reference.split('/').collect();
        let valid = parts.len() == 2
            && parts[0] == Self::sanitize(owner_id)
            && parts
                .iter()
                .all(|p| !p.is_empty() && *p != "." && *p != "..");
        if !valid {
            return Err(FileStoreError::InvalidReference(reference.to_string()));
        }
        Ok(self.base_path.join(reference))
    }

    async fn ensure_owner_dir(&self, owner_id: &str) -> Result<PathBuf, FileStoreError> {
        let dir = self.base_path.join(Self::sanitize(owner_id));
        fs::create_dir_all(&dir).await.map_err(|e| {
            FileStoreError::DirectoryCreationFailed(format!(
                "Failed to create directory {:?}: {}",
                dir, e
            ))
        })?;
        Ok(dir)
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn store(
        &self,
        owner_id: &str,
        bytes: &[u8],
        content_type: &str,
        file_name: &str,
    ) -> Result<StoredFile, FileStoreError> {
        let dir = self.ensure_owner_dir(owner_id).await?;
        let stored_name = format!("{}-{}", Uuid::new_v4(), Self::sanitize(file_name));
        let path = dir.join(&stored_name);

        fs::write(&path, bytes).await?;

        let reference = format!("{}/{}", Self::sanitize(owner_id), stored_name);
        let public_url = format!(
            "{}/{}",
            self.public_base_url.trim_end_matches('/'),
            reference
        );

        debug!(
            owner_id = %owner_id,
            reference = %reference,
            content_type = %content_type,
            size_bytes = bytes.len(),
            "Stored file"
        );

        Ok(StoredFile {
            reference,
            public_url,
        })
    }

    async fn delete(&self, owner_id: &str, reference: &str) -> Result<(), FileStoreError> {
        let path = self.resolve(owner_id, reference)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FileStoreError::NotFound(reference.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
