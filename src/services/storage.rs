use std::path::{Path, PathBuf};

/// An upload persisted to disk, addressable by the background job.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub path: PathBuf,
    pub file_name: String,
    pub content_type: String,
}

/// Local-disk storage for uploaded images.
pub struct UploadStorage {
    root: PathBuf,
}

impl UploadStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the storage directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Write image bytes as `{job_id}_{file_name}` under the storage root.
    pub async fn save(
        &self,
        job_id: &str,
        file_name: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<StoredUpload, StorageError> {
        let file_name = sanitize_file_name(file_name)?;
        let path = self.root.join(format!("{job_id}_{file_name}"));

        self.ensure_dir().await?;
        tokio::fs::write(&path, data).await?;

        tracing::debug!(
            job_id = %job_id,
            path = %path.display(),
            size = data.len(),
            "Upload persisted"
        );

        Ok(StoredUpload {
            path,
            file_name,
            content_type: content_type.to_string(),
        })
    }

    /// Read a previously stored upload back into memory.
    pub async fn load(&self, upload: &StoredUpload) -> Result<Vec<u8>, StorageError> {
        Ok(tokio::fs::read(&upload.path).await?)
    }
}

/// Keep only the final path component of a client-supplied file name.
fn sanitize_file_name(file_name: &str) -> Result<String, StorageError> {
    let name = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::trim)
        .unwrap_or_default();

    if name.is_empty() || name == "." || name == ".." {
        return Err(StorageError::InvalidFileName(file_name.to_string()));
    }
    Ok(name.to_string())
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid upload file name: {0:?}")]
    InvalidFileName(String),
}
