//! Object storage for uploaded media

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{Result, StoreError};

/// Result of a successful upload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredObject {
    pub bucket: String,
    pub path: String,
}

/// Bucketed binary storage
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` under `bucket/key`. Never overwrites an existing object.
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<StoredObject>;

    /// Public URL for a stored object. No I/O.
    fn public_url(&self, bucket: &str, path: &str) -> String;

    async fn remove(&self, bucket: &str, path: &str) -> Result<()>;
}

/// Object storage on the local filesystem
pub struct LocalObjectStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        for part in [bucket, key] {
            let relative = Path::new(part);
            let safe = !part.is_empty()
                && relative
                    .components()
                    .all(|c| matches!(c, Component::Normal(_)));
            if !safe {
                return Err(StoreError::InvalidRequest(format!(
                    "Invalid object path: {}",
                    part
                )));
            }
        }
        Ok(self.root.join(bucket).join(key))
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<StoredObject> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::ObjectExists {
                    bucket: bucket.to_string(),
                    path: key.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(bytes).await?;
        file.flush().await?;

        info!(
            "Stored {} ({} bytes, {}) in bucket {}",
            key,
            bytes.len(),
            content_type,
            bucket
        );

        Ok(StoredObject {
            bucket: bucket.to_string(),
            path: key.to_string(),
        })
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/{}/{}", self.public_base_url, bucket, path)
    }

    async fn remove(&self, bucket: &str, path: &str) -> Result<()> {
        let full = self.object_path(bucket, path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => {
                debug!("Removed {}/{}", bucket, path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_never_overwrites() {
        let dir = tempfile::TempDir::new().unwrap();
        let storage = LocalObjectStorage::new(dir.path(), "http://localhost/storage/");

        let stored = storage
            .upload("message-images", "u1/a.png", b"png", "image/png")
            .await
            .unwrap();
        assert_eq!(stored.path, "u1/a.png");
        assert_eq!(
            storage.public_url("message-images", &stored.path),
            "http://localhost/storage/message-images/u1/a.png"
        );

        let err = storage
            .upload("message-images", "u1/a.png", b"other", "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ObjectExists { .. }));

        storage.remove("message-images", "u1/a.png").await.unwrap();
        storage.remove("message-images", "u1/a.png").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempfile::TempDir::new().unwrap();
        let storage = LocalObjectStorage::new(dir.path(), "http://localhost");
        let err = storage
            .upload("message-images", "../escape.png", b"x", "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRequest(_)));
    }
}
