use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use super::{validate_key, BlobTags, ObjectStore, ObjectStoreError};

const TAGS_DIR: &str = ".tags";

/// Local filesystem object store for development and testing.
/// Tags live in JSON sidecars under `<base>/.tags/`, mirroring the key layout.
pub struct LocalStore {
    base_path: PathBuf,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(base_path.as_ref())?;
        let base_path = std::fs::canonicalize(base_path.as_ref())?;
        Ok(Self { base_path })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        validate_key(key)?;
        if key.split('/').next() == Some(TAGS_DIR) {
            return Err(ObjectStoreError::InvalidKey(key.to_string()));
        }
        Ok(self.base_path.join(key))
    }

    fn tags_path(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        validate_key(key)?;
        Ok(self.base_path.join(TAGS_DIR).join(format!("{key}.json")))
    }
}

async fn write_creating_parents(path: &Path, data: &[u8]) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, data).await
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        tags: &BlobTags,
    ) -> Result<String, ObjectStoreError> {
        let path = self.object_path(key)?;
        write_creating_parents(&path, &data).await?;

        let tag_json = serde_json::to_vec(tags)
            .map_err(|e| ObjectStoreError::Backend(format!("Failed to encode tags: {e}")))?;
        write_creating_parents(&self.tags_path(key)?, &tag_json).await?;

        Ok(format!("file://{}", path.display()))
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let path = self.object_path(key)?;
        if !path.exists() {
            return Err(ObjectStoreError::NotFound(key.to_string()));
        }
        let data = tokio::fs::read(&path).await?;
        Ok(Bytes::from(data))
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        let path = self.object_path(key)?;
        Ok(path.is_file())
    }

    async fn tags(&self, key: &str) -> Result<BlobTags, ObjectStoreError> {
        let path = self.tags_path(key)?;
        if !path.exists() {
            return Err(ObjectStoreError::NotFound(key.to_string()));
        }
        let data = tokio::fs::read(&path).await?;
        serde_json::from_slice(&data)
            .map_err(|e| ObjectStoreError::Backend(format!("Corrupt tag sidecar for {key}: {e}")))
    }
}
