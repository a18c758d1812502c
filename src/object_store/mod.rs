mod gcs;
mod local;

pub use gcs::GcsStore;
pub use local::LocalStore;

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Searchable key/value tags attached to a blob at upload time.
pub type BlobTags = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Abstraction over object storage backends.
/// Keys are slash-separated paths; `put` overwrites whatever is already stored at the key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key` with `tags`, returning the blob's URL.
    async fn put(&self, key: &str, data: Bytes, tags: &BlobTags)
        -> Result<String, ObjectStoreError>;
    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError>;
    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError>;
    async fn tags(&self, key: &str) -> Result<BlobTags, ObjectStoreError>;
}

/// Reject keys that could escape a backend's namespace.
pub(crate) fn validate_key(key: &str) -> Result<(), ObjectStoreError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(ObjectStoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
