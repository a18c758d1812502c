//! Blob naming and tagged uploads for decoded report files.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

use crate::naming::ReportFile;
use crate::object_store::{BlobTags, ObjectStore, ObjectStoreError};
use crate::report::Placement;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Filename sanitizes to nothing: {0:?}")]
    EmptyName(String),
    #[error("No date to place {0:?} under")]
    Undated(String),
    #[error(transparent)]
    Store(#[from] ObjectStoreError),
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedBlob {
    /// Full object key, container prefix included.
    pub key: String,
    pub url: String,
    pub tags: BlobTags,
}

/// Make a filename safe to use as a single path segment.
///
/// NFKD-normalizes, maps anything outside `[A-Za-z0-9_.-]` to `_`, collapses
/// underscore runs and trims underscores from both ends.
pub fn sanitize_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.nfkd() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('_').to_string()
}

/// `{year}/{mon}/{sanitized file name}`, or `{folder}/{sanitized file name}` for a fixed placement.
pub fn blob_path(file: &ReportFile, placement: &Placement) -> Result<String, UploadError> {
    let name = sanitize_file_name(&file.file_name);
    if name.is_empty() || name == "." || name == ".." {
        return Err(UploadError::EmptyName(file.file_name.clone()));
    }
    let folder = placement
        .folder(file)
        .ok_or_else(|| UploadError::Undated(file.file_name.clone()))?;
    Ok(format!("{folder}/{name}"))
}

/// Tags duplicated onto every blob so it can be found without the metadata table.
pub fn blob_tags(file: &ReportFile) -> BlobTags {
    let mut tags = BlobTags::new();
    tags.insert("division".to_string(), file.division.clone());
    if let Some(date) = file.date {
        tags.insert("month".to_string(), date.month.lower());
        tags.insert("year".to_string(), date.year.to_string());
    }
    if let Some(ref state) = file.state {
        tags.insert("state".to_string(), state.clone());
    }
    tags
}

/// Writes report files into one container of an [`ObjectStore`].
#[derive(Clone)]
pub struct BlobUploader {
    store: Arc<dyn ObjectStore>,
    container: String,
    placement: Placement,
}

impl BlobUploader {
    pub fn new(store: Arc<dyn ObjectStore>, container: &str, placement: Placement) -> Self {
        Self {
            store,
            container: container.to_string(),
            placement,
        }
    }

    /// Upload `data` for `file`. An existing blob at the same path is replaced.
    pub async fn upload(&self, file: &ReportFile, data: Bytes) -> Result<UploadedBlob, UploadError> {
        let key = format!("{}/{}", self.container, blob_path(file, &self.placement)?);
        let tags = blob_tags(file);
        let url = self.store.put(&key, data, &tags).await?;
        tracing::info!(key = %key, url = %url, "Uploaded blob");
        Ok(UploadedBlob { key, url, tags })
    }
}
