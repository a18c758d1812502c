//! Shared test helpers for in-crate pipeline tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::notify::WebhookNotifier;
use crate::object_store::LocalStore;
use crate::pipeline::Pipeline;
use crate::report::ReportKind;
use crate::storage::Database;
use crate::upload::BlobUploader;

/// Handles onto the backends a test pipeline writes to.
pub struct TestEnv {
    pub downloads: PathBuf,
    pub db: Database,
    pub store: Arc<LocalStore>,
}

/// Build a pipeline for `kind` over a temporary database, local object store and download directory.
pub fn test_pipeline(
    temp_dir: &tempfile::TempDir,
    kind: ReportKind,
    notifier: Option<WebhookNotifier>,
) -> (Pipeline, TestEnv) {
    let downloads = temp_dir.path().join("downloads");
    std::fs::create_dir_all(&downloads).expect("Failed to create download dir");

    let db = Database::open(temp_dir.path().join("data")).expect("Failed to open test database");
    let store = Arc::new(
        LocalStore::new(temp_dir.path().join("blobs")).expect("Failed to create test object store"),
    );

    let spec = kind.spec();
    let uploader = BlobUploader::new(store.clone(), spec.container, spec.placement);
    let pipeline =
        Pipeline::new(spec, uploader, db.clone(), notifier).expect("Failed to build pipeline");

    (
        pipeline,
        TestEnv {
            downloads,
            db,
            store,
        },
    )
}

pub fn write_file(dir: &Path, name: &str, data: &[u8]) {
    std::fs::write(dir.join(name), data).expect("Failed to write test file");
}
