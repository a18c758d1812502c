//! One generic executor for every report type: decode, upload, upsert, notify.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use thiserror::Error;
use tracing::Instrument;

use crate::naming::{FilenameCodec, NamingError, ReportFile, ReportPeriod};
use crate::notify::{DispatchSummary, FileRelay, RelayFile, RelayMode, WebhookNotifier};
use crate::partition::PartitionKey;
use crate::report::{Placement, ReportSpec};
use crate::storage::{Database, DatabaseError, MetadataRecord};
use crate::upload::{BlobUploader, UploadError, UploadedBlob};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to prepare metadata table {table}: {source}")]
    Setup {
        table: String,
        #[source]
        source: DatabaseError,
    },
    #[error("Failed to read download directory {}: {source}", .path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Template(#[from] NamingError),
}

/// Why a recognized file did not make it through.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("Failed to read file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Upload failed: {0}")]
    Upload(#[from] UploadError),
    #[error("Metadata upsert failed: {0}")]
    Metadata(#[from] DatabaseError),
    #[error("No partition for {0}")]
    Unplaced(String),
}

/// What happens to a download once it is safely stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Disposal {
    #[default]
    Keep,
    Delete,
    /// Move into this directory.
    Archive(PathBuf),
}

/// Divisions expected in a run, checked against what actually landed in the directory.
#[derive(Debug, Clone)]
pub struct Expectation {
    pub period: ReportPeriod,
    pub divisions: Vec<String>,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub run_id: String,
    pub uploaded: Vec<UploadedBlob>,
    /// Files that do not match the report template
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
    /// Expected filenames absent from the directory
    pub missing: Vec<String>,
    pub partitions: BTreeSet<PartitionKey>,
    pub notifications: DispatchSummary,
    /// Files forwarded through the relay; a batch counts once
    pub relayed: DispatchSummary,
    /// Downloads deleted or archived after a successful run
    pub disposed: Vec<String>,
}

pub struct Pipeline {
    spec: ReportSpec,
    codec: FilenameCodec,
    uploader: BlobUploader,
    db: Database,
    notifier: Option<WebhookNotifier>,
    relay: Option<FileRelay>,
    disposal: Disposal,
    expectation: Option<Expectation>,
}

impl Pipeline {
    pub fn new(
        spec: ReportSpec,
        uploader: BlobUploader,
        db: Database,
        notifier: Option<WebhookNotifier>,
    ) -> Result<Self, PipelineError> {
        if spec.template.shape.is_undated() && spec.placement == Placement::Dated {
            return Err(NamingError::InvalidTemplate(format!(
                "{} has no date segment and needs a fixed placement",
                spec.template
            ))
            .into());
        }
        let codec = FilenameCodec::new(spec.template.clone())?;
        Ok(Self {
            spec,
            codec,
            uploader,
            db,
            notifier,
            relay: None,
            disposal: Disposal::Keep,
            expectation: None,
        })
    }

    pub fn with_relay(mut self, relay: FileRelay) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn with_disposal(mut self, disposal: Disposal) -> Self {
        self.disposal = disposal;
        self
    }

    pub fn with_expectation(mut self, expectation: Expectation) -> Self {
        self.expectation = Some(expectation);
        self
    }

    /// Process every file in `dir`, strictly one after another.
    ///
    /// Only table setup and directory listing abort the run. A failure on an
    /// individual file is logged and the loop moves on to the next one.
    pub async fn run(&self, dir: &Path) -> Result<RunSummary, PipelineError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("run", run_id = %run_id, report = self.spec.name);
        self.run_inner(dir, run_id).instrument(span).await
    }

    async fn run_inner(&self, dir: &Path, run_id: String) -> Result<RunSummary, PipelineError> {
        self.db
            .ensure_table(self.spec.table)
            .map_err(|source| PipelineError::Setup {
                table: self.spec.table.to_string(),
                source,
            })?;

        let files = list_files(dir).await.map_err(|source| PipelineError::Directory {
            path: dir.to_path_buf(),
            source,
        })?;
        tracing::info!(dir = %dir.display(), count = files.len(), "Scanning downloads");

        let mut summary = RunSummary {
            run_id,
            ..Default::default()
        };

        // Stored files still waiting on the relay before they may be disposed of
        let mut stored = Vec::new();
        let mut batch = Vec::new();

        for name in &files {
            let Some(report) = self.codec.decode(name) else {
                tracing::warn!(file = %name, template = %self.spec.template, "Skipping unrecognized file");
                summary.skipped.push(name.clone());
                continue;
            };

            let data = match tokio::fs::read(dir.join(name)).await {
                Ok(data) => Bytes::from(data),
                Err(e) => {
                    let e = FileError::from(e);
                    tracing::error!(file = %name, error = %e, "Failed to relay file");
                    summary.failed.push((name.clone(), e.to_string()));
                    continue;
                }
            };

            match self.process(&report, data.clone()).await {
                Ok((blob, partition)) => {
                    summary.partitions.insert(partition);
                    summary.uploaded.push(blob);
                }
                Err(e) => {
                    tracing::error!(file = %name, error = %e, "Failed to relay file");
                    summary.failed.push((name.clone(), e.to_string()));
                    continue;
                }
            }

            match self.relay {
                Some(ref relay) if relay.mode() == RelayMode::PerFile => {
                    if relay_one(relay, &report, data, &mut summary.relayed).await {
                        stored.push(name.clone());
                    }
                }
                Some(_) => {
                    batch.push(RelayFile {
                        name: name.clone(),
                        data,
                    });
                    stored.push(name.clone());
                }
                None => stored.push(name.clone()),
            }
        }

        if let Some(ref relay) = self.relay {
            // In batch mode every stored file rides in the batch
            if !batch.is_empty() && !relay_batch(relay, &batch, &mut summary.relayed).await {
                stored.clear();
            }
        }

        summary.missing = self.missing_files(&files);

        if let Some(ref notifier) = self.notifier {
            summary.notifications = notifier.notify_all(&summary.partitions).await;
        }

        summary.disposed = self.dispose(dir, &stored).await;

        tracing::info!(
            uploaded = summary.uploaded.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            missing = summary.missing.len(),
            partitions = summary.partitions.len(),
            notified = summary.notifications.sent,
            relayed = summary.relayed.sent,
            disposed = summary.disposed.len(),
            "Run complete"
        );
        Ok(summary)
    }

    /// Upload then upsert. No transaction spans the two: an upsert failure leaves the blob in place.
    async fn process(
        &self,
        report: &ReportFile,
        data: Bytes,
    ) -> Result<(UploadedBlob, PartitionKey), FileError> {
        let partition = self
            .spec
            .placement
            .partition_key(report, self.spec.template.shape)
            .ok_or_else(|| FileError::Unplaced(report.file_name.clone()))?;
        let blob = self.uploader.upload(report, data).await?;

        let record = MetadataRecord {
            partition_key: partition.to_string(),
            row_key: report.row_key(),
            file_url: blob.url.clone(),
            file_name: report.file_name.clone(),
            division: report.division.clone(),
            state: report.state.clone(),
            month: report.date.map(|d| d.month.lower()),
            year: report.date.map(|d| d.year),
        };
        self.db.upsert(self.spec.table, &record)?;
        tracing::info!(
            partition = %record.partition_key,
            row = %record.row_key,
            "Metadata written"
        );

        Ok((blob, partition))
    }

    /// Delete or archive stored downloads. Errors are logged and the file stays put.
    async fn dispose(&self, dir: &Path, names: &[String]) -> Vec<String> {
        if self.disposal == Disposal::Keep || names.is_empty() {
            return Vec::new();
        }
        if let Disposal::Archive(ref archive) = self.disposal {
            if let Err(e) = tokio::fs::create_dir_all(archive).await {
                tracing::error!(dir = %archive.display(), error = %e, "Cannot create archive directory");
                return Vec::new();
            }
        }

        let mut disposed = Vec::new();
        for name in names {
            let path = dir.join(name);
            let result = match self.disposal {
                Disposal::Delete => tokio::fs::remove_file(&path).await,
                Disposal::Archive(ref archive) => tokio::fs::rename(&path, archive.join(name)).await,
                Disposal::Keep => Ok(()),
            };
            match result {
                Ok(()) => disposed.push(name.clone()),
                Err(e) => tracing::warn!(file = %name, error = %e, "Failed to dispose of download"),
            }
        }
        tracing::info!(count = disposed.len(), "Downloads disposed");
        disposed
    }

    fn missing_files(&self, present: &[String]) -> Vec<String> {
        let Some(ref expectation) = self.expectation else {
            return Vec::new();
        };
        // States cannot be predicted from divisions alone, and undated names carry a free label
        let shape = self.spec.template.shape;
        if shape.has_state() || shape.is_undated() {
            return Vec::new();
        }

        let present: HashSet<&str> = present.iter().map(String::as_str).collect();
        let mut missing = Vec::new();
        for division in &expectation.divisions {
            match self.codec.file_name_for(division, None, &expectation.period) {
                Ok(name) if !present.contains(name.as_str()) => {
                    tracing::warn!(division = %division, file = %name, "Expected download is missing");
                    missing.push(name);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(division = %division, error = %e, "Cannot name expected download"),
            }
        }
        missing
    }
}

/// Returns whether the file reached the relay.
async fn relay_one(
    relay: &FileRelay,
    report: &ReportFile,
    data: Bytes,
    counts: &mut DispatchSummary,
) -> bool {
    match relay.send_file(report, data).await {
        Ok(_) => {
            tracing::info!(file = %report.file_name, "File relayed");
            counts.sent += 1;
            true
        }
        Err(e) => {
            tracing::error!(file = %report.file_name, error = %e, "File relay failed");
            counts.failed += 1;
            false
        }
    }
}

async fn relay_batch(relay: &FileRelay, batch: &[RelayFile], counts: &mut DispatchSummary) -> bool {
    match relay.send_batch(batch).await {
        Ok(body) => {
            tracing::info!(count = batch.len(), response = %body, "Files relayed");
            counts.sent += 1;
            true
        }
        Err(e) => {
            tracing::error!(count = batch.len(), error = %e, "File relay failed");
            counts.failed += 1;
            false
        }
    }
}

/// Regular files in `dir`, sorted by name.
async fn list_files(dir: &Path) -> Result<Vec<String>, std::io::Error> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => tracing::warn!(file = ?raw, "Skipping non-UTF-8 filename"),
        }
    }
    names.sort();
    Ok(names)
}
