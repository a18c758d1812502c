//! report-relay - moves downloaded ERP report exports into storage and tells downstream workflows
//!
//! A run takes one directory of downloads for one report type and:
//! - decodes each filename into division / state / month / year, skipping foreign files
//! - uploads the file to object storage under `{container}/{year}/{month}/` (or a fixed folder for undated reports), tagged with the same dimensions
//! - upserts a pointer to the blob into a redb-backed metadata table keyed by (partition, row)
//! - posts one "drop" webhook per year-month partition touched
//! - optionally relays the files to a workflow webhook and clears them from the download directory

pub mod config;
pub mod naming;
pub mod notify;
pub mod object_store;
pub mod partition;
pub mod pipeline;
pub mod report;
pub mod storage;
#[cfg(test)]
pub mod testutil;
pub mod upload;
