use redb::{ReadableTable, TableError};

use super::db::{validate_table_name, Database, DatabaseError};
use super::models::MetadataRecord;
use super::tables::*;

impl Database {
    // ========================================================================
    // Table lifecycle
    // ========================================================================

    /// Create a report table if it does not exist yet. An existing table is success.
    pub fn ensure_table(&self, name: &str) -> Result<(), DatabaseError> {
        validate_table_name(name)?;

        let write_txn = self.begin_write()?;
        {
            let mut registry = write_txn.open_table(REPORT_TABLES)?;
            if registry.get(name)?.is_none() {
                registry.insert(name, chrono::Utc::now().timestamp())?;
                tracing::info!(table = name, "Created metadata table");
            }
            let _ = write_txn.open_table(records_table(name))?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn table_exists(&self, name: &str) -> Result<bool, DatabaseError> {
        let read_txn = self.begin_read()?;
        let registry = read_txn.open_table(REPORT_TABLES)?;
        Ok(registry.get(name)?.is_some())
    }

    /// Names of all ensured tables, sorted.
    pub fn list_tables(&self) -> Result<Vec<String>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let registry = read_txn.open_table(REPORT_TABLES)?;
        registry
            .iter()?
            .map(|r| r.map(|(k, _)| k.value().to_string()).map_err(Into::into))
            .collect()
    }

    // ========================================================================
    // Record operations
    // ========================================================================

    /// Insert or fully replace the record at `(record.partition_key, record.row_key)`.
    ///
    /// No read-before-write: the last committed write wins. Writers inside this
    /// process are serialized by redb; separate processes sharing a store are not
    /// coordinated, so concurrent upserts of the same key are racy.
    pub fn upsert(&self, table: &str, record: &MetadataRecord) -> Result<(), DatabaseError> {
        debug_assert!(
            !record.partition_key.is_empty(),
            "partition key must not be empty"
        );
        debug_assert!(!record.row_key.is_empty(), "row key must not be empty");

        if !self.table_exists(table)? {
            return Err(DatabaseError::UnknownTable(table.to_string()));
        }

        let write_txn = self.begin_write()?;
        {
            let mut records = write_txn.open_table(records_table(table))?;
            let data = rmp_serde::to_vec_named(record)?;
            records.insert(
                (record.partition_key.as_str(), record.row_key.as_str()),
                data.as_slice(),
            )?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<MetadataRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let records = match read_txn.open_table(records_table(table)) {
            Ok(t) => t,
            Err(TableError::TableDoesNotExist(_)) => {
                return Err(DatabaseError::UnknownTable(table.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        match records.get((partition_key, row_key))? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    /// All records of one partition, ordered by row key.
    pub fn list_partition(
        &self,
        table: &str,
        partition_key: &str,
    ) -> Result<Vec<MetadataRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let records = match read_txn.open_table(records_table(table)) {
            Ok(t) => t,
            Err(TableError::TableDoesNotExist(_)) => {
                return Err(DatabaseError::UnknownTable(table.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        // Keys sort by partition first, so one partition is a contiguous run
        let mut out = Vec::new();
        for result in records.range((partition_key, "")..)? {
            let (key, value) = result?;
            let (partition, _) = key.value();
            if partition != partition_key {
                break;
            }
            out.push(rmp_serde::from_slice(value.value())?);
        }
        Ok(out)
    }
}
