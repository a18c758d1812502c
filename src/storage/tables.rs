use redb::TableDefinition;

/// Registry of ensured report tables: table name -> creation time (unix seconds)
pub const REPORT_TABLES: TableDefinition<&str, i64> = TableDefinition::new("report_tables");

/// Physical redb table backing a report table: (partition_key, row_key) -> MetadataRecord (msgpack)
pub fn records_table(name: &str) -> TableDefinition<'_, (&'static str, &'static str), &'static [u8]> {
    TableDefinition::new(name)
}
