use report_relay::storage::{Database, DatabaseError, MetadataRecord};

fn test_db() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    (dir, db)
}

fn sample_record(partition: &str, division: &str, url: &str) -> MetadataRecord {
    MetadataRecord {
        partition_key: partition.to_string(),
        row_key: division.to_string(),
        file_url: url.to_string(),
        file_name: format!("Daily_Visit_{division}_Jul-2025.xlsx"),
        division: division.to_string(),
        state: None,
        month: Some("jul".to_string()),
        year: Some(2025),
    }
}

#[test]
fn test_ensure_table_is_idempotent() {
    let (_dir, db) = test_db();

    db.ensure_table("employeevisit").unwrap();
    db.upsert(
        "employeevisit",
        &sample_record("2025-jul", "Elbrit", "file:///a"),
    )
    .unwrap();

    // Second call must neither fail nor drop existing rows
    db.ensure_table("employeevisit").unwrap();
    assert!(db
        .get("employeevisit", "2025-jul", "Elbrit")
        .unwrap()
        .is_some());
    assert_eq!(db.list_tables().unwrap(), vec!["employeevisit".to_string()]);
}

#[test]
fn test_ensure_table_rejects_invalid_names() {
    let (_dir, db) = test_db();

    for name in ["", "ab", "1visits", "employee-visit", "report_tables", "x".repeat(64).as_str()] {
        assert!(
            matches!(
                db.ensure_table(name),
                Err(DatabaseError::InvalidTableName(_))
            ),
            "accepted {name:?}"
        );
    }
    assert!(db.list_tables().unwrap().is_empty());
}

#[test]
fn test_upsert_requires_ensured_table() {
    let (_dir, db) = test_db();
    let result = db.upsert("visit", &sample_record("2025-jul", "Elbrit", "u"));
    assert!(matches!(result, Err(DatabaseError::UnknownTable(_))));
    assert!(matches!(
        db.get("visit", "2025-jul", "Elbrit"),
        Err(DatabaseError::UnknownTable(_))
    ));
}

#[test]
fn test_upsert_is_idempotent() {
    let (_dir, db) = test_db();
    db.ensure_table("visit").unwrap();

    let record = sample_record("2025-jul", "AP ELBRIT", "file:///blob");
    db.upsert("visit", &record).unwrap();
    db.upsert("visit", &record).unwrap();

    let rows = db.list_partition("visit", "2025-jul").unwrap();
    assert_eq!(rows, vec![record]);
}

#[test]
fn test_upsert_replaces_whole_record() {
    let (_dir, db) = test_db();
    db.ensure_table("secondary").unwrap();

    let mut first = sample_record("2025-jul", "Elbrit-Kerala", "file:///run1");
    first.division = "Elbrit".to_string();
    first.state = Some("Kerala".to_string());
    db.upsert("secondary", &first).unwrap();

    // Same key, no state: the stored state must not survive
    let second = sample_record("2025-jul", "Elbrit-Kerala", "file:///run2");
    db.upsert("secondary", &second).unwrap();

    let stored = db
        .get("secondary", "2025-jul", "Elbrit-Kerala")
        .unwrap()
        .unwrap();
    assert_eq!(stored, second);
    assert_eq!(stored.state, None);
}

#[test]
fn test_list_partition_scopes_by_partition() {
    let (_dir, db) = test_db();
    db.ensure_table("pob").unwrap();

    db.upsert("pob", &sample_record("2025-jul", "VASCO", "u1")).unwrap();
    db.upsert("pob", &sample_record("2025-jul", "Elbrit", "u2")).unwrap();
    db.upsert("pob", &sample_record("2025-jun", "Elbrit", "u3")).unwrap();
    // A partition that is a string prefix of another must not leak in
    db.upsert("pob", &sample_record("2025-jul-01", "Elbrit", "u4")).unwrap();

    // Partitions sorting on either side of the one asked for
    db.upsert("pob", &sample_record("2025-jan", "Zeta", "u5")).unwrap();
    db.upsert("pob", &sample_record("2025-juz", "Alpha", "u6")).unwrap();

    let rows = db.list_partition("pob", "2025-jul").unwrap();
    let urls: Vec<&str> = rows.iter().map(|r| r.file_url.as_str()).collect();
    assert_eq!(urls, vec!["u2", "u1"]);

    let rows = db.list_partition("pob", "2025-jan").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].file_url, "u5");

    assert!(db.list_partition("pob", "2024-jan").unwrap().is_empty());
}

#[test]
fn test_tables_are_isolated() {
    let (_dir, db) = test_db();
    db.ensure_table("support").unwrap();
    db.ensure_table("supportitem").unwrap();

    db.upsert("support", &sample_record("2025-jul", "Elbrit", "support-url"))
        .unwrap();

    assert!(db.get("supportitem", "2025-jul", "Elbrit").unwrap().is_none());
    assert_eq!(
        db.list_tables().unwrap(),
        vec!["support".to_string(), "supportitem".to_string()]
    );
}

#[test]
fn test_records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = Database::open(dir.path()).unwrap();
        db.ensure_table("service").unwrap();
        db.upsert("service", &sample_record("2025-jul", "Elbrit", "persisted"))
            .unwrap();
    }

    let db = Database::open(dir.path()).unwrap();
    let stored = db.get("service", "2025-jul", "Elbrit").unwrap().unwrap();
    assert_eq!(stored.file_url, "persisted");
}
