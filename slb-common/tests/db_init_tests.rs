//! Tests for database initialization and recovery

use slb_common::db::init::{init_database, SCHEMA_VERSION};

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sub").join("slb.db");

    let pool = init_database(&db_path).await;
    assert!(pool.is_ok(), "Database initialization failed: {:?}", pool.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("slb.db");

    let pool1 = init_database(&db_path).await.unwrap();
    sqlx::query("INSERT INTO scan_status (uid, updated_at) VALUES ('0A0B', '2025-01-01 00:00:00+00:00')")
        .execute(&pool1)
        .await
        .unwrap();
    pool1.close().await;

    // Second open (the other process) keeps the data
    let pool2 = init_database(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scan_status")
        .fetch_one(&pool2)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_schema_tables_exist() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("slb.db")).await.unwrap();

    for table in ["scan_status", "samples", "archived_samples", "schema_version"] {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(exists, "missing table {}", table);
    }

    let version: i64 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(version, SCHEMA_VERSION);
}

#[tokio::test]
async fn test_corrupt_database_is_replaced_with_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("slb.db");
    std::fs::write(&db_path, vec![0x5a_u8; 8192]).unwrap();

    let pool = init_database(&db_path).await;
    assert!(pool.is_ok(), "Corrupt database should be recovered: {:?}", pool.err());
    let pool = pool.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scan_status")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);

    let quarantined = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .any(|e| e.file_name().to_string_lossy().starts_with("slb.db.corrupt-"));
    assert!(quarantined, "Corrupt file should be kept aside");
}
