//! Scan State Store tests
//!
//! Covers the read/upsert contract and the single-writer guarantees: within
//! one process (shared writer task) and across two processes (two stores on
//! the same database file).

use slb_common::db::init::init_database;
use slb_common::handshake::{prompt_target, ScanView};
use slb_common::{Error, HandshakePhase, ScanMutation, ScanStateStore, TagId};
use std::path::Path;

fn tag(id: &str) -> TagId {
    TagId::parse(id).unwrap()
}

async fn open_store(db_path: &Path) -> ScanStateStore {
    let pool = init_database(db_path).await.expect("database should initialize");
    ScanStateStore::spawn(pool)
}

#[tokio::test]
async fn test_get_absent_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir.path().join("slb.db")).await;

    assert!(store.get(&tag("04A1B2C3")).await.unwrap().is_none());
    assert!(store.scan_all().await.unwrap().is_empty());
    assert!(store.pending().await.unwrap().is_none());
}

#[tokio::test]
async fn test_upsert_creates_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir.path().join("slb.db")).await;
    let id = tag("04A1B2C3");

    let record = store.upsert(&id, |r| r.host_scanning = true).await.unwrap();
    assert_eq!(record.id, id);
    assert!(record.host_scanning);
    assert!(!record.pending_enrollment);

    let stored = store.get(&id).await.unwrap().expect("record should exist");
    assert_eq!(stored.host_scanning, true);
    assert_eq!(stored.web_acknowledged, false);
}

#[tokio::test]
async fn test_upsert_touches_only_its_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir.path().join("slb.db")).await;

    store.apply(&tag("0A"), ScanMutation::MarkPresent).await.unwrap();
    store.apply(&tag("0B"), ScanMutation::RequestEnrollment).await.unwrap();
    store.apply(&tag("0A"), ScanMutation::ClearPresence).await.unwrap();

    let all = store.scan_all().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, tag("0A"));
    assert!(all[0].is_idle());
    assert_eq!(HandshakePhase::of(Some(&all[1])), HandshakePhase::PendingEnrollment);

    let pending = store.pending().await.unwrap().unwrap();
    assert_eq!(pending.id, tag("0B"));
}

#[tokio::test]
async fn test_refused_mutation_leaves_store_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir.path().join("slb.db")).await;

    // Not pending and not even present: no record must be created
    let err = store
        .apply(&tag("FFFFFFFF"), ScanMutation::Acknowledge)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownAcknowledgmentTarget { .. }));
    assert!(store.get(&tag("FFFFFFFF")).await.unwrap().is_none());

    // Existing record keeps its flags
    store.apply(&tag("0A"), ScanMutation::MarkPresent).await.unwrap();
    let before = store.get(&tag("0A")).await.unwrap().unwrap();
    assert!(store.apply(&tag("0A"), ScanMutation::Acknowledge).await.is_err());
    let after = store.get(&tag("0A")).await.unwrap().unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_concurrent_mutations_in_one_process_both_land() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir.path().join("slb.db")).await;
    let id = tag("04A1B2C3");
    store.apply(&id, ScanMutation::RequestEnrollment).await.unwrap();

    // Host re-marks presence while the web acknowledges
    let host = {
        let store = store.clone();
        let id = id.clone();
        tokio::spawn(async move { store.upsert(&id, |r| r.host_scanning = true).await })
    };
    let web = {
        let store = store.clone();
        let id = id.clone();
        tokio::spawn(async move { store.apply(&id, ScanMutation::Acknowledge).await })
    };
    host.await.unwrap().unwrap();
    web.await.unwrap().unwrap();

    let record = store.get(&id).await.unwrap().unwrap();
    assert!(record.web_acknowledged, "acknowledgment must not be lost");
    assert!(record.host_scanning, "host write must not be lost");
    assert!(!record.pending_enrollment);
}

#[tokio::test]
async fn test_two_processes_do_not_lose_updates() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("slb.db");

    // Separate pools and writer tasks, as in slb-host and slb-web
    let host = open_store(&db_path).await;
    let web = open_store(&db_path).await;

    let ids: Vec<TagId> = (0..8).map(|i| tag(&format!("{:02X}", i))).collect();

    let mut handles = Vec::new();
    for id in ids.clone() {
        let host = host.clone();
        handles.push(tokio::spawn(async move {
            host.upsert(&id, |r| r.host_scanning = true).await
        }));
    }
    for id in ids.clone() {
        let web = web.clone();
        handles.push(tokio::spawn(async move {
            web.upsert(&id, |r| r.web_acknowledged = true).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let all = web.scan_all().await.unwrap();
    assert_eq!(all.len(), ids.len());
    for record in all {
        assert!(record.host_scanning, "{} lost the host write", record.id);
        assert!(record.web_acknowledged, "{} lost the web write", record.id);
    }
}

#[tokio::test]
async fn test_ensure_records_keeps_existing_flags() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir.path().join("slb.db")).await;

    store.apply(&tag("0A"), ScanMutation::MarkPresent).await.unwrap();
    let created = store.ensure_records(&[tag("0A"), tag("0B")]).await.unwrap();
    assert_eq!(created, 1);

    assert!(store.get(&tag("0A")).await.unwrap().unwrap().host_scanning);
    assert!(store.get(&tag("0B")).await.unwrap().unwrap().is_idle());
}

#[tokio::test]
async fn test_unreadable_row_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("slb.db")).await.unwrap();
    sqlx::query("INSERT INTO scan_status (uid, updated_at) VALUES ('not hex', 'x')")
        .execute(&pool)
        .await
        .unwrap();

    let store = ScanStateStore::spawn(pool);
    match store.scan_all().await {
        Err(Error::StoreUnreadable(_)) => {}
        other => panic!("expected StoreUnreadable, got {:?}", other.map(|r| r.len())),
    }
}

#[tokio::test]
async fn test_pending_agrees_with_view_when_two_prompts_open() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir.path().join("slb.db")).await;

    // The higher id is requested first, so uid order and age disagree
    store.apply(&tag("0B"), ScanMutation::RequestEnrollment).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    store.apply(&tag("0A"), ScanMutation::RequestEnrollment).await.unwrap();

    let pending = store.pending().await.unwrap().expect("a prompt is open");
    let all = store.scan_all().await.unwrap();
    assert_eq!(pending.id, tag("0B"));
    assert_eq!(prompt_target(&all).map(|r| r.id.clone()), Some(tag("0B")));
    assert_eq!(ScanView::from_records(&all).pending, Some(tag("0B")));
}
