//! Tag Registry tests: enrollment, idempotence, archival, persistence

use slb_common::db::init::init_database;
use slb_common::handshake::Detection;
use slb_common::{Error, SampleMetadata, TagId, TagRegistry};

fn tag(id: &str) -> TagId {
    TagId::parse(id).unwrap()
}

fn metadata(sample_id: &str) -> SampleMetadata {
    SampleMetadata {
        sample_id: sample_id.to_string(),
        field_number: "F1".to_string(),
        project_number: "P-7".to_string(),
        sampled_by: "JR".to_string(),
        tested_by: "MK".to_string(),
        tests_run: "Gradation".to_string(),
    }
}

async fn open_registry(dir: &tempfile::TempDir) -> TagRegistry {
    let pool = init_database(&dir.path().join("slb.db")).await.unwrap();
    TagRegistry::new(pool)
}

#[tokio::test]
async fn test_enroll_then_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open_registry(&dir).await;
    let id = tag("04A1B2C3");

    assert!(!registry.exists(&id).await.unwrap());
    assert!(registry.lookup(&id).await.unwrap().is_none());

    let sample = registry.enroll(&id, metadata("S-100")).await.unwrap();
    assert_eq!(sample.uid, id);
    assert!(!sample.date_received.is_empty());

    assert!(registry.exists(&id).await.unwrap());
    let found = registry.lookup(&id).await.unwrap().unwrap();
    assert_eq!(found.metadata.sample_id, "S-100");
    assert_eq!(found.metadata.field_number, "F1");
    assert!(!found.is_archived());
}

#[tokio::test]
async fn test_second_enrollment_is_rejected_without_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open_registry(&dir).await;
    let id = tag("04A1B2C3");

    registry.enroll(&id, metadata("S-100")).await.unwrap();
    let before = registry.list_active().await.unwrap();

    let err = registry.enroll(&id, metadata("S-999")).await.unwrap_err();
    assert!(matches!(err, Error::RegistryWriteConflict(ref t) if *t == id));

    let after = registry.list_active().await.unwrap();
    assert_eq!(before, after);
    assert_eq!(after[0].metadata.sample_id, "S-100");
}

#[tokio::test]
async fn test_blank_metadata_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open_registry(&dir).await;

    let mut m = metadata("S-1");
    m.sampled_by = String::new();
    assert!(matches!(
        registry.enroll(&tag("0A0B"), m).await,
        Err(Error::InvalidInput(_))
    ));
    assert!(registry.list_active().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_archive_moves_sample() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open_registry(&dir).await;
    let keep = tag("0A0A");
    let gone = tag("0B0B");

    registry.enroll(&keep, metadata("S-1")).await.unwrap();
    registry.enroll(&gone, metadata("S-2")).await.unwrap();

    let archived = registry.archive(&gone).await.unwrap();
    assert!(archived.is_archived());
    assert_eq!(archived.metadata.sample_id, "S-2");

    let active = registry.list_active().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].uid, keep);

    let archive = registry.list_archived().await.unwrap();
    assert_eq!(archive.len(), 1);
    assert_eq!(archive[0].uid, gone);

    // Still counts as enrolled: detection takes the known path, re-enrollment conflicts
    assert!(registry.exists(&gone).await.unwrap());
    assert!(matches!(
        Detection::classify(&gone, &registry).await.unwrap(),
        Detection::Known(_)
    ));
    assert!(matches!(
        registry.enroll(&gone, metadata("S-3")).await,
        Err(Error::RegistryWriteConflict(_))
    ));
}

#[tokio::test]
async fn test_archive_unknown_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open_registry(&dir).await;

    assert!(matches!(
        registry.archive(&tag("0C0C")).await,
        Err(Error::NotFound(_))
    ));
    assert!(registry.list_archived().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_enrollment_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let id = tag("04A1B2C3");

    {
        let registry = open_registry(&dir).await;
        registry.enroll(&id, metadata("S-100")).await.unwrap();
    }

    let registry = open_registry(&dir).await;
    assert!(matches!(
        Detection::classify(&id, &registry).await.unwrap(),
        Detection::Known(_)
    ));
    assert_eq!(registry.enrolled_ids().await.unwrap(), vec![id]);
}
