//! Batch coordinator integration tests

mod common;

use std::path::PathBuf;

use common::{orchestrator, ACTOR};
use stagegate::batch::{batch_status, create_batch, BatchStore, ManifestError};
use stagegate::domain::Stage;
use tempfile::TempDir;

fn write_manifest(temp: &TempDir, body: &str) -> PathBuf {
    let path = temp.path().join("manifest.yaml");
    std::fs::write(&path, body).unwrap();
    path
}

#[tokio::test]
async fn test_create_batch_and_status() {
    let temp = TempDir::new().unwrap();
    let orchestrator = orchestrator(&temp);
    let batches = BatchStore::new(temp.path().join("batches"));

    let manifest = write_manifest(
        &temp,
        r#"
name: spring-campaign
client: Acme
project: Spring
jobs:
  - source: poster.json
    template: story.json
  - source: poster.json
    template: square.json
    metadata:
      client: Acme Europe
      priority: high
"#,
    );

    let batch = create_batch(&orchestrator, &batches, &manifest, ACTOR)
        .await
        .unwrap();
    assert_eq!(batch.name, "spring-campaign");
    assert_eq!(batch.job_ids.len(), 2);

    // record persisted and readable
    let loaded = batches.load(batch.id).unwrap();
    assert_eq!(loaded.job_ids, batch.job_ids);

    let first = orchestrator.get_job(batch.job_ids[0]).await.unwrap().job;
    assert_eq!(first.descriptor.batch_id, Some(batch.id));
    assert_eq!(first.descriptor.metadata.client.as_deref(), Some("Acme"));
    assert_eq!(first.descriptor.metadata.project.as_deref(), Some("Spring"));
    assert_eq!(
        PathBuf::from(&first.descriptor.source),
        temp.path().join("poster.json")
    );

    let second = orchestrator.get_job(batch.job_ids[1]).await.unwrap().job;
    assert_eq!(second.descriptor.metadata.client.as_deref(), Some("Acme Europe"));
    assert_eq!(second.descriptor.metadata.priority.as_deref(), Some("high"));

    let status = batch_status(&orchestrator, &batches, batch.id).await.unwrap();
    assert_eq!(status.total, 2);
    assert_eq!(status.count(Stage::Created), 2);

    orchestrator.ingest(batch.job_ids[0], ACTOR).await.unwrap();
    orchestrator
        .fail_job(batch.job_ids[1], Stage::Created, "dropped by client", ACTOR)
        .await
        .unwrap();

    let status = batch_status(&orchestrator, &batches, batch.id).await.unwrap();
    assert_eq!(status.count(Stage::Ingested), 1);
    assert_eq!(status.count(Stage::Failed), 1);
    assert_eq!(status.count(Stage::Created), 0);
    assert!(!status.is_settled());
}

#[tokio::test]
async fn test_invalid_manifest_creates_nothing() {
    let temp = TempDir::new().unwrap();
    let orchestrator = orchestrator(&temp);
    let batches = BatchStore::new(temp.path().join("batches"));

    let manifest = write_manifest(
        &temp,
        r#"
name: dupes
jobs:
  - source: a.json
    template: t.json
  - source: a.json
    template: t.json
"#,
    );

    let err = create_batch(&orchestrator, &batches, &manifest, ACTOR)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ManifestError>(),
        Some(ManifestError::DuplicateJob { .. })
    ));

    let jobs = orchestrator.list_jobs(&Default::default()).await.unwrap();
    assert!(jobs.is_empty());
}

#[tokio::test]
async fn test_status_of_unknown_batch() {
    let temp = TempDir::new().unwrap();
    let orchestrator = orchestrator(&temp);
    let batches = BatchStore::new(temp.path().join("batches"));

    assert!(batch_status(&orchestrator, &batches, uuid::Uuid::new_v4())
        .await
        .is_err());
}
