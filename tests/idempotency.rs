//! Idempotency Integration Tests
//!
//! Replayed operation tokens must return the original receipt without
//! writing, and concurrent writers to one job must be linearized.

mod common;

use std::sync::Arc;

use common::{clean_mapping, ingested_job, orchestrator, suggested_mapping, ACTOR};
use stagegate::core::{generate_operation_token, SubmitRequest};
use stagegate::domain::{EntryKind, JobDescriptor, ParseReport, Stage, StagePayload};
use stagegate::SubmitError;
use tempfile::TempDir;

#[tokio::test]
async fn test_duplicate_submit_is_replayed() {
    let temp = TempDir::new().unwrap();
    let orchestrator = orchestrator(&temp).with_auto_generate(false);
    let job_id = ingested_job(&orchestrator).await;

    let mapping = clean_mapping(&orchestrator, job_id).await;
    let request = SubmitRequest::new(job_id, Stage::Ingested, StagePayload::Mapping(mapping));

    let first = orchestrator.submit(request.clone()).await.unwrap();
    let ledger_len = orchestrator.get_job(job_id).await.unwrap().ledger.len();

    let second = orchestrator.submit(request).await.unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(second.stage, first.stage);
    assert_eq!(second.seq, first.seq);
    assert_eq!(second.findings, first.findings);
    assert_eq!(
        orchestrator.get_job(job_id).await.unwrap().ledger.len(),
        ledger_len
    );
}

#[tokio::test]
async fn test_replay_wins_over_stage_guard() {
    let temp = TempDir::new().unwrap();
    let orchestrator = orchestrator(&temp);
    let job_id = ingested_job(&orchestrator).await;

    let mapping = clean_mapping(&orchestrator, job_id).await;
    let request = SubmitRequest::new(job_id, Stage::Ingested, StagePayload::Mapping(mapping))
        .with_token("review-1");

    let first = orchestrator.submit(request.clone()).await.unwrap();
    assert_eq!(first.stage, Stage::Generated);

    // the job moves on before the retry arrives
    orchestrator.render_preview(job_id, ACTOR, None).await.unwrap();

    let retry = orchestrator.submit(request).await.unwrap();
    assert!(retry.replayed);
    assert_eq!(retry.stage, Stage::Generated);
    assert_eq!(retry.seq, first.seq);
}

#[tokio::test]
async fn test_blocked_receipt_replays_as_blocked() {
    let temp = TempDir::new().unwrap();
    let orchestrator = orchestrator(&temp);
    let job_id = ingested_job(&orchestrator).await;

    let mapping = suggested_mapping(&orchestrator, job_id).await;
    let request = SubmitRequest::new(job_id, Stage::Ingested, StagePayload::Mapping(mapping));

    let first = orchestrator.submit(request.clone()).await.unwrap();
    let second = orchestrator.submit(request).await.unwrap();

    assert!(first.blocked);
    assert!(second.blocked);
    assert!(second.replayed);
    assert_eq!(second.findings, first.findings);
}

#[tokio::test]
async fn test_earlier_mapping_resubmitted_is_a_new_review() {
    let temp = TempDir::new().unwrap();
    let orchestrator = orchestrator(&temp).with_auto_generate(false);
    let job_id = ingested_job(&orchestrator).await;

    let first = suggested_mapping(&orchestrator, job_id).await;
    let mut second = first.clone();
    second.assign("hero", None);

    let review = |from: Stage, mapping: &stagegate::domain::Mapping| {
        SubmitRequest::new(job_id, from, StagePayload::Mapping(mapping.clone()))
    };

    // both mappings keep portrait_shot cross-category, so every run blocks
    let r1 = orchestrator.submit(review(Stage::Ingested, &first)).await.unwrap();
    let r2 = orchestrator.submit(review(Stage::Validated, &second)).await.unwrap();
    let r3 = orchestrator.submit(review(Stage::Validated, &first)).await.unwrap();
    let r4 = orchestrator.submit(review(Stage::Validated, &second)).await.unwrap();

    for receipt in [&r1, &r2, &r3, &r4] {
        assert!(receipt.blocked);
        assert!(!receipt.replayed);
    }
    assert!(r4.seq > r3.seq);

    let view = orchestrator.get_job(job_id).await.unwrap();
    assert_eq!(view.job.last_seq, r4.seq);
    assert_eq!(view.job.mapping(), Some(&second));

    // an immediate retry of the latest review is still a replay
    let retry = orchestrator.submit(review(Stage::Validated, &second)).await.unwrap();
    assert!(retry.replayed);
    assert_eq!(retry.seq, r4.seq);
    assert_eq!(
        orchestrator.get_job(job_id).await.unwrap().ledger.len(),
        view.ledger.len()
    );
}

#[tokio::test]
async fn test_override_applies_once() {
    let temp = TempDir::new().unwrap();
    let orchestrator = orchestrator(&temp);
    let job_id = ingested_job(&orchestrator).await;

    let mapping = suggested_mapping(&orchestrator, job_id).await;
    orchestrator
        .submit(SubmitRequest::new(job_id, Stage::Ingested, StagePayload::Mapping(mapping)))
        .await
        .unwrap();

    let first = orchestrator
        .override_job(job_id, "client approved", ACTOR)
        .await
        .unwrap();
    let second = orchestrator
        .override_job(job_id, "client approved", ACTOR)
        .await
        .unwrap();

    assert!(second.replayed);
    assert_eq!(second.stage, first.stage);

    let view = orchestrator.get_job(job_id).await.unwrap();
    let overrides = view
        .ledger
        .iter()
        .filter(|e| e.kind == EntryKind::OverrideApplied)
        .count();
    let generations = view.job.generation_attempts().len();
    assert_eq!(overrides, 1);
    assert_eq!(generations, 1);

    // feedback is only recorded for the applied override
    assert_eq!(orchestrator.feedback().load().unwrap().len(), 1);
}

#[tokio::test]
async fn test_parsed_report_replay() {
    let temp = TempDir::new().unwrap();
    let orchestrator = orchestrator(&temp);
    let job = orchestrator
        .create_job(JobDescriptor::new("poster.json", "story.json"), ACTOR)
        .await
        .unwrap();

    let report = ParseReport {
        elements: common::elements(),
        slots: common::slots(),
        warnings: vec!["font substituted".to_string()],
    };
    let request = SubmitRequest::new(job.id, Stage::Created, StagePayload::Parsed(report));

    let first = orchestrator.submit(request.clone()).await.unwrap();
    let second = orchestrator.submit(request).await.unwrap();

    assert_eq!(first.stage, Stage::Ingested);
    assert!(second.replayed);

    let view = orchestrator.get_job(job.id).await.unwrap();
    assert_eq!(view.job.warnings.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_reviews_are_linearized() {
    let temp = TempDir::new().unwrap();
    let orchestrator = Arc::new(orchestrator(&temp).with_auto_generate(false));
    let job_id = ingested_job(&orchestrator).await;

    let clean = clean_mapping(&orchestrator, job_id).await;
    let suggested = suggested_mapping(&orchestrator, job_id).await;

    let a = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator
                .submit(SubmitRequest::new(job_id, Stage::Ingested, StagePayload::Mapping(clean)))
                .await
        })
    };
    let b = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator
                .submit(SubmitRequest::new(
                    job_id,
                    Stage::Ingested,
                    StagePayload::Mapping(suggested),
                ))
                .await
        })
    };

    let results = vec![a.await.unwrap(), b.await.unwrap()];
    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(SubmitError::StageMismatch { .. })))
        .count();

    assert_eq!(accepted, 1);
    assert_eq!(rejected, 1);

    let view = orchestrator.get_job(job_id).await.unwrap();
    let reviews = view
        .ledger
        .iter()
        .filter(|e| e.to_stage == Stage::MatchReviewed)
        .count();
    assert_eq!(reviews, 1);
}

#[test]
fn test_operation_token_depends_on_payload() {
    let job_id = uuid::Uuid::new_v4();
    let a = generate_operation_token(job_id, Stage::Ingested, "{\"a\":1}");
    let b = generate_operation_token(job_id, Stage::Ingested, "{\"a\":2}");
    let c = generate_operation_token(job_id, Stage::Validated, "{\"a\":1}");

    assert_ne!(a, b);
    assert_ne!(a, c);
    assert_eq!(a, generate_operation_token(job_id, Stage::Ingested, "{\"a\":1}"));
}
