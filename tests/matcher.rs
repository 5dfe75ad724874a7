//! Confidence matcher integration tests

mod common;

use common::{ingested_job, orchestrator};
use stagegate::domain::MatchMethod;
use stagegate::matcher::ConfidenceMatcher;
use tempfile::TempDir;

#[tokio::test]
async fn test_ingest_stores_suggested_mapping() {
    let temp = TempDir::new().unwrap();
    let orchestrator = orchestrator(&temp);
    let job_id = ingested_job(&orchestrator).await;

    let view = orchestrator.get_job(job_id).await.unwrap();
    let mapping = view.job.mapping().unwrap();

    let sources: Vec<&str> = mapping.entries.iter().map(|e| e.source.as_str()).collect();
    assert_eq!(sources, vec!["hero", "portrait_shot", "logo"]);

    let hero = mapping.entry_for("hero").unwrap();
    assert_eq!(hero.target.as_deref(), Some("Hero"));
    assert_eq!(hero.method, MatchMethod::Exact);

    let portrait = mapping.entry_for("portrait_shot").unwrap();
    assert_eq!(portrait.target.as_deref(), Some("Portrait_Shot"));

    let logo = mapping.entry_for("logo").unwrap();
    assert!(logo.target.is_none());
    assert_eq!(logo.method, MatchMethod::Unmatched);
}

#[test]
fn test_layer_names_match_across_conventions() {
    let matcher = ConfidenceMatcher::default();
    let elements = vec![
        stagegate::domain::SourceElement::new("Headline_Text", 1200.0, 200.0),
        stagegate::domain::SourceElement::new("cta-button", 400.0, 120.0),
        stagegate::domain::SourceElement::new("bg", 1920.0, 1080.0),
    ];
    let slots = vec![
        stagegate::domain::TargetSlot::new("headline text", 1080.0, 180.0),
        stagegate::domain::TargetSlot::new("CTA Button", 360.0, 110.0),
        stagegate::domain::TargetSlot::new("Legal Copy", 900.0, 60.0),
    ];

    let mapping = matcher.match_elements(&elements, &slots);

    assert_eq!(
        mapping.entry_for("Headline_Text").unwrap().target.as_deref(),
        Some("headline text")
    );
    assert_eq!(
        mapping.entry_for("cta-button").unwrap().target.as_deref(),
        Some("CTA Button")
    );
    assert!(mapping.entry_for("bg").unwrap().target.is_none());
    assert!(mapping
        .accepted()
        .all(|e| e.confidence >= matcher.min_confidence()));
}
