//! Shared fixtures: an orchestrator rooted in a temp dir with stub collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use stagegate::adapters::{
    ArtifactGenerator, CollaboratorError, DirectoryPackager, DocumentLayout, DocumentParser,
    GenerationRequest, PreviewRenderer, TemplateLayout, TemplateParser,
};
use stagegate::config::paths::HomePaths;
use stagegate::domain::{
    GeneratedArtifact, JobDescriptor, Mapping, PreviewArtifact, SourceElement, TargetSlot,
};
use stagegate::Orchestrator;
use tempfile::TempDir;
use uuid::Uuid;

pub const ACTOR: &str = "reviewer@test";

/// hero (landscape), portrait_shot (portrait), logo (square)
pub fn elements() -> Vec<SourceElement> {
    vec![
        SourceElement::new("hero", 1920.0, 1080.0),
        SourceElement::new("portrait_shot", 1080.0, 1920.0),
        SourceElement::new("logo", 512.0, 512.0),
    ]
}

/// Both slots are landscape, so the name-matched portrait_shot lands cross-category
pub fn slots() -> Vec<TargetSlot> {
    vec![
        TargetSlot::new("Hero", 1920.0, 1080.0),
        TargetSlot::new("Portrait_Shot", 1920.0, 1080.0),
    ]
}

/// Parser returning fixed layouts for any reference
pub struct StubParser {
    pub warnings: Vec<String>,
}

#[async_trait]
impl DocumentParser for StubParser {
    fn name(&self) -> &str {
        "stub"
    }

    async fn parse_document(
        &self,
        _job_id: Uuid,
        _source: &str,
    ) -> Result<DocumentLayout, CollaboratorError> {
        Ok(DocumentLayout {
            elements: elements(),
            warnings: self.warnings.clone(),
        })
    }
}

#[async_trait]
impl TemplateParser for StubParser {
    fn name(&self) -> &str {
        "stub"
    }

    async fn parse_template(
        &self,
        _job_id: Uuid,
        _template: &str,
    ) -> Result<TemplateLayout, CollaboratorError> {
        Ok(TemplateLayout {
            slots: slots(),
            warnings: Vec::new(),
        })
    }
}

/// Generator that always fails with a fixed message
pub struct FailingGenerator {
    pub message: String,
}

#[async_trait]
impl ArtifactGenerator for FailingGenerator {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate(
        &self,
        _job_id: Uuid,
        _request: &GenerationRequest,
    ) -> Result<GeneratedArtifact, CollaboratorError> {
        Err(CollaboratorError::new("artifact_generator", &self.message))
    }
}

pub struct StubRenderer;

#[async_trait]
impl PreviewRenderer for StubRenderer {
    fn name(&self) -> &str {
        "stub"
    }

    async fn render(
        &self,
        job_id: Uuid,
        _artifact: &GeneratedArtifact,
    ) -> Result<PreviewArtifact, CollaboratorError> {
        Ok(PreviewArtifact {
            renderer: "stub".to_string(),
            location: format!("/previews/{}.mp4", job_id),
            metadata: serde_json::Value::Null,
        })
    }
}

/// Orchestrator with the stub parsers, renderer and a temp-dir packager
pub fn orchestrator(temp: &TempDir) -> Orchestrator {
    let paths = HomePaths::new(temp.path());
    Orchestrator::with_home(&paths)
        .with_document_parser(StubParser { warnings: Vec::new() })
        .with_template_parser(StubParser { warnings: Vec::new() })
        .with_renderer(StubRenderer)
        .with_packager(DirectoryPackager::new(paths.packages_dir()))
}

/// Create and ingest a job
pub async fn ingested_job(orchestrator: &Orchestrator) -> Uuid {
    let job = orchestrator
        .create_job(JobDescriptor::new("poster.json", "story.json"), ACTOR)
        .await
        .unwrap();
    orchestrator.ingest(job.id, ACTOR).await.unwrap();
    job.id
}

/// The matcher's suggestion, accepted as-is (blocks on portrait_shot)
pub async fn suggested_mapping(orchestrator: &Orchestrator, job_id: Uuid) -> Mapping {
    let view = orchestrator.get_job(job_id).await.unwrap();
    view.job.mapping().cloned().unwrap()
}

/// The suggestion with portrait_shot left unmapped (passes validation)
pub async fn clean_mapping(orchestrator: &Orchestrator, job_id: Uuid) -> Mapping {
    let mut mapping = suggested_mapping(orchestrator, job_id).await;
    mapping.assign("portrait_shot", None);
    mapping
}
