//! Collaborator interfaces for external systems.
//!
//! Parsing, generation, rendering and packaging are done outside the core.
//! The orchestrator calls them through these traits with the job id and
//! stores whatever they return verbatim. Timeouts and retries belong to the
//! adapter, never to the core.

pub mod generator;
pub mod layout;
pub mod packager;
pub mod renderer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    GeneratedArtifact, Mapping, PackageReceipt, PreviewArtifact, SourceElement, TargetSlot,
};

pub use generator::ScriptGenerator;
pub use layout::JsonLayoutParser;
pub use packager::DirectoryPackager;
pub use renderer::CommandRenderer;

/// Structured failure reported by a collaborator
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{collaborator}: {message}")]
pub struct CollaboratorError {
    /// Which collaborator failed
    pub collaborator: String,

    /// Message preserved verbatim
    pub message: String,
}

impl CollaboratorError {
    pub fn new(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }
}

/// Named elements extracted from a source document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentLayout {
    pub elements: Vec<SourceElement>,

    /// Partial failures (missing linked asset and the like)
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Named slots extracted from a target template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateLayout {
    pub slots: Vec<TargetSlot>,

    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Input handed to the artifact generator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    /// The frozen mapping
    pub mapping: Mapping,
    pub elements: Vec<SourceElement>,
    pub slots: Vec<TargetSlot>,

    /// 1 for the first attempt
    pub attempt: usize,

    /// Reviewer note from the regeneration request, if any
    pub note: Option<String>,
}

#[async_trait]
pub trait DocumentParser: Send + Sync {
    fn name(&self) -> &str;

    async fn parse_document(
        &self,
        job_id: Uuid,
        source: &str,
    ) -> Result<DocumentLayout, CollaboratorError>;
}

#[async_trait]
pub trait TemplateParser: Send + Sync {
    fn name(&self) -> &str;

    async fn parse_template(
        &self,
        job_id: Uuid,
        template: &str,
    ) -> Result<TemplateLayout, CollaboratorError>;
}

/// Emits the automation script for a frozen mapping
#[async_trait]
pub trait ArtifactGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        job_id: Uuid,
        request: &GenerationRequest,
    ) -> Result<GeneratedArtifact, CollaboratorError>;
}

/// Renders a preview of a generated artifact
#[async_trait]
pub trait PreviewRenderer: Send + Sync {
    fn name(&self) -> &str;

    async fn render(
        &self,
        job_id: Uuid,
        artifact: &GeneratedArtifact,
    ) -> Result<PreviewArtifact, CollaboratorError>;
}

/// Produces the final deliverable
#[async_trait]
pub trait Packager: Send + Sync {
    fn name(&self) -> &str;

    async fn package(
        &self,
        job_id: Uuid,
        artifact: &GeneratedArtifact,
    ) -> Result<PackageReceipt, CollaboratorError>;
}
