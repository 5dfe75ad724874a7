//! Per-stage result payloads.
//!
//! Each accepted transition stores one payload under the stage it produced.
//! Collaborator output that the core does not interpret travels as
//! `serde_json::Value` and is stored verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::finding::ValidationFinding;
use super::job::JobDescriptor;
use super::layout::{SourceElement, TargetSlot};
use super::mapping::Mapping;

/// Payload carried by a transition request or a ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StagePayload {
    /// Job descriptor recorded at creation
    Created(JobDescriptor),

    /// Raw parser report; the core runs the matcher and stores `Ingested`
    Parsed(ParseReport),

    /// Parsed layout plus the automatic mapping
    Ingested(IngestRecord),

    /// Reviewer-approved mapping
    Mapping(Mapping),

    /// Result of a validation run
    Validation(ValidationRecord),

    /// Human override of a validation block
    Override(OverrideRecord),

    /// Generated automation artifact (one per attempt)
    Generated(GeneratedArtifact),

    /// Reviewer asked for another generation attempt
    RegenerationRequested(RegenerationRequest),

    /// Preview produced by the renderer for a generation attempt
    Preview(PreviewArtifact),

    /// Reviewer approved the rendered preview
    PreviewApproved(PreviewReceipt),

    /// Final packaging confirmation
    Packaged(PackageReceipt),

    /// Structured failure (collaborator error or administrative cancel)
    Failed(FailureReport),
}

impl StagePayload {
    /// Short label used in summaries and logs
    pub fn label(&self) -> &'static str {
        match self {
            StagePayload::Created(_) => "created",
            StagePayload::Parsed(_) => "parsed",
            StagePayload::Ingested(_) => "ingested",
            StagePayload::Mapping(_) => "mapping",
            StagePayload::Validation(_) => "validation",
            StagePayload::Override(_) => "override",
            StagePayload::Generated(_) => "generated",
            StagePayload::RegenerationRequested(_) => "regeneration_requested",
            StagePayload::Preview(_) => "preview",
            StagePayload::PreviewApproved(_) => "preview_approved",
            StagePayload::Packaged(_) => "packaged",
            StagePayload::Failed(_) => "failed",
        }
    }
}

/// What the document and template parsers report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseReport {
    pub elements: Vec<SourceElement>,
    pub slots: Vec<TargetSlot>,

    /// Partial failures (e.g. missing linked asset); recorded, never blocking
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Stored result of ingestion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestRecord {
    pub elements: Vec<SourceElement>,
    pub slots: Vec<TargetSlot>,

    /// Automatic mapping from the confidence matcher
    pub mapping: Mapping,

    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Stored result of a validation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub findings: Vec<ValidationFinding>,

    /// True when every entry may advance without a human
    pub can_auto_advance: bool,

    /// True when at least one critical finding exists
    pub blocked: bool,
}

/// Justification recorded with an override
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideRecord {
    pub reason: String,

    /// The critical findings the override accepted
    pub overridden: Vec<ValidationFinding>,
}

/// Automation artifact emitted by the generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    /// Generator name
    pub generator: String,

    /// Generated script / document body
    pub content: String,

    /// Generator-specific metadata, stored verbatim
    #[serde(default)]
    pub metadata: serde_json::Value,

    /// When the artifact was produced
    pub created_at: DateTime<Utc>,
}

impl GeneratedArtifact {
    pub fn new(generator: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            generator: generator.into(),
            content: content.into(),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegenerationRequest {
    #[serde(default)]
    pub note: Option<String>,
}

/// Preview produced by the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewArtifact {
    pub renderer: String,

    /// Where the rendered preview lives (path or URL)
    pub location: String,

    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviewReceipt {
    /// Preview that was approved (if known)
    #[serde(default)]
    pub preview: Option<String>,

    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageReceipt {
    /// Reference to the delivered package
    pub package: String,

    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Reason a job moved to `Failed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Collaborator that reported the failure (None for administrative cancel)
    #[serde(default)]
    pub collaborator: Option<String>,

    /// Message preserved verbatim
    pub message: String,
}

impl FailureReport {
    pub fn collaborator(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            collaborator: Some(collaborator.into()),
            message: message.into(),
        }
    }

    pub fn administrative(message: impl Into<String>) -> Self {
        Self {
            collaborator: None,
            message: message.into(),
        }
    }
}
