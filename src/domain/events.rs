//! Ledger entries for the append-only job ledger.
//!
//! Every stage transition, validation run and override decision is recorded
//! as an immutable entry. The ledger is the sole source of truth for what
//! happened to a job and when.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::finding::ValidationFinding;
use super::payload::StagePayload;
use super::stage::Stage;

/// A single entry in a job's ledger.
///
/// Job state is reconstructed by replaying entries in `seq` order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Monotonically increasing per job, starting at 1 (assigned on append)
    pub seq: u64,

    /// Unique identifier for this entry
    pub id: Uuid,

    /// When this entry was written (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The job this entry belongs to
    pub job_id: Uuid,

    /// What kind of record this is
    pub kind: EntryKind,

    /// Stage the job was in before this entry
    pub from_stage: Option<Stage>,

    /// Stage the job is in after this entry
    pub to_stage: Stage,

    /// Operation token of the request that produced this entry
    pub operation_token: String,

    /// Who caused the mutation
    pub actor: String,

    /// Human-readable summary (NO payload dumps)
    pub summary: String,

    /// Stage payload, if the entry carries one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<StagePayload>,

    /// Findings produced by a validation run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<ValidationFinding>,

    /// Error message if the job failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LedgerEntry {
    /// Create a new entry with the current timestamp (seq is assigned by the ledger)
    pub fn new(
        job_id: Uuid,
        kind: EntryKind,
        from_stage: Option<Stage>,
        to_stage: Stage,
        operation_token: impl Into<String>,
        actor: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            seq: 0,
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            job_id,
            kind,
            from_stage,
            to_stage,
            operation_token: operation_token.into(),
            actor: actor.into(),
            summary: summary.into(),
            payload: None,
            findings: Vec::new(),
            error: None,
        }
    }

    pub fn with_payload(mut self, payload: StagePayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_findings(mut self, findings: Vec<ValidationFinding>) -> Self {
        self.findings = findings;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Kinds of ledger entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Job record created (carries the job descriptor)
    JobCreated,

    /// Stage changed (or an attempt was appended within a stage)
    StageAdvanced,

    /// Validation produced critical findings; job halted at `Validated`
    ValidationBlocked,

    /// A human forced past a validation block
    OverrideApplied,

    /// Reviewer asked for another generation attempt
    RegenerationRequested,

    /// Renderer produced a preview
    PreviewRendered,

    /// Non-blocking problem (e.g. missing referenced asset)
    WarningRecorded,

    /// Job moved to the terminal `Failed` stage
    JobFailed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payload::FailureReport;

    #[test]
    fn test_entry_serialization() {
        let entry = LedgerEntry::new(
            Uuid::new_v4(),
            EntryKind::StageAdvanced,
            Some(Stage::Ingested),
            Stage::MatchReviewed,
            "op-1",
            "reviewer",
            "Mapping approved",
        );

        let json = serde_json::to_string(&entry).unwrap();
        let parsed: LedgerEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.kind, EntryKind::StageAdvanced);
        assert_eq!(parsed.to_stage, Stage::MatchReviewed);
        assert!(!json.contains("findings"));
    }

    #[test]
    fn test_entry_with_error() {
        let entry = LedgerEntry::new(
            Uuid::new_v4(),
            EntryKind::JobFailed,
            Some(Stage::Created),
            Stage::Failed,
            "op-2",
            "system",
            "Parse failed",
        )
        .with_payload(StagePayload::Failed(FailureReport::collaborator(
            "document_parser",
            "corrupt header",
        )))
        .with_error("corrupt header");

        assert_eq!(entry.error.as_deref(), Some("corrupt header"));
        assert!(entry.payload.is_some());
    }
}
