//! Job state and reconstruction from the ledger.
//!
//! A Job is one creative-production work item moving through the fixed
//! stage sequence. Its state is never stored separately: it is the fold of
//! its ledger entries.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{EntryKind, LedgerEntry};
use super::finding::ValidationFinding;
use super::mapping::Mapping;
use super::payload::{FailureReport, GeneratedArtifact, IngestRecord, StagePayload};
use super::stage::Stage;

/// Free-form job metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,

    /// Anything else the submitter wants to carry along
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
}

impl JobMetadata {
    /// Fill unset fields from `defaults`
    pub fn or_defaults(mut self, defaults: &JobMetadata) -> Self {
        if self.client.is_none() {
            self.client = defaults.client.clone();
        }
        if self.project.is_none() {
            self.project = defaults.project.clone();
        }
        if self.priority.is_none() {
            self.priority = defaults.priority.clone();
        }
        for (key, value) in &defaults.extra {
            self.extra.entry(key.clone()).or_insert_with(|| value.clone());
        }
        self
    }
}

/// Everything needed to create a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Batch this job belongs to (None for standalone submissions)
    #[serde(default)]
    pub batch_id: Option<Uuid>,

    /// Reference to the source document artifact
    pub source: String,

    /// Reference to the target template artifact
    pub template: String,

    #[serde(default)]
    pub metadata: JobMetadata,
}

impl JobDescriptor {
    pub fn new(source: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            batch_id: None,
            source: source.into(),
            template: template.into(),
            metadata: JobMetadata::default(),
        }
    }

    pub fn in_batch(mut self, batch_id: Uuid) -> Self {
        self.batch_id = Some(batch_id);
        self
    }

    pub fn with_metadata(mut self, metadata: JobMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A creative-production job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,

    #[serde(flatten)]
    pub descriptor: JobDescriptor,

    /// Current lifecycle stage
    pub stage: Stage,

    /// Halted at `Validated` on critical findings
    pub blocked: bool,

    /// Per-stage payload history; later attempts are appended, never overwritten
    pub payloads: BTreeMap<Stage, Vec<StagePayload>>,

    /// Findings of the most recent validation run
    pub findings: Vec<ValidationFinding>,

    /// Non-blocking warnings recorded along the way
    pub warnings: Vec<String>,

    /// Set when a human forced past the current validation block
    pub overridden: bool,

    /// Justification of the most recent override
    pub override_reason: Option<String>,

    /// Why the job failed (terminal)
    pub failure: Option<FailureReport>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Actor of the last mutation
    pub last_actor: String,

    /// Sequence number of the last applied ledger entry
    pub last_seq: u64,
}

impl Job {
    /// Reconstruct job state from its ledger entries
    pub fn from_entries(entries: &[LedgerEntry]) -> Option<Self> {
        let first = entries.first()?;

        let descriptor = match first.payload {
            Some(StagePayload::Created(ref descriptor)) => descriptor.clone(),
            _ => return None,
        };

        let mut job = Self {
            id: first.job_id,
            descriptor,
            stage: Stage::Created,
            blocked: false,
            payloads: BTreeMap::new(),
            findings: Vec::new(),
            warnings: Vec::new(),
            overridden: false,
            override_reason: None,
            failure: None,
            created_at: first.timestamp,
            updated_at: first.timestamp,
            last_actor: first.actor.clone(),
            last_seq: first.seq,
        };

        for entry in &entries[1..] {
            job.apply_entry(entry);
        }

        Some(job)
    }

    /// Apply a single ledger entry to update job state
    pub fn apply_entry(&mut self, entry: &LedgerEntry) {
        match entry.kind {
            EntryKind::JobCreated => {}
            EntryKind::StageAdvanced => {
                if entry.to_stage == Stage::MatchReviewed {
                    // a fresh review supersedes the previous validation run
                    self.blocked = false;
                    self.overridden = false;
                }
                if entry.to_stage == Stage::Validated {
                    self.blocked = false;
                    self.findings = entry.findings.clone();
                }
                self.stage = entry.to_stage;
                self.push_payload(entry.to_stage, entry);
            }
            EntryKind::ValidationBlocked => {
                self.stage = Stage::Validated;
                self.blocked = true;
                self.findings = entry.findings.clone();
                self.push_payload(Stage::Validated, entry);
            }
            EntryKind::OverrideApplied => {
                self.blocked = false;
                self.overridden = true;
                if let Some(StagePayload::Override(ref record)) = entry.payload {
                    self.override_reason = Some(record.reason.clone());
                }
                self.push_payload(Stage::Validated, entry);
            }
            EntryKind::RegenerationRequested | EntryKind::PreviewRendered => {
                self.push_payload(Stage::Generated, entry);
            }
            EntryKind::WarningRecorded => {
                self.warnings.push(entry.summary.clone());
            }
            EntryKind::JobFailed => {
                self.stage = Stage::Failed;
                self.blocked = false;
                self.failure = match entry.payload {
                    Some(StagePayload::Failed(ref report)) => Some(report.clone()),
                    _ => Some(FailureReport::administrative(
                        entry.error.clone().unwrap_or_default(),
                    )),
                };
                self.push_payload(Stage::Failed, entry);
            }
        }

        self.updated_at = entry.timestamp;
        self.last_actor = entry.actor.clone();
        self.last_seq = entry.seq;
    }

    fn push_payload(&mut self, stage: Stage, entry: &LedgerEntry) {
        if let Some(ref payload) = entry.payload {
            self.payloads.entry(stage).or_default().push(payload.clone());
        }
    }

    /// Most recent payload stored under a stage
    pub fn latest_payload(&self, stage: Stage) -> Option<&StagePayload> {
        self.payloads.get(&stage).and_then(|list| list.last())
    }

    /// Parsed layout and automatic mapping, once ingested
    pub fn ingest_record(&self) -> Option<&IngestRecord> {
        self.payloads
            .get(&Stage::Ingested)?
            .iter()
            .rev()
            .find_map(|p| match p {
                StagePayload::Ingested(record) => Some(record),
                _ => None,
            })
    }

    /// Current mapping: the last reviewed one, else the automatic one
    pub fn mapping(&self) -> Option<&Mapping> {
        let reviewed = self.payloads.get(&Stage::MatchReviewed).and_then(|list| {
            list.iter().rev().find_map(|p| match p {
                StagePayload::Mapping(mapping) => Some(mapping),
                _ => None,
            })
        });

        reviewed.or_else(|| self.ingest_record().map(|r| &r.mapping))
    }

    /// Generation attempts in order
    pub fn generation_attempts(&self) -> Vec<&GeneratedArtifact> {
        self.payloads
            .get(&Stage::Generated)
            .map(|list| {
                list.iter()
                    .filter_map(|p| match p {
                        StagePayload::Generated(artifact) => Some(artifact),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Critical findings currently holding the job
    pub fn blocking_findings(&self) -> Vec<ValidationFinding> {
        if !self.blocked {
            return Vec::new();
        }
        self.findings.iter().filter(|f| f.is_critical()).cloned().collect()
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }
}
