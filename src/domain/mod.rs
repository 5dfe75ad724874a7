//! Domain types for the stage-gated job pipeline.
//!
//! This module contains the core data structures:
//! - Stage: the closed lifecycle enum
//! - Job: job state, reconstructed from its ledger
//! - LedgerEntry: immutable records of everything that happened
//! - Mapping / ValidationFinding / StagePayload: per-stage data

pub mod events;
pub mod finding;
pub mod job;
pub mod layout;
pub mod mapping;
pub mod payload;
pub mod stage;

// Re-export commonly used types
pub use events::{EntryKind, LedgerEntry};
pub use finding::{FindingCategory, Severity, ValidationFinding};
pub use job::{Job, JobDescriptor, JobMetadata};
pub use layout::{Size, SourceElement, TargetSlot};
pub use mapping::{Mapping, MappingEntry, MappingError, MatchMethod};
pub use payload::{
    FailureReport, GeneratedArtifact, IngestRecord, OverrideRecord, PackageReceipt, ParseReport,
    PreviewArtifact, PreviewReceipt, RegenerationRequest, StagePayload, ValidationRecord,
};
pub use stage::Stage;
