//! stagegate - Stage-gated layout adaptation jobs
//!
//! Carries each job from a source document and a target template through
//! an auditable lifecycle: ingest, human-reviewed element mapping, geometry
//! validation, artifact generation, preview approval and packaging.
//!
//! # Architecture
//!
//! The system is built around per-job ledgers:
//! - Every transition is one locked append of immutable ledger entries
//! - Current job state is derived by replaying the ledger
//! - Replayed operation tokens return the original receipt
//! - Critical geometry findings halt a job until revised or overridden
//!
//! # Modules
//!
//! - `domain`: Data structures (Job, Stage, Mapping, LedgerEntry)
//! - `core`: Ledger, transition table and orchestrator
//! - `matcher`: Name-similarity element-to-slot suggestions
//! - `validator`: Aspect and resolution checks, feedback log
//! - `batch`: Manifest-driven job groups
//! - `adapters`: Collaborators (layout parser, generator, renderer, packager)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! stagegate job new poster.json story.json
//! stagegate ingest <job-id>
//! stagegate review <job-id> --assign hero=Hero_Image
//! stagegate override <job-id> --reason "client approved the crop"
//! ```

pub mod adapters;
pub mod batch;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod matcher;
pub mod validator;

// Re-export main types at crate root for convenience
pub use core::{Orchestrator, SubmitError, SubmitReceipt, SubmitRequest};
pub use domain::{Job, LedgerEntry, Mapping, Stage, StagePayload, ValidationFinding};
