//! Core orchestration logic.
//!
//! This module contains:
//! - JobStore / JobLedger: per-job append-only ledgers
//! - Machine: the closed transition table
//! - Orchestrator: the stage-gated job engine

pub mod ledger;
pub mod machine;
pub mod orchestrator;

// Re-export commonly used types
pub use ledger::{generate_operation_token, hash_input, JobLedger, JobStore};
pub use machine::{next_stage, Action, TransitionError};
pub use orchestrator::{
    JobFilter, JobView, Orchestrator, SubmitError, SubmitReceipt, SubmitRequest, SYSTEM_ACTOR,
};
