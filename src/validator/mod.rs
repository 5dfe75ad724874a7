//! Geometry validation.
//!
//! Scores an approved mapping: each (source, slot) pair gets an aspect-ratio
//! and a resolution assessment. The validator is a pure function of the
//! mapping and the parsed geometry; it never reads the feedback store.

pub mod feedback;
pub mod geometry;
pub mod transform;

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    FindingCategory, Mapping, MappingEntry, Severity, SourceElement, TargetSlot,
    ValidationFinding, ValidationRecord,
};

pub use feedback::{AgreementStat, FeedbackDecision, FeedbackRecord, FeedbackStore};
pub use geometry::{
    assess_aspect, assess_resolution, ratio_diff, AspectAssessment, AspectCategory, DiffBucket,
    Recommendation, ResolutionAssessment,
};
pub use transform::{FitMode, Transform};

/// Assessment of one mapping entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryAssessment {
    pub entry: MappingEntry,

    /// None for unmatched entries or degenerate geometry
    pub aspect: Option<AspectAssessment>,

    pub resolution: Option<ResolutionAssessment>,

    /// Aspect and resolution findings for this entry
    pub findings: Vec<ValidationFinding>,

    pub can_auto_advance: bool,
}

/// Result of validating a whole mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub assessments: Vec<EntryAssessment>,
    pub findings: Vec<ValidationFinding>,

    /// True only if every entry may advance without a human
    pub can_auto_advance: bool,
}

impl ValidationReport {
    /// Critical findings halt the job at `Validated`
    pub fn is_blocked(&self) -> bool {
        self.findings.iter().any(|f| f.is_critical())
    }

    pub fn critical_findings(&self) -> Vec<ValidationFinding> {
        self.findings.iter().filter(|f| f.is_critical()).cloned().collect()
    }

    /// Persistable form
    pub fn to_record(&self) -> ValidationRecord {
        ValidationRecord {
            findings: self.findings.clone(),
            can_auto_advance: self.can_auto_advance,
            blocked: self.is_blocked(),
        }
    }

    /// Feedback records for every entry that raised a critical finding
    pub fn feedback_for_blocked(
        &self,
        job_id: Uuid,
        decision: FeedbackDecision,
        note: Option<&str>,
    ) -> Vec<FeedbackRecord> {
        self.assessments
            .iter()
            .filter(|a| a.findings.iter().any(|f| f.is_critical()))
            .filter_map(|a| {
                let aspect = a.aspect.as_ref()?;
                Some(FeedbackRecord {
                    timestamp: Utc::now(),
                    job_id,
                    source_element: a.entry.source.clone(),
                    source_category: aspect.source_category,
                    target_category: aspect.target_category,
                    diff_bucket: aspect.bucket,
                    recommendation: aspect.recommendation,
                    decision,
                    note: note.map(str::to_string),
                })
            })
            .collect()
    }
}

/// Validate every entry of a mapping against the parsed geometry
pub fn validate_mapping(
    mapping: &Mapping,
    elements: &[SourceElement],
    slots: &[TargetSlot],
) -> ValidationReport {
    let elements: HashMap<&str, &SourceElement> =
        elements.iter().map(|e| (e.name.as_str(), e)).collect();
    let slots: HashMap<&str, &TargetSlot> = slots.iter().map(|s| (s.name.as_str(), s)).collect();

    let assessments: Vec<EntryAssessment> = mapping
        .entries
        .iter()
        .map(|entry| validate_entry(entry, &elements, &slots))
        .collect();

    let findings = assessments
        .iter()
        .flat_map(|a| a.findings.iter().cloned())
        .collect();
    let can_auto_advance = assessments.iter().all(|a| a.can_auto_advance);

    ValidationReport {
        assessments,
        findings,
        can_auto_advance,
    }
}

fn validate_entry(
    entry: &MappingEntry,
    elements: &HashMap<&str, &SourceElement>,
    slots: &HashMap<&str, &TargetSlot>,
) -> EntryAssessment {
    let Some(ref target_name) = entry.target else {
        return EntryAssessment {
            entry: entry.clone(),
            aspect: None,
            resolution: None,
            findings: vec![ValidationFinding::new(
                Severity::Info,
                FindingCategory::Unmapped,
                "No target slot assigned",
                entry.clone(),
            )],
            can_auto_advance: true,
        };
    };

    let (Some(element), Some(slot)) = (
        elements.get(entry.source.as_str()),
        slots.get(target_name.as_str()),
    ) else {
        return blocked_entry(entry, "Geometry unavailable for source or slot");
    };

    let Some(aspect) = assess_aspect(entry, element.size(), slot.size()) else {
        return blocked_entry(entry, "Degenerate geometry (zero or invalid dimension)");
    };
    let resolution = assess_resolution(entry, element.pixel_size(), slot.size());

    let mut findings = aspect.findings.clone();
    if let Some(finding) = resolution.as_ref().and_then(|r| r.finding.clone()) {
        findings.push(finding);
    }

    let can_auto_advance = aspect.can_auto_advance && !findings.iter().any(|f| f.is_critical());

    EntryAssessment {
        entry: entry.clone(),
        aspect: Some(aspect),
        resolution,
        findings,
        can_auto_advance,
    }
}

fn blocked_entry(entry: &MappingEntry, detail: &str) -> EntryAssessment {
    EntryAssessment {
        entry: entry.clone(),
        aspect: None,
        resolution: None,
        findings: vec![ValidationFinding::new(
            Severity::Critical,
            FindingCategory::AspectRatio,
            detail,
            entry.clone(),
        )],
        can_auto_advance: false,
    }
}
