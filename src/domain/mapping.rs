//! Source-to-slot mappings.
//!
//! A mapping is produced by the confidence matcher at ingestion, edited by a
//! human at review, and frozen once validation has run.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::layout::{SourceElement, TargetSlot};

/// How a mapping entry was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    /// Normalized names are identical
    Exact,

    /// Accepted on similarity score above threshold
    Fuzzy,

    /// Set or changed by a reviewer
    Manual,

    /// No candidate cleared the acceptance threshold
    Unmatched,
}

/// One (source, target, confidence, method) tuple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Source element name
    pub source: String,

    /// Assigned target slot (None when unmatched)
    pub target: Option<String>,

    /// Similarity-derived confidence in [0, 1]
    pub confidence: f64,

    /// How the entry was produced
    pub method: MatchMethod,
}

impl MappingEntry {
    pub fn matched(
        source: impl Into<String>,
        target: impl Into<String>,
        confidence: f64,
        method: MatchMethod,
    ) -> Self {
        Self {
            source: source.into(),
            target: Some(target.into()),
            confidence,
            method,
        }
    }

    pub fn unmatched(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: None,
            confidence: 0.0,
            method: MatchMethod::Unmatched,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.target.is_some()
    }
}

/// Ordered set of mapping entries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    pub entries: Vec<MappingEntry>,
}

impl Mapping {
    pub fn new(entries: Vec<MappingEntry>) -> Self {
        Self { entries }
    }

    /// Entries that carry a target slot
    pub fn accepted(&self) -> impl Iterator<Item = &MappingEntry> {
        self.entries.iter().filter(|e| e.is_matched())
    }

    /// Look up the entry for a source element
    pub fn entry_for(&self, source: &str) -> Option<&MappingEntry> {
        self.entries.iter().find(|e| e.source == source)
    }

    /// Reassign a source element to a slot (or clear it), marking the entry manual.
    ///
    /// Does not check the one-to-one invariant; `validate` does.
    pub fn assign(&mut self, source: &str, target: Option<String>) {
        match self.entries.iter_mut().find(|e| e.source == source) {
            Some(entry) => {
                entry.method = if target.is_some() {
                    MatchMethod::Manual
                } else {
                    MatchMethod::Unmatched
                };
                entry.confidence = if target.is_some() { 1.0 } else { 0.0 };
                entry.target = target;
            }
            None => {
                self.entries.push(match target {
                    Some(t) => MappingEntry::matched(source, t, 1.0, MatchMethod::Manual),
                    None => MappingEntry::unmatched(source),
                });
            }
        }
    }

    /// Structural check against the parsed elements and slots
    pub fn validate(
        &self,
        elements: &[SourceElement],
        slots: &[TargetSlot],
    ) -> Result<(), MappingError> {
        let element_names: HashSet<&str> = elements.iter().map(|e| e.name.as_str()).collect();
        let slot_names: HashSet<&str> = slots.iter().map(|s| s.name.as_str()).collect();

        let mut seen_sources = HashSet::new();
        let mut seen_targets = HashSet::new();

        for entry in &self.entries {
            if !seen_sources.insert(entry.source.as_str()) {
                return Err(MappingError::DuplicateSource(entry.source.clone()));
            }
            if !element_names.contains(entry.source.as_str()) {
                return Err(MappingError::UnknownSource(entry.source.clone()));
            }
            if !(0.0..=1.0).contains(&entry.confidence) || entry.confidence.is_nan() {
                return Err(MappingError::ConfidenceOutOfRange {
                    element: entry.source.clone(),
                    confidence: entry.confidence,
                });
            }

            if let Some(ref target) = entry.target {
                if !slot_names.contains(target.as_str()) {
                    return Err(MappingError::UnknownTarget(target.clone()));
                }
                if !seen_targets.insert(target.as_str()) {
                    return Err(MappingError::DuplicateTarget(target.clone()));
                }
            }
        }

        Ok(())
    }
}

/// Structural violations rejected before persistence
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    #[error("Target slot '{0}' is assigned more than once")]
    DuplicateTarget(String),

    #[error("Source element '{0}' appears more than once")]
    DuplicateSource(String),

    #[error("Unknown source element '{0}'")]
    UnknownSource(String),

    #[error("Unknown target slot '{0}'")]
    UnknownTarget(String),

    #[error("Confidence {confidence} for '{element}' is outside [0, 1]")]
    ConfidenceOutOfRange { element: String, confidence: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixtures() -> (Vec<SourceElement>, Vec<TargetSlot>) {
        (
            vec![
                SourceElement::new("hero", 1920.0, 1080.0),
                SourceElement::new("logo", 500.0, 500.0),
            ],
            vec![
                TargetSlot::new("Hero Image", 1920.0, 1080.0),
                TargetSlot::new("Logo", 400.0, 400.0),
            ],
        )
    }

    #[test]
    fn test_valid_mapping() {
        let (elements, slots) = fixtures();
        let mapping = Mapping::new(vec![
            MappingEntry::matched("hero", "Hero Image", 0.9, MatchMethod::Fuzzy),
            MappingEntry::unmatched("logo"),
        ]);
        assert!(mapping.validate(&elements, &slots).is_ok());
    }

    #[test]
    fn test_duplicate_target_rejected() {
        let (elements, slots) = fixtures();
        let mapping = Mapping::new(vec![
            MappingEntry::matched("hero", "Logo", 0.9, MatchMethod::Fuzzy),
            MappingEntry::matched("logo", "Logo", 1.0, MatchMethod::Exact),
        ]);
        assert_eq!(
            mapping.validate(&elements, &slots),
            Err(MappingError::DuplicateTarget("Logo".to_string()))
        );
    }

    #[test]
    fn test_unknown_names_rejected() {
        let (elements, slots) = fixtures();

        let bad_source = Mapping::new(vec![MappingEntry::unmatched("footer")]);
        assert!(matches!(
            bad_source.validate(&elements, &slots),
            Err(MappingError::UnknownSource(_))
        ));

        let bad_target = Mapping::new(vec![MappingEntry::matched(
            "hero",
            "Background",
            0.7,
            MatchMethod::Manual,
        )]);
        assert!(matches!(
            bad_target.validate(&elements, &slots),
            Err(MappingError::UnknownTarget(_))
        ));
    }

    #[test]
    fn test_assign_marks_manual() {
        let mut mapping = Mapping::new(vec![MappingEntry::unmatched("logo")]);
        mapping.assign("logo", Some("Logo".to_string()));

        let entry = mapping.entry_for("logo").unwrap();
        assert_eq!(entry.method, MatchMethod::Manual);
        assert_eq!(entry.target.as_deref(), Some("Logo"));

        mapping.assign("logo", None);
        assert_eq!(mapping.entry_for("logo").unwrap().method, MatchMethod::Unmatched);
    }
}
