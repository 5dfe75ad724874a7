//! Validation findings.
//!
//! Findings are immutable. A re-validation after returning to review
//! supersedes the previous run's findings rather than editing them.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::mapping::MappingEntry;

/// Finding severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        };
        f.write_str(label)
    }
}

/// What a finding is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingCategory {
    AspectRatio,
    Resolution,
    Unmapped,
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FindingCategory::AspectRatio => "aspect-ratio",
            FindingCategory::Resolution => "resolution",
            FindingCategory::Unmapped => "unmapped",
        };
        f.write_str(label)
    }
}

/// A single severity-tagged result of a validation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub severity: Severity,
    pub category: FindingCategory,

    /// Human-readable detail
    pub detail: String,

    /// The mapping tuple the finding is about
    pub entry: MappingEntry,
}

impl ValidationFinding {
    pub fn new(
        severity: Severity,
        category: FindingCategory,
        detail: impl Into<String>,
        entry: MappingEntry,
    ) -> Self {
        Self {
            severity,
            category,
            detail: detail.into(),
            entry,
        }
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

impl fmt::Display for ValidationFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} -> {}: {}",
            self.severity,
            self.category,
            self.entry.source,
            self.entry.target.as_deref().unwrap_or("-"),
            self.detail
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_serializes_kebab() {
        let json = serde_json::to_string(&FindingCategory::AspectRatio).unwrap();
        assert_eq!(json, "\"aspect-ratio\"");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }
}
