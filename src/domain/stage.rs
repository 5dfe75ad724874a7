//! Job lifecycle stages.
//!
//! Stages are a closed, ordered set. `Failed` is a parallel terminal state
//! reachable from any non-terminal stage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle stage of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Job record exists, artifacts not yet parsed
    Created,

    /// Source and template parsed, automatic mapping produced
    Ingested,

    /// A human submitted an approved mapping
    MatchReviewed,

    /// Geometry validation ran (may be blocked on critical findings)
    Validated,

    /// Automation artifact generated from the frozen mapping
    Generated,

    /// Rendered preview approved by a human
    PreviewApproved,

    /// Final packaging confirmed
    Completed,

    /// Terminal failure (collaborator error or administrative cancel)
    Failed,
}

impl Stage {
    /// Every stage, in lifecycle order (`Failed` last)
    pub const ALL: [Stage; 8] = [
        Stage::Created,
        Stage::Ingested,
        Stage::MatchReviewed,
        Stage::Validated,
        Stage::Generated,
        Stage::PreviewApproved,
        Stage::Completed,
        Stage::Failed,
    ];

    /// Terminal stages accept no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    /// Whether the mapping is frozen (read-only) at this stage
    pub fn mapping_frozen(self) -> bool {
        matches!(
            self,
            Stage::Validated | Stage::Generated | Stage::PreviewApproved | Stage::Completed
        )
    }

    /// Stable snake_case label used in ledgers and on the command line
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Created => "created",
            Stage::Ingested => "ingested",
            Stage::MatchReviewed => "match_reviewed",
            Stage::Validated => "validated",
            Stage::Generated => "generated",
            Stage::PreviewApproved => "preview_approved",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::Created
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    /// Accepts snake_case labels and the CamelCase names used in job tickets
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();

        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str().replace('_', "") == folded)
            .ok_or_else(|| format!("Unknown stage: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert!(Stage::Created < Stage::Ingested);
        assert!(Stage::Validated < Stage::Generated);
        assert!(Stage::PreviewApproved < Stage::Completed);
    }

    #[test]
    fn test_stage_parse_variants() {
        assert_eq!("Ingested".parse::<Stage>().unwrap(), Stage::Ingested);
        assert_eq!("match_reviewed".parse::<Stage>().unwrap(), Stage::MatchReviewed);
        assert_eq!("MatchReviewed".parse::<Stage>().unwrap(), Stage::MatchReviewed);
        assert_eq!("preview-approved".parse::<Stage>().unwrap(), Stage::PreviewApproved);
        assert!("stage4".parse::<Stage>().is_err());
    }

    #[test]
    fn test_terminal_stages() {
        assert!(Stage::Completed.is_terminal());
        assert!(Stage::Failed.is_terminal());
        assert!(!Stage::Validated.is_terminal());
    }

    #[test]
    fn test_stage_serialization() {
        let json = serde_json::to_string(&Stage::PreviewApproved).unwrap();
        assert_eq!(json, "\"preview_approved\"");
    }
}
