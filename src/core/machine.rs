//! Job state machine: the closed transition table.
//!
//! `next_stage` matches on every `Action` without a wildcard, so adding an
//! action forces a decision here at compile time.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Stage, StagePayload};

/// Event that drives a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Ingest,
    ReviewMapping,
    Validate,
    Override,
    Generate,
    RequestRegeneration,
    RenderPreview,
    ApprovePreview,
    Package,
    Fail,
}

impl Action {
    /// The action a payload asks for
    pub fn for_payload(payload: &StagePayload) -> Self {
        match payload {
            StagePayload::Created(_) => Action::Create,
            StagePayload::Parsed(_) | StagePayload::Ingested(_) => Action::Ingest,
            StagePayload::Mapping(_) => Action::ReviewMapping,
            StagePayload::Validation(_) => Action::Validate,
            StagePayload::Override(_) => Action::Override,
            StagePayload::Generated(_) => Action::Generate,
            StagePayload::RegenerationRequested(_) => Action::RequestRegeneration,
            StagePayload::Preview(_) => Action::RenderPreview,
            StagePayload::PreviewApproved(_) => Action::ApprovePreview,
            StagePayload::Packaged(_) => Action::Package,
            StagePayload::Failed(_) => Action::Fail,
        }
    }

    /// Actions only the core itself may perform
    pub fn is_internal(self) -> bool {
        matches!(self, Action::Create | Action::Validate | Action::Override)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Ingest => "ingest",
            Action::ReviewMapping => "review_mapping",
            Action::Validate => "validate",
            Action::Override => "override",
            Action::Generate => "generate",
            Action::RequestRegeneration => "request_regeneration",
            Action::RenderPreview => "render_preview",
            Action::ApprovePreview => "approve_preview",
            Action::Package => "package",
            Action::Fail => "fail",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Job is in terminal stage '{0}'")]
    Terminal(Stage),

    #[error("Action '{action}' is not allowed at stage '{stage}' (blocked: {blocked})")]
    NotAllowed {
        stage: Stage,
        blocked: bool,
        action: Action,
    },
}

/// Stage reached by applying `action` to a job at `stage`
pub fn next_stage(stage: Stage, blocked: bool, action: Action) -> Result<Stage, TransitionError> {
    use Stage::*;

    if stage.is_terminal() {
        return Err(TransitionError::Terminal(stage));
    }

    let next = match action {
        Action::Create => None,
        Action::Ingest => (stage == Created).then_some(Ingested),
        Action::ReviewMapping => match stage {
            Ingested => Some(MatchReviewed),
            // a revised mapping is the way out of a block
            Validated if blocked => Some(MatchReviewed),
            _ => None,
        },
        Action::Validate => (stage == MatchReviewed).then_some(Validated),
        Action::Override => (stage == Validated && blocked).then_some(Validated),
        Action::Generate => match stage {
            Validated if !blocked => Some(Generated),
            Generated => Some(Generated),
            _ => None,
        },
        Action::RequestRegeneration | Action::RenderPreview => {
            (stage == Generated).then_some(Generated)
        }
        Action::ApprovePreview => (stage == Generated).then_some(PreviewApproved),
        Action::Package => (stage == PreviewApproved).then_some(Completed),
        Action::Fail => Some(Failed),
    };

    next.ok_or(TransitionError::NotAllowed {
        stage,
        blocked,
        action,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let path = [
            (Stage::Created, Action::Ingest, Stage::Ingested),
            (Stage::Ingested, Action::ReviewMapping, Stage::MatchReviewed),
            (Stage::MatchReviewed, Action::Validate, Stage::Validated),
            (Stage::Validated, Action::Generate, Stage::Generated),
            (Stage::Generated, Action::ApprovePreview, Stage::PreviewApproved),
            (Stage::PreviewApproved, Action::Package, Stage::Completed),
        ];

        for (from, action, to) in path {
            assert_eq!(next_stage(from, false, action), Ok(to), "{} + {}", from, action);
        }
    }

    #[test]
    fn test_blocked_gate() {
        assert!(next_stage(Stage::Validated, true, Action::Generate).is_err());
        assert_eq!(
            next_stage(Stage::Validated, true, Action::Override),
            Ok(Stage::Validated)
        );
        assert_eq!(
            next_stage(Stage::Validated, true, Action::ReviewMapping),
            Ok(Stage::MatchReviewed)
        );
        assert!(next_stage(Stage::Validated, false, Action::Override).is_err());
        assert!(next_stage(Stage::Validated, false, Action::ReviewMapping).is_err());
    }

    #[test]
    fn test_fail_from_any_non_terminal() {
        for stage in Stage::ALL {
            let result = next_stage(stage, false, Action::Fail);
            if stage.is_terminal() {
                assert_eq!(result, Err(TransitionError::Terminal(stage)));
            } else {
                assert_eq!(result, Ok(Stage::Failed));
            }
        }
    }

    #[test]
    fn test_terminal_accepts_nothing() {
        assert!(next_stage(Stage::Completed, false, Action::Ingest).is_err());
        assert!(next_stage(Stage::Failed, false, Action::ReviewMapping).is_err());
    }

    #[test]
    fn test_regeneration_loops() {
        assert_eq!(
            next_stage(Stage::Generated, false, Action::RequestRegeneration),
            Ok(Stage::Generated)
        );
        assert_eq!(
            next_stage(Stage::Generated, false, Action::Generate),
            Ok(Stage::Generated)
        );
        assert!(next_stage(Stage::PreviewApproved, false, Action::RequestRegeneration).is_err());
    }
}
