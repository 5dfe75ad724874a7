//! Automation script generator.
//!
//! Renders the frozen mapping as a JSON placement script: one placement per
//! mapped entry with the fit/fill transform the downstream tool applies.
//! Output is deterministic for identical requests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::domain::{GeneratedArtifact, MatchMethod, SourceElement, TargetSlot};
use crate::validator::{FitMode, Transform};

use super::{ArtifactGenerator, CollaboratorError, GenerationRequest};

const COLLABORATOR: &str = "artifact_generator";

#[derive(Debug, Serialize)]
struct Script<'a> {
    job_id: Uuid,
    attempt: usize,
    mode: FitMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'a str>,
    placements: Vec<Placement<'a>>,
    unmapped: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct Placement<'a> {
    source: &'a str,
    target: &'a str,
    confidence: f64,
    method: MatchMethod,
    /// None when the geometry is degenerate (only reachable after an override)
    transform: Option<Transform>,
}

/// Generates JSON placement scripts
#[derive(Debug, Clone)]
pub struct ScriptGenerator {
    mode: FitMode,
}

impl Default for ScriptGenerator {
    fn default() -> Self {
        Self::new(FitMode::Fit)
    }
}

impl ScriptGenerator {
    pub fn new(mode: FitMode) -> Self {
        Self { mode }
    }

    /// Build the script body
    pub fn render(&self, job_id: Uuid, request: &GenerationRequest) -> Result<String, CollaboratorError> {
        let elements: HashMap<&str, &SourceElement> = request
            .elements
            .iter()
            .map(|e| (e.name.as_str(), e))
            .collect();
        let slots: HashMap<&str, &TargetSlot> =
            request.slots.iter().map(|s| (s.name.as_str(), s)).collect();

        let mut placements = Vec::new();
        let mut unmapped = Vec::new();

        for entry in &request.mapping.entries {
            let Some(ref target) = entry.target else {
                unmapped.push(entry.source.as_str());
                continue;
            };

            let element = elements.get(entry.source.as_str()).ok_or_else(|| {
                CollaboratorError::new(
                    COLLABORATOR,
                    format!("Mapping references unknown element '{}'", entry.source),
                )
            })?;
            let slot = slots.get(target.as_str()).ok_or_else(|| {
                CollaboratorError::new(
                    COLLABORATOR,
                    format!("Mapping references unknown slot '{}'", target),
                )
            })?;

            placements.push(Placement {
                source: &entry.source,
                target,
                confidence: entry.confidence,
                method: entry.method,
                transform: Transform::compute(self.mode, element.size(), slot.size()),
            });
        }

        let script = Script {
            job_id,
            attempt: request.attempt,
            mode: self.mode,
            note: request.note.as_deref(),
            placements,
            unmapped,
        };

        serde_json::to_string_pretty(&script)
            .map_err(|e| CollaboratorError::new(COLLABORATOR, format!("Failed to serialize script: {}", e)))
    }
}

#[async_trait]
impl ArtifactGenerator for ScriptGenerator {
    fn name(&self) -> &str {
        "script"
    }

    async fn generate(
        &self,
        job_id: Uuid,
        request: &GenerationRequest,
    ) -> Result<GeneratedArtifact, CollaboratorError> {
        let content = self.render(job_id, request)?;
        let placements = request.mapping.accepted().count();

        Ok(GeneratedArtifact::new(self.name(), content).with_metadata(json!({
            "attempt": request.attempt,
            "mode": self.mode,
            "placements": placements,
        })))
    }
}
