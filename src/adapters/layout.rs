//! JSON layout parser.
//!
//! Reads a layout description exported from the design tool:
//!
//! ```json
//! { "elements": [{ "name": "hero", "width": 1920, "height": 1080,
//!                  "pixel_width": 3840, "pixel_height": 2160,
//!                  "asset": "assets/hero.png" }],
//!   "slots":    [{ "name": "Hero", "width": 1920, "height": 1080 }] }
//! ```
//!
//! Documents are read from `elements`, templates from `slots`. Relative asset
//! paths resolve against the layout file's directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{SourceElement, TargetSlot};

use super::{CollaboratorError, DocumentLayout, DocumentParser, TemplateLayout, TemplateParser};

const DOCUMENT_PARSER: &str = "document_parser";
const TEMPLATE_PARSER: &str = "template_parser";

#[derive(Debug, Deserialize)]
struct LayoutFile {
    #[serde(default)]
    elements: Vec<SourceElement>,
    #[serde(default)]
    slots: Vec<TargetSlot>,
}

/// Parses both documents and templates from JSON layout files
#[derive(Debug, Clone, Default)]
pub struct JsonLayoutParser {
    /// Base directory for relative references (default: cwd)
    base_dir: Option<PathBuf>,
}

impl JsonLayoutParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn resolve(&self, reference: &str) -> PathBuf {
        let path = PathBuf::from(reference);
        match self.base_dir {
            Some(ref base) if path.is_relative() => base.join(path),
            _ => path,
        }
    }

    async fn read_layout(
        &self,
        collaborator: &str,
        reference: &str,
    ) -> Result<(PathBuf, LayoutFile), CollaboratorError> {
        let path = self.resolve(reference);

        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            CollaboratorError::new(
                collaborator,
                format!("Failed to read layout {}: {}", path.display(), e),
            )
        })?;

        let layout: LayoutFile = serde_json::from_str(&content).map_err(|e| {
            CollaboratorError::new(
                collaborator,
                format!("Failed to parse layout {}: {}", path.display(), e),
            )
        })?;

        Ok((path, layout))
    }
}

fn missing_assets(layout_path: &Path, elements: &[SourceElement]) -> Vec<String> {
    let base = layout_path.parent().unwrap_or_else(|| Path::new("."));

    elements
        .iter()
        .filter_map(|element| {
            let asset = element.asset.as_ref()?;
            let asset_path = Path::new(asset);
            let resolved = if asset_path.is_absolute() {
                asset_path.to_path_buf()
            } else {
                base.join(asset_path)
            };

            if resolved.exists() {
                None
            } else {
                Some(format!(
                    "Element '{}' references missing asset: {}",
                    element.name, asset
                ))
            }
        })
        .collect()
}

#[async_trait]
impl DocumentParser for JsonLayoutParser {
    fn name(&self) -> &str {
        "json-layout"
    }

    async fn parse_document(
        &self,
        job_id: Uuid,
        source: &str,
    ) -> Result<DocumentLayout, CollaboratorError> {
        let (path, layout) = self.read_layout(DOCUMENT_PARSER, source).await?;

        let warnings = missing_assets(&path, &layout.elements);
        for warning in &warnings {
            warn!(%job_id, "{}", warning);
        }
        debug!(%job_id, elements = layout.elements.len(), "Parsed source document");

        Ok(DocumentLayout {
            elements: layout.elements,
            warnings,
        })
    }
}

#[async_trait]
impl TemplateParser for JsonLayoutParser {
    fn name(&self) -> &str {
        "json-layout"
    }

    async fn parse_template(
        &self,
        job_id: Uuid,
        template: &str,
    ) -> Result<TemplateLayout, CollaboratorError> {
        let (_, layout) = self.read_layout(TEMPLATE_PARSER, template).await?;

        if layout.slots.is_empty() {
            return Err(CollaboratorError::new(
                TEMPLATE_PARSER,
                format!("Template {} defines no slots", template),
            ));
        }
        debug!(%job_id, slots = layout.slots.len(), "Parsed target template");

        Ok(TemplateLayout {
            slots: layout.slots,
            warnings: Vec::new(),
        })
    }
}
