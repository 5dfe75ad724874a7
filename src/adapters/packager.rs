//! Packager that writes the approved artifact into an output directory.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use crate::domain::{GeneratedArtifact, PackageReceipt};

use super::{CollaboratorError, Packager};

const COLLABORATOR: &str = "packager";

/// Writes `<out_dir>/<job-id>/script.json`
#[derive(Debug, Clone)]
pub struct DirectoryPackager {
    out_dir: PathBuf,
}

impl DirectoryPackager {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }
}

#[async_trait]
impl Packager for DirectoryPackager {
    fn name(&self) -> &str {
        "directory"
    }

    async fn package(
        &self,
        job_id: Uuid,
        artifact: &GeneratedArtifact,
    ) -> Result<PackageReceipt, CollaboratorError> {
        let dir = self.out_dir.join(job_id.to_string());
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            CollaboratorError::new(COLLABORATOR, format!("Failed to create {}: {}", dir.display(), e))
        })?;

        let path = dir.join("script.json");
        tokio::fs::write(&path, &artifact.content)
            .await
            .map_err(|e| {
                CollaboratorError::new(COLLABORATOR, format!("Failed to write {}: {}", path.display(), e))
            })?;

        Ok(PackageReceipt {
            package: path.display().to_string(),
            metadata: json!({ "bytes": artifact.content.len() }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_package_writes_artifact() {
        let temp = TempDir::new().unwrap();
        let packager = DirectoryPackager::new(temp.path());
        let job_id = Uuid::new_v4();

        let receipt = packager
            .package(job_id, &GeneratedArtifact::new("script", "{\"ok\":true}"))
            .await
            .unwrap();

        let written = std::fs::read_to_string(&receipt.package).unwrap();
        assert_eq!(written, "{\"ok\":true}");
        assert_eq!(receipt.metadata["bytes"], 11);
    }
}
