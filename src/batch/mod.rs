//! Batch coordinator.
//!
//! A batch is created once from a manifest and never changes afterwards.
//! Its jobs run independently; aggregate status is computed by scanning
//! the jobs on every read.

use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::core::{JobFilter, Orchestrator};
use crate::domain::{JobDescriptor, JobMetadata, Stage};

/// Batch manifest (YAML or JSON)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,

    #[serde(default)]
    pub client: Option<String>,

    #[serde(default)]
    pub project: Option<String>,

    pub jobs: Vec<ManifestJob>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestJob {
    pub source: String,
    pub template: String,

    #[serde(default)]
    pub metadata: JobMetadata,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ManifestError {
    #[error("Manifest '{0}' lists no jobs")]
    NoJobs(String),

    #[error("Job #{index} has an empty {field} reference")]
    EmptyReference { index: usize, field: &'static str },

    #[error("Duplicate job: {source_ref} -> {template}")]
    DuplicateJob { source_ref: String, template: String },
}

impl Manifest {
    /// Parse a manifest (JSON is valid YAML)
    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse batch manifest")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.jobs.is_empty() {
            return Err(ManifestError::NoJobs(self.name.clone()));
        }

        let mut seen = HashSet::new();
        for (index, job) in self.jobs.iter().enumerate() {
            if job.source.trim().is_empty() {
                return Err(ManifestError::EmptyReference { index, field: "source" });
            }
            if job.template.trim().is_empty() {
                return Err(ManifestError::EmptyReference { index, field: "template" });
            }
            if !seen.insert((job.source.as_str(), job.template.as_str())) {
                return Err(ManifestError::DuplicateJob {
                    source_ref: job.source.clone(),
                    template: job.template.clone(),
                });
            }
        }

        Ok(())
    }

    /// Batch-level metadata applied to jobs that leave a field unset
    pub fn defaults(&self) -> JobMetadata {
        JobMetadata {
            client: self.client.clone(),
            project: self.project.clone(),
            ..JobMetadata::default()
        }
    }
}

/// Immutable batch record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub name: String,

    /// Path of the manifest the batch was created from
    pub manifest: String,

    /// Job ids in manifest order
    pub job_ids: Vec<Uuid>,

    pub created_at: DateTime<Utc>,
}

/// Aggregate status, derived on every read
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchStatus {
    pub batch_id: Uuid,
    pub counts: BTreeMap<Stage, usize>,

    /// Jobs halted at the validation gate
    pub blocked: usize,

    pub total: usize,
}

impl BatchStatus {
    pub fn count(&self, stage: Stage) -> usize {
        self.counts.get(&stage).copied().unwrap_or(0)
    }

    pub fn is_settled(&self) -> bool {
        self.count(Stage::Completed) + self.count(Stage::Failed) == self.total
    }
}

/// Batch records under `batches/`
#[derive(Debug, Clone)]
pub struct BatchStore {
    dir: PathBuf,
}

impl BatchStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config() -> Result<Self> {
        Ok(Self::new(
            crate::config::paths::HomePaths::from_config()?.batches_dir(),
        ))
    }

    fn path(&self, batch_id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", batch_id))
    }

    /// Write a record atomically (temp file + rename)
    pub fn save(&self, batch: &Batch) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create batch directory: {}", self.dir.display()))?;

        let json = serde_json::to_string_pretty(batch).context("Failed to serialize batch")?;
        let mut temp = tempfile::NamedTempFile::new_in(&self.dir)
            .context("Failed to create temporary batch file")?;
        temp.write_all(json.as_bytes())
            .context("Failed to write batch record")?;

        let path = self.path(batch.id);
        temp.persist(&path)
            .with_context(|| format!("Failed to persist batch record: {}", path.display()))?;
        Ok(())
    }

    pub fn load(&self, batch_id: Uuid) -> Result<Batch> {
        let path = self.path(batch_id);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Batch not found: {}", batch_id))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse batch record: {}", path.display()))
    }
}

/// Resolve a relative reference against the manifest's directory
fn resolve_reference(base: &Path, reference: &str) -> String {
    let path = Path::new(reference);
    if path.is_absolute() || reference.contains("://") {
        reference.to_string()
    } else {
        base.join(path).display().to_string()
    }
}

/// Validate a manifest, create its jobs and write the batch record
#[instrument(skip(orchestrator, batches))]
pub async fn create_batch(
    orchestrator: &Orchestrator,
    batches: &BatchStore,
    manifest_path: &Path,
    actor: &str,
) -> Result<Batch> {
    let manifest = Manifest::load(manifest_path)?;
    manifest.validate()?;

    let base = manifest_path.parent().unwrap_or(Path::new("."));
    let defaults = manifest.defaults();
    let batch_id = Uuid::new_v4();

    let mut job_ids = Vec::with_capacity(manifest.jobs.len());
    for entry in &manifest.jobs {
        let descriptor = JobDescriptor::new(
            resolve_reference(base, &entry.source),
            resolve_reference(base, &entry.template),
        )
        .in_batch(batch_id)
        .with_metadata(entry.metadata.clone().or_defaults(&defaults));

        let job = orchestrator.create_job(descriptor, actor).await?;
        job_ids.push(job.id);
    }

    let batch = Batch {
        id: batch_id,
        name: manifest.name,
        manifest: manifest_path.display().to_string(),
        job_ids,
        created_at: Utc::now(),
    };
    batches.save(&batch)?;

    info!(%batch_id, name = %batch.name, jobs = batch.job_ids.len(), "Batch created");
    Ok(batch)
}

/// Per-stage counts for a batch's jobs
pub async fn batch_status(
    orchestrator: &Orchestrator,
    batches: &BatchStore,
    batch_id: Uuid,
) -> Result<BatchStatus> {
    let batch = batches.load(batch_id)?;
    let jobs = orchestrator
        .list_jobs(&JobFilter {
            stage: None,
            batch_id: Some(batch_id),
        })
        .await?;

    let mut status = BatchStatus {
        batch_id,
        total: batch.job_ids.len(),
        ..BatchStatus::default()
    };
    for job in &jobs {
        *status.counts.entry(job.stage).or_insert(0) += 1;
        if job.blocked {
            status.blocked += 1;
        }
    }

    Ok(status)
}
