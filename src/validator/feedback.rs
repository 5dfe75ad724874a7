//! Recommendation feedback store.
//!
//! Every human accept, reject or override of a validator recommendation is
//! appended here, keyed by (source category, target category, diff bucket).
//! The store is observational only: nothing in the validator reads it.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::geometry::{AspectCategory, DiffBucket, Recommendation};

/// What the human did with a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackDecision {
    /// Human agreed with the recommendation
    Accepted,

    /// Human disagreed and changed the mapping
    Rejected,

    /// Human forced past a block the recommendation imposed
    Overridden,
}

impl FeedbackDecision {
    pub fn agrees(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// One feedback record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub timestamp: DateTime<Utc>,
    pub job_id: Uuid,
    pub source_element: String,
    pub source_category: AspectCategory,
    pub target_category: AspectCategory,
    pub diff_bucket: DiffBucket,
    pub recommendation: Recommendation,
    pub decision: FeedbackDecision,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Aggregation key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FeedbackKey {
    pub source_category: AspectCategory,
    pub target_category: AspectCategory,
    pub diff_bucket: DiffBucket,
}

/// Agreement statistics for one key
#[derive(Debug, Clone, Serialize)]
pub struct AgreementStat {
    pub key: FeedbackKey,
    pub total: usize,
    pub agreed: usize,
}

impl AgreementStat {
    /// Fraction of decisions that agreed with the recommendation
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.agreed as f64 / self.total as f64
        }
    }
}

/// JSONL-backed feedback store
#[derive(Debug, Clone)]
pub struct FeedbackStore {
    path: PathBuf,
}

impl FeedbackStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append records under an exclusive lock
    pub fn append(&self, records: &[FeedbackRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open feedback file: {}", self.path.display()))?;

        file.lock_exclusive()
            .context("Failed to acquire file lock on feedback store")?;

        let mut buffer = String::new();
        for record in records {
            buffer.push_str(&serde_json::to_string(record).context("Failed to serialize feedback")?);
            buffer.push('\n');
        }

        file.write_all(buffer.as_bytes())
            .context("Failed to write feedback")?;
        file.flush().context("Failed to flush feedback")?;

        // Lock is released when file is dropped
        Ok(())
    }

    /// Load every record in append order
    pub fn load(&self) -> Result<Vec<FeedbackRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open feedback file: {}", self.path.display()))?;

        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: FeedbackRecord = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse feedback line: {}", line))?;
            records.push(record);
        }

        Ok(records)
    }

    /// Recommendation agreement rate per key, sorted by key
    pub fn agreement_rates(&self) -> Result<Vec<AgreementStat>> {
        let mut stats: BTreeMap<FeedbackKey, AgreementStat> = BTreeMap::new();

        for record in self.load()? {
            let key = FeedbackKey {
                source_category: record.source_category,
                target_category: record.target_category,
                diff_bucket: record.diff_bucket,
            };
            let stat = stats.entry(key).or_insert(AgreementStat {
                key,
                total: 0,
                agreed: 0,
            });
            stat.total += 1;
            if record.decision.agrees() {
                stat.agreed += 1;
            }
        }

        Ok(stats.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(decision: FeedbackDecision, bucket: DiffBucket) -> FeedbackRecord {
        FeedbackRecord {
            timestamp: Utc::now(),
            job_id: Uuid::new_v4(),
            source_element: "hero".to_string(),
            source_category: AspectCategory::Portrait,
            target_category: AspectCategory::Landscape,
            diff_bucket: bucket,
            recommendation: Recommendation::CrossCategory,
            decision,
            note: None,
        }
    }

    #[test]
    fn test_agreement_rates() {
        let temp = TempDir::new().unwrap();
        let store = FeedbackStore::new(temp.path().join("feedback.jsonl"));

        store
            .append(&[
                record(FeedbackDecision::Accepted, DiffBucket::Over20),
                record(FeedbackDecision::Overridden, DiffBucket::Over20),
                record(FeedbackDecision::Accepted, DiffBucket::Over20),
                record(FeedbackDecision::Rejected, DiffBucket::Under5),
            ])
            .unwrap();

        let stats = store.agreement_rates().unwrap();
        assert_eq!(stats.len(), 2);

        let over = stats
            .iter()
            .find(|s| s.key.diff_bucket == DiffBucket::Over20)
            .unwrap();
        assert_eq!(over.total, 3);
        assert_eq!(over.agreed, 2);
        assert!((over.rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_store() {
        let temp = TempDir::new().unwrap();
        let store = FeedbackStore::new(temp.path().join("missing.jsonl"));
        assert!(store.load().unwrap().is_empty());
        assert!(store.agreement_rates().unwrap().is_empty());
    }
}
