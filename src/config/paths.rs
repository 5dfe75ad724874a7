//! Canonical paths under the stagegate home.
//!
//! Single source of truth - import this instead of hardcoding paths.
//!
//! | Location | Purpose |
//! |----------|---------|
//! | `jobs/<job-id>/ledger.jsonl` | Per-job append-only ledger |
//! | `batches/<batch-id>.json` | Immutable batch records |
//! | `feedback.jsonl` | Validator recommendation feedback |
//! | `packages/<job-id>/` | Packaged deliverables |

use std::path::{Path, PathBuf};

use anyhow::Result;

/// Paths rooted at an explicit home (used by tests and the CLI alike)
#[derive(Debug, Clone)]
pub struct HomePaths {
    home: PathBuf,
}

impl HomePaths {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Paths under the configured home
    pub fn from_config() -> Result<Self> {
        Ok(Self::new(crate::config::stagegate_home()?))
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.home.join("jobs")
    }

    pub fn batches_dir(&self) -> PathBuf {
        self.home.join("batches")
    }

    pub fn feedback_path(&self) -> PathBuf {
        self.home.join("feedback.jsonl")
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.home.join("packages")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let paths = HomePaths::new("/srv/stagegate");
        assert_eq!(paths.jobs_dir(), PathBuf::from("/srv/stagegate/jobs"));
        assert_eq!(paths.batches_dir(), PathBuf::from("/srv/stagegate/batches"));
        assert_eq!(
            paths.feedback_path(),
            PathBuf::from("/srv/stagegate/feedback.jsonl")
        );
    }
}
