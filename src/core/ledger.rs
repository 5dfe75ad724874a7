//! Append-only job ledger with file-based persistence.
//!
//! Each job owns `jobs/<job-id>/ledger.jsonl`. Every transition appends all
//! of its entries in one write while holding an exclusive lock, so the stage
//! change, its payload and its ledger record land together or not at all.

use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::warn;
use uuid::Uuid;

use fs2::FileExt;

use crate::domain::{Job, LedgerEntry, Stage};

const LEDGER_FILE: &str = "ledger.jsonl";

/// Root of all job ledgers
#[derive(Debug, Clone)]
pub struct JobStore {
    root: PathBuf,
}

impl JobStore {
    /// Open a store rooted at `root` (created lazily on first write)
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store under the configured home (~/.stagegate/jobs or $STAGEGATE_HOME/jobs)
    pub fn from_config() -> Result<Self> {
        Ok(Self::open(crate::config::paths::HomePaths::from_config()?.jobs_dir()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ledger handle for one job
    pub fn ledger(&self, job_id: Uuid) -> JobLedger {
        let dir = self.root.join(job_id.to_string());
        JobLedger {
            job_id,
            path: dir.join(LEDGER_FILE),
            dir,
        }
    }

    /// Replay a job's ledger into its current state
    pub async fn load(&self, job_id: Uuid) -> Result<Option<(Job, Vec<LedgerEntry>)>> {
        let entries = self.ledger(job_id).replay().await?;
        if entries.is_empty() {
            return Ok(None);
        }

        let job = Job::from_entries(&entries)
            .with_context(|| format!("Ledger for job {} has no creation entry", job_id))?;
        Ok(Some((job, entries)))
    }

    /// List all job IDs in the store
    pub async fn list_job_ids(&self) -> Result<Vec<Uuid>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Ok(uuid) = Uuid::parse_str(name) {
                        ids.push(uuid);
                    }
                }
            }
        }

        ids.sort();
        Ok(ids)
    }
}

/// One job's ledger file
#[derive(Debug, Clone)]
pub struct JobLedger {
    job_id: Uuid,
    dir: PathBuf,
    path: PathBuf,
}

impl JobLedger {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Replay all entries in order.
    ///
    /// A trailing line without a newline is a write in progress and is skipped.
    pub async fn replay(&self) -> Result<Vec<LedgerEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read ledger: {}", self.path.display()))?;

        parse_entries(&content)
    }

    /// Read-decide-append under an exclusive lock.
    ///
    /// `decide` sees every committed entry and returns the entries to append
    /// plus a value. Appended entries get consecutive `seq` numbers. When
    /// `decide` returns an error or no entries, nothing is written.
    ///
    /// The lock and file I/O block, so the transaction runs on the blocking pool.
    pub async fn transact<T, E, F>(&self, decide: F) -> Result<(T, Vec<LedgerEntry>), E>
    where
        F: FnOnce(&[LedgerEntry]) -> Result<(Vec<LedgerEntry>, T), E> + Send + 'static,
        T: Send + 'static,
        E: From<anyhow::Error> + Send + 'static,
    {
        let ledger = self.clone();
        tokio::task::spawn_blocking(move || ledger.transact_locked(decide))
            .await
            .context("Ledger transaction task failed")?
    }

    fn transact_locked<T, E, F>(&self, decide: F) -> Result<(T, Vec<LedgerEntry>), E>
    where
        F: FnOnce(&[LedgerEntry]) -> Result<(Vec<LedgerEntry>, T), E>,
        E: From<anyhow::Error>,
    {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create job directory: {}", self.dir.display()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open ledger: {}", self.path.display()))?;

        file.lock_exclusive()
            .context("Failed to acquire file lock on ledger")?;

        let mut content = String::new();
        file.read_to_string(&mut content)
            .with_context(|| format!("Failed to read ledger: {}", self.path.display()))?;
        let committed = parse_entries(&content)?;

        let (mut appended, value) = decide(&committed)?;
        if appended.is_empty() {
            return Ok((value, appended));
        }

        // drop an interrupted write so the next entry starts on its own line
        let complete = committed_len(&content);
        if complete < content.len() {
            warn!(
                job_id = %self.job_id,
                bytes = content.len() - complete,
                "Discarding partial trailing ledger line"
            );
            file.set_len(complete as u64)
                .context("Failed to truncate partial ledger line")?;
        }

        let mut seq = committed.last().map(|e| e.seq).unwrap_or(0);
        let mut buffer = String::new();
        for entry in appended.iter_mut() {
            seq += 1;
            entry.seq = seq;
            entry.job_id = self.job_id;
            let json = serde_json::to_string(entry).context("Failed to serialize ledger entry")?;
            buffer.push_str(&json);
            buffer.push('\n');
        }

        file.write_all(buffer.as_bytes())
            .context("Failed to write ledger entries")?;
        file.flush().context("Failed to flush ledger")?;
        file.sync_data().context("Failed to sync ledger")?;

        // Lock is released when file is dropped
        Ok((value, appended))
    }
}

/// Length of the newline-terminated prefix
fn committed_len(content: &str) -> usize {
    content.rfind('\n').map_or(0, |end| end + 1)
}

fn parse_entries(content: &str) -> Result<Vec<LedgerEntry>> {
    let complete = &content[..committed_len(content)];

    let mut entries = Vec::new();
    for line in complete.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let entry: LedgerEntry = serde_json::from_str(line)
            .with_context(|| format!("Failed to parse ledger entry: {}", line))?;
        entries.push(entry);
    }

    Ok(entries)
}

/// Derive an operation token from the request content
pub fn generate_operation_token(job_id: Uuid, from_stage: Stage, payload_json: &str) -> String {
    format!("{}:{}:{}", job_id, from_stage, hash_input(payload_json))
}

/// Hash input content (first 16 chars of SHA256)
pub fn hash_input(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8]) // First 16 hex chars (8 bytes)
}
