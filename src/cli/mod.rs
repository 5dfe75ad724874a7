//! Command-line interface for stagegate.
//!
//! Provides commands for creating batches and jobs, walking a job through
//! review, override, generation and approval, and inspecting job state.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::batch::{self, BatchStore};
use crate::core::{JobFilter, Orchestrator, SubmitReceipt, SubmitRequest};
use crate::domain::{JobDescriptor, JobMetadata, Mapping, Stage, StagePayload};

/// stagegate - Stage-gated layout adaptation jobs
#[derive(Parser, Debug)]
#[command(name = "stagegate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Actor recorded on every mutation
    #[arg(long, global = true, env = "STAGEGATE_ACTOR", default_value = "cli")]
    pub actor: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Batch operations
    Batch {
        #[command(subcommand)]
        command: BatchCommands,
    },

    /// Job creation
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },

    /// Parse source and template and run the matcher
    Ingest { job_id: String },

    /// Approve a mapping (edits the current suggestion unless --mapping is given)
    Review {
        job_id: String,

        /// Mapping JSON file replacing the suggestion
        #[arg(short, long)]
        mapping: Option<PathBuf>,

        /// Manual assignment, e.g. --assign hero=Hero_Image
        #[arg(short, long, value_name = "SOURCE=TARGET")]
        assign: Vec<String>,

        /// Leave a source element unmapped
        #[arg(short, long, value_name = "SOURCE")]
        unassign: Vec<String>,

        /// Operation token for idempotent retries
        #[arg(long)]
        token: Option<String>,
    },

    /// Force a blocked job past the validation gate
    Override {
        job_id: String,

        /// Why the critical findings are acceptable
        #[arg(short, long)]
        reason: String,
    },

    /// Run the artifact generator
    Generate {
        job_id: String,

        #[arg(long)]
        token: Option<String>,
    },

    /// Render a preview of the latest artifact
    Preview {
        job_id: String,

        #[arg(long)]
        token: Option<String>,
    },

    /// Request another generation attempt
    Regenerate {
        job_id: String,

        /// What should change
        #[arg(short, long)]
        note: Option<String>,

        #[arg(long)]
        token: Option<String>,
    },

    /// Approve the rendered preview
    Approve {
        job_id: String,

        #[arg(short, long)]
        note: Option<String>,
    },

    /// Package the approved artifact
    Package {
        job_id: String,

        /// Existing package reference (skips the packager)
        #[arg(short, long)]
        reference: Option<String>,
    },

    /// Cancel a job
    Fail {
        job_id: String,

        #[arg(short, long)]
        reason: String,
    },

    /// Show a job with its findings and ledger
    Show {
        job_id: String,

        /// Print the full view as JSON
        #[arg(long)]
        json: bool,
    },

    /// List jobs
    Jobs {
        /// Only jobs at this stage
        #[arg(short, long)]
        stage: Option<Stage>,

        /// Only jobs in this batch
        #[arg(short, long)]
        batch: Option<String>,
    },

    /// List non-terminal jobs idle for longer than a threshold
    Stalled {
        /// Threshold in minutes
        #[arg(short, long, default_value = "60")]
        minutes: i64,
    },

    /// Show validator feedback agreement rates
    Feedback,

    /// Show resolved configuration
    Config,
}

#[derive(Subcommand, Debug)]
pub enum BatchCommands {
    /// Create a batch from a manifest (YAML or JSON)
    Create { manifest: PathBuf },

    /// Show per-stage counts for a batch
    Status { batch_id: String },
}

#[derive(Subcommand, Debug)]
pub enum JobCommands {
    /// Create a standalone job
    New {
        /// Source document reference
        source: String,

        /// Target template reference
        template: String,

        #[arg(long)]
        client: Option<String>,

        #[arg(long)]
        project: Option<String>,

        #[arg(long)]
        priority: Option<String>,
    },
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let actor = self.actor.as_str();

        match self.command {
            Commands::Batch { command } => execute_batch(command, actor).await,
            Commands::Job { command } => execute_job(command, actor).await,
            Commands::Ingest { job_id } => {
                let orchestrator = Orchestrator::from_config()?;
                let receipt = orchestrator.ingest(parse_id(&job_id)?, actor).await?;
                print_receipt(&receipt);
                Ok(())
            }
            Commands::Review {
                job_id,
                mapping,
                assign,
                unassign,
                token,
            } => review(&job_id, mapping, assign, unassign, token, actor).await,
            Commands::Override { job_id, reason } => {
                let orchestrator = Orchestrator::from_config()?;
                let receipt = orchestrator
                    .override_job(parse_id(&job_id)?, &reason, actor)
                    .await?;
                print_receipt(&receipt);
                Ok(())
            }
            Commands::Generate { job_id, token } => {
                let orchestrator = Orchestrator::from_config()?;
                let receipt = orchestrator
                    .generate(parse_id(&job_id)?, actor, token)
                    .await?;
                print_receipt(&receipt);
                Ok(())
            }
            Commands::Preview { job_id, token } => {
                let orchestrator = Orchestrator::from_config()?;
                let receipt = orchestrator
                    .render_preview(parse_id(&job_id)?, actor, token)
                    .await?;
                print_receipt(&receipt);
                Ok(())
            }
            Commands::Regenerate {
                job_id,
                note,
                token,
            } => {
                let orchestrator = Orchestrator::from_config()?;
                let receipt = orchestrator
                    .request_regeneration(parse_id(&job_id)?, note, actor, token)
                    .await?;
                print_receipt(&receipt);
                Ok(())
            }
            Commands::Approve { job_id, note } => {
                let orchestrator = Orchestrator::from_config()?;
                let receipt = orchestrator
                    .approve_preview(parse_id(&job_id)?, note, actor)
                    .await?;
                print_receipt(&receipt);
                Ok(())
            }
            Commands::Package { job_id, reference } => {
                let orchestrator = Orchestrator::from_config()?;
                let receipt = orchestrator
                    .package(parse_id(&job_id)?, reference, actor)
                    .await?;
                print_receipt(&receipt);
                Ok(())
            }
            Commands::Fail { job_id, reason } => {
                let orchestrator = Orchestrator::from_config()?;
                let job_id = parse_id(&job_id)?;
                let view = orchestrator.get_job(job_id).await?;
                let receipt = orchestrator
                    .fail_job(job_id, view.job.stage, &reason, actor)
                    .await?;
                print_receipt(&receipt);
                Ok(())
            }
            Commands::Show { job_id, json } => show_job(&job_id, json).await,
            Commands::Jobs { stage, batch } => list_jobs(stage, batch).await,
            Commands::Stalled { minutes } => list_stalled(minutes).await,
            Commands::Feedback => show_feedback().await,
            Commands::Config => show_config().await,
        }
    }
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).with_context(|| format!("Invalid ID: {}", id))
}

fn print_receipt(receipt: &SubmitReceipt) {
    let replayed = if receipt.replayed { " (replayed)" } else { "" };
    println!("Job {}: {}{}", receipt.job_id, receipt.stage, replayed);

    if receipt.blocked {
        println!("Blocked by {} critical finding(s):", receipt.findings.len());
        for finding in &receipt.findings {
            println!("  {}", finding);
        }
        println!("\nRevise the mapping with `stagegate review` or force it with `stagegate override`.");
    } else if !receipt.findings.is_empty() {
        println!("Findings:");
        for finding in &receipt.findings {
            println!("  {}", finding);
        }
    }
}

async fn execute_batch(command: BatchCommands, actor: &str) -> Result<()> {
    let orchestrator = Orchestrator::from_config()?;
    let batches = BatchStore::from_config()?;

    match command {
        BatchCommands::Create { manifest } => {
            let batch = batch::create_batch(&orchestrator, &batches, &manifest, actor).await?;
            println!("Batch {} ({})", batch.id, batch.name);
            for job_id in &batch.job_ids {
                println!("  {}", job_id);
            }
            Ok(())
        }
        BatchCommands::Status { batch_id } => {
            let status = batch::batch_status(&orchestrator, &batches, parse_id(&batch_id)?).await?;
            println!("Batch {}: {} job(s)", status.batch_id, status.total);
            for (stage, count) in &status.counts {
                println!("  {:<18} {}", stage, count);
            }
            if status.blocked > 0 {
                println!("  {:<18} {}", "blocked", status.blocked);
            }
            Ok(())
        }
    }
}

async fn execute_job(command: JobCommands, actor: &str) -> Result<()> {
    match command {
        JobCommands::New {
            source,
            template,
            client,
            project,
            priority,
        } => {
            let orchestrator = Orchestrator::from_config()?;
            let descriptor = JobDescriptor::new(source, template).with_metadata(JobMetadata {
                client,
                project,
                priority,
                ..JobMetadata::default()
            });
            let job = orchestrator.create_job(descriptor, actor).await?;
            println!("{}", job.id);
            Ok(())
        }
    }
}

/// Submit a reviewed mapping
async fn review(
    job_id: &str,
    mapping_file: Option<PathBuf>,
    assign: Vec<String>,
    unassign: Vec<String>,
    token: Option<String>,
    actor: &str,
) -> Result<()> {
    let job_id = parse_id(job_id)?;
    let orchestrator = Orchestrator::from_config()?;
    let view = orchestrator.get_job(job_id).await?;

    let mut mapping = match mapping_file {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read mapping: {}", path.display()))?;
            serde_json::from_str::<Mapping>(&content)
                .with_context(|| format!("Failed to parse mapping: {}", path.display()))?
        }
        None => view
            .job
            .mapping()
            .cloned()
            .context("Job has no mapping yet; run `stagegate ingest` first")?,
    };

    for pair in &assign {
        let (source, target) = pair
            .split_once('=')
            .with_context(|| format!("Expected SOURCE=TARGET, got '{}'", pair))?;
        mapping.assign(source.trim(), Some(target.trim().to_string()));
    }
    for source in &unassign {
        mapping.assign(source.trim(), None);
    }

    let mut request =
        SubmitRequest::new(job_id, view.job.stage, StagePayload::Mapping(mapping)).by(actor);
    if let Some(token) = token {
        request = request.with_token(token);
    }

    let receipt = orchestrator.submit(request).await?;
    print_receipt(&receipt);
    Ok(())
}

async fn show_job(job_id: &str, json: bool) -> Result<()> {
    let orchestrator = Orchestrator::from_config()?;
    let view = orchestrator.get_job(parse_id(job_id)?).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    let job = &view.job;
    println!("Job ID: {}", job.id);
    if let Some(batch_id) = job.descriptor.batch_id {
        println!("Batch: {}", batch_id);
    }
    println!("Source: {}", job.descriptor.source);
    println!("Template: {}", job.descriptor.template);
    println!("Stage: {}{}", job.stage, if job.blocked { " (blocked)" } else { "" });
    if let Some(ref reason) = job.override_reason {
        println!("Override: {}", reason);
    }
    if let Some(ref failure) = job.failure {
        println!("Failure: {}", failure.message);
    }
    println!("Updated: {} by {}", job.updated_at, job.last_actor);

    if let Some(mapping) = job.mapping() {
        println!("\nMapping:");
        for entry in &mapping.entries {
            println!(
                "  {:<24} -> {:<24} {:.2} {:?}",
                entry.source,
                entry.target.as_deref().unwrap_or("-"),
                entry.confidence,
                entry.method
            );
        }
    }

    if !view.findings.is_empty() {
        println!("\nFindings:");
        for finding in &view.findings {
            println!("  {}", finding);
        }
    }

    println!("\nLedger:");
    for entry in &view.ledger {
        println!(
            "  #{:<4} {} {:<24} {:<16} {}",
            entry.seq,
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            format!("{:?}", entry.kind),
            entry.to_stage,
            entry.summary
        );
    }

    Ok(())
}

async fn list_jobs(stage: Option<Stage>, batch: Option<String>) -> Result<()> {
    let orchestrator = Orchestrator::from_config()?;
    let filter = JobFilter {
        stage,
        batch_id: batch.as_deref().map(parse_id).transpose()?,
    };
    let jobs = orchestrator.list_jobs(&filter).await?;

    if jobs.is_empty() {
        println!("No jobs found");
        return Ok(());
    }

    println!("{:<38} {:<18} {:<8} {:<20}", "JOB ID", "STAGE", "BLOCKED", "UPDATED");
    println!("{}", "-".repeat(86));

    for job in jobs {
        println!(
            "{:<38} {:<18} {:<8} {:<20}",
            job.id,
            job.stage,
            if job.blocked { "yes" } else { "" },
            job.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}

async fn list_stalled(minutes: i64) -> Result<()> {
    let orchestrator = Orchestrator::from_config()?;
    let jobs = orchestrator
        .stalled_jobs(chrono::Duration::minutes(minutes))
        .await?;

    if jobs.is_empty() {
        println!("No stalled jobs");
        return Ok(());
    }

    for job in jobs {
        println!("{:<38} {:<18} idle since {}", job.id, job.stage, job.updated_at);
    }

    Ok(())
}

async fn show_feedback() -> Result<()> {
    let orchestrator = Orchestrator::from_config()?;
    let stats = orchestrator.feedback().agreement_rates()?;

    if stats.is_empty() {
        println!("No feedback recorded");
        return Ok(());
    }

    println!("{:<12} {:<12} {:<10} {:>6} {:>6}", "SOURCE", "TARGET", "DIFF", "TOTAL", "AGREE");
    for stat in stats {
        println!(
            "{:<12} {:<12} {:<10} {:>6} {:>5.0}%",
            stat.key.source_category.to_string(),
            stat.key.target_category.to_string(),
            stat.key.diff_bucket.to_string(),
            stat.total,
            stat.rate() * 100.0
        );
    }

    Ok(())
}

/// Show the resolved configuration (for debugging)
async fn show_config() -> Result<()> {
    use crate::config::{self, paths::HomePaths};

    let cfg = config::config()?;
    let paths = HomePaths::new(&cfg.home);
    let settings = &cfg.settings;

    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:     {}", paths.home().display());
    println!("  Jobs:     {}", paths.jobs_dir().display());
    println!("  Batches:  {}", paths.batches_dir().display());
    println!("  Feedback: {}", paths.feedback_path().display());
    println!("  Packages: {}", paths.packages_dir().display());
    println!();
    println!("Settings:");
    println!("  Min confidence: {}", settings.min_confidence);
    println!("  Auto generate:  {}", settings.auto_generate);
    println!("  Fit mode:       {:?}", settings.fit_mode);
    println!(
        "  Render command: {}",
        settings.render_command.as_deref().unwrap_or("(none)")
    );
    println!("  Timeout:        {}s", settings.collaborator_timeout.as_secs());

    Ok(())
}
