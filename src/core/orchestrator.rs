//! Job orchestrator.
//!
//! Drives jobs through the stage-gated lifecycle: calls the collaborators,
//! runs the matcher and the geometry validator, and records every
//! transition in the job's ledger. Every mutation goes through one locked
//! ledger append that first deduplicates on the operation token and then
//! checks the optimistic stage guard.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{
    ArtifactGenerator, CollaboratorError, CommandRenderer, DirectoryPackager, DocumentParser,
    GenerationRequest, JsonLayoutParser, Packager, PreviewRenderer, ScriptGenerator,
    TemplateParser,
};
use crate::config::paths::HomePaths;
use crate::domain::{
    EntryKind, FailureReport, GeneratedArtifact, IngestRecord, Job, JobDescriptor, LedgerEntry,
    MappingError, OverrideRecord, PackageReceipt, ParseReport, PreviewReceipt,
    RegenerationRequest, Stage, StagePayload, ValidationFinding,
};
use crate::matcher::ConfidenceMatcher;
use crate::validator::{validate_mapping, FeedbackDecision, FeedbackStore};

use super::ledger::{generate_operation_token, JobStore};
use super::machine::{next_stage, Action};

/// Actor recorded for mutations the core makes on its own
pub const SYSTEM_ACTOR: &str = "system";

/// A transition request: the public `submit` contract
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub job_id: Uuid,

    /// Stage the caller believes the job is in
    pub from_stage: Stage,

    pub payload: StagePayload,

    /// Dedupe key; derived from the payload when absent
    #[serde(default)]
    pub operation_token: Option<String>,

    pub actor: String,
}

impl SubmitRequest {
    pub fn new(job_id: Uuid, from_stage: Stage, payload: StagePayload) -> Self {
        Self {
            job_id,
            from_stage,
            payload,
            operation_token: None,
            actor: SYSTEM_ACTOR.to_string(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.operation_token = Some(token.into());
        self
    }

    pub fn by(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    /// Caller token, or `{job_id}:{from_stage}:{payload hash}`
    pub fn token(&self) -> anyhow::Result<String> {
        match self.operation_token {
            Some(ref token) => Ok(token.clone()),
            None => {
                let json = serde_json::to_string(&self.payload)
                    .context("Failed to serialize payload")?;
                Ok(generate_operation_token(self.job_id, self.from_stage, &json))
            }
        }
    }
}

/// Outcome of an accepted (or replayed) request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitReceipt {
    pub job_id: Uuid,

    /// Stage after the request
    pub stage: Stage,

    /// Halted at `Validated` on critical findings
    pub blocked: bool,

    /// Blocking findings when blocked, otherwise every finding of the validation run
    pub findings: Vec<ValidationFinding>,

    /// True when the token had already been applied and nothing was written
    pub replayed: bool,

    /// Sequence number of the last ledger entry the request produced
    pub seq: u64,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Stage mismatch for job {job_id}: request expected '{expected}', job is at '{actual}'")]
    StageMismatch {
        job_id: Uuid,
        expected: Stage,
        actual: Stage,
    },

    #[error("Invalid mapping: {0}")]
    InvalidMapping(#[from] MappingError),

    #[error("Action '{action}' is not allowed at stage '{stage}'")]
    InvalidTransition { stage: Stage, action: Action },

    #[error("Job {job_id} is blocked by {} critical finding(s)", .findings.len())]
    Blocked {
        job_id: Uuid,
        findings: Vec<ValidationFinding>,
    },

    #[error("Collaborator '{collaborator}' failed: {message}")]
    CollaboratorFailure {
        collaborator: String,
        message: String,
    },

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Override reason must not be empty")]
    EmptyOverrideReason,

    #[error("Job {job_id} is not blocked (stage '{stage}')")]
    NotBlocked { job_id: Uuid, stage: Stage },

    #[error("No {0} configured")]
    NotConfigured(&'static str),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Everything known about one job
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub job: Job,
    pub findings: Vec<ValidationFinding>,
    pub ledger: Vec<LedgerEntry>,
}

/// Filter for `list_jobs`
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub stage: Option<Stage>,
    pub batch_id: Option<Uuid>,
}

impl JobFilter {
    pub fn matches(&self, job: &Job) -> bool {
        self.stage.map_or(true, |s| job.stage == s)
            && self
                .batch_id
                .map_or(true, |b| job.descriptor.batch_id == Some(b))
    }
}

enum Outcome {
    Replayed(SubmitReceipt),
    Applied { previous: Box<Job> },
}

/// Main job orchestrator
pub struct Orchestrator {
    store: JobStore,
    feedback: FeedbackStore,
    matcher: ConfidenceMatcher,

    /// Generate as soon as validation passes
    auto_generate: bool,

    document_parser: Arc<dyn DocumentParser>,
    template_parser: Arc<dyn TemplateParser>,
    generator: Arc<dyn ArtifactGenerator>,
    renderer: Option<Arc<dyn PreviewRenderer>>,
    packager: Option<Arc<dyn Packager>>,
}

impl Orchestrator {
    /// Orchestrator with the JSON layout parser and the script generator
    pub fn new(store: JobStore, feedback: FeedbackStore) -> Self {
        let layout = Arc::new(JsonLayoutParser::new());

        Self {
            store,
            feedback,
            matcher: ConfidenceMatcher::default(),
            auto_generate: true,
            document_parser: layout.clone(),
            template_parser: layout,
            generator: Arc::new(ScriptGenerator::default()),
            renderer: None,
            packager: None,
        }
    }

    /// Orchestrator rooted at an explicit home directory
    pub fn with_home(paths: &HomePaths) -> Self {
        Self::new(
            JobStore::open(paths.jobs_dir()),
            FeedbackStore::new(paths.feedback_path()),
        )
        .with_packager(DirectoryPackager::new(paths.packages_dir()))
    }

    /// Orchestrator built from the resolved configuration
    pub fn from_config() -> anyhow::Result<Self> {
        let config = crate::config::config()?;
        let settings = &config.settings;

        let mut orchestrator = Self::with_home(&HomePaths::new(&config.home))
            .with_matcher(ConfidenceMatcher::new(settings.min_confidence))
            .with_auto_generate(settings.auto_generate)
            .with_generator(ScriptGenerator::new(settings.fit_mode));

        if let Some(renderer) = settings
            .render_command
            .as_deref()
            .and_then(|c| CommandRenderer::from_command_line(c, settings.collaborator_timeout))
        {
            orchestrator = orchestrator.with_renderer(renderer);
        }

        Ok(orchestrator)
    }

    pub fn with_matcher(mut self, matcher: ConfidenceMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_auto_generate(mut self, auto_generate: bool) -> Self {
        self.auto_generate = auto_generate;
        self
    }

    pub fn with_document_parser(mut self, parser: impl DocumentParser + 'static) -> Self {
        self.document_parser = Arc::new(parser);
        self
    }

    pub fn with_template_parser(mut self, parser: impl TemplateParser + 'static) -> Self {
        self.template_parser = Arc::new(parser);
        self
    }

    pub fn with_generator(mut self, generator: impl ArtifactGenerator + 'static) -> Self {
        self.generator = Arc::new(generator);
        self
    }

    pub fn with_renderer(mut self, renderer: impl PreviewRenderer + 'static) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    pub fn with_packager(mut self, packager: impl Packager + 'static) -> Self {
        self.packager = Some(Arc::new(packager));
        self
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn feedback(&self) -> &FeedbackStore {
        &self.feedback
    }

    /// Create a job at `Created`
    #[instrument(skip(self, descriptor), fields(source = %descriptor.source, template = %descriptor.template))]
    pub async fn create_job(
        &self,
        descriptor: JobDescriptor,
        actor: &str,
    ) -> Result<Job, SubmitError> {
        let job_id = Uuid::new_v4();

        let entry = LedgerEntry::new(
            job_id,
            EntryKind::JobCreated,
            None,
            Stage::Created,
            format!("{}:create", job_id),
            actor,
            format!("Job created: {} -> {}", descriptor.source, descriptor.template),
        )
        .with_payload(StagePayload::Created(descriptor));

        let (_, appended) = self
            .store
            .ledger(job_id)
            .transact(
                move |committed| -> Result<(Vec<LedgerEntry>, ()), SubmitError> {
                    if !committed.is_empty() {
                        return Err(anyhow::anyhow!("Job {} already exists", job_id).into());
                    }
                    Ok((vec![entry], ()))
                },
            )
            .await?;

        let job = Job::from_entries(&appended).context("Failed to reconstruct job state")?;
        info!(%job_id, "Job created");
        Ok(job)
    }

    /// Apply a transition request.
    ///
    /// A replayed token returns the original receipt. A blocked validation
    /// run is an `Ok` receipt with `blocked = true`.
    #[instrument(skip(self, request), fields(job_id = %request.job_id, from = %request.from_stage, payload = request.payload.label()))]
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitReceipt, SubmitError> {
        let token = request.token()?;
        let derived = request.operation_token.is_none();
        let action = Action::for_payload(&request.payload);

        if action.is_internal() {
            return Err(SubmitError::InvalidTransition {
                stage: request.from_stage,
                action,
            });
        }

        let job_id = request.job_id;
        let ledger = self.store.ledger(job_id);
        if !ledger.exists() {
            return Err(SubmitError::JobNotFound(job_id));
        }

        let note = match request.payload {
            StagePayload::RegenerationRequested(ref r) => r.note.clone(),
            _ => None,
        };

        // the matcher is pure, so it runs before the lock is taken
        let payload = match request.payload {
            StagePayload::Parsed(report) => StagePayload::Ingested(self.match_report(report)),
            other => other,
        };

        let from_stage = request.from_stage;
        let (op_token, actor) = (token.clone(), request.actor.clone());
        let (outcome, appended) = ledger
            .transact(
                move |committed| -> Result<(Vec<LedgerEntry>, Outcome), SubmitError> {
                    // a derived token only replays the latest transition, so an
                    // earlier payload submitted again is a new review
                    let history = if derived {
                        latest_run(&op_token, committed)
                    } else {
                        committed
                    };
                    if let Some(receipt) = receipt_for_token(job_id, &op_token, history, true) {
                        return Ok((Vec::new(), Outcome::Replayed(receipt)));
                    }

                    let job =
                        Job::from_entries(committed).ok_or(SubmitError::JobNotFound(job_id))?;
                    if job.stage != from_stage {
                        return Err(SubmitError::StageMismatch {
                            job_id,
                            expected: from_stage,
                            actual: job.stage,
                        });
                    }

                    let next = check_transition(&job, action)?;
                    let entries = plan_entries(&job, next, payload, &op_token, &actor)?;
                    Ok((
                        entries,
                        Outcome::Applied {
                            previous: Box::new(job),
                        },
                    ))
                },
            )
            .await?;

        let previous = match outcome {
            Outcome::Replayed(receipt) => {
                info!(%token, stage = %receipt.stage, "Request already applied, replaying receipt");
                return Ok(receipt);
            }
            Outcome::Applied { previous } => previous,
        };

        let receipt = receipt_for_token(job_id, &token, &appended, false)
            .context("Transition appended no ledger entries")?;
        info!(stage = %receipt.stage, seq = receipt.seq, "Transition applied");

        match action {
            Action::ReviewMapping => {
                if previous.blocked {
                    // the reviewer took the block's advice and revised the mapping
                    self.record_feedback(&previous, FeedbackDecision::Accepted, None)
                        .await;
                }

                if receipt.blocked {
                    warn!(
                        critical = receipt.findings.len(),
                        "Validation blocked; awaiting revised mapping or override"
                    );
                    Ok(receipt)
                } else if self.auto_generate {
                    self.chain_generation(&token, &request.actor, None, receipt)
                        .await
                } else {
                    Ok(receipt)
                }
            }
            Action::RequestRegeneration => {
                self.chain_generation(&token, &request.actor, note, receipt)
                    .await
            }
            _ => Ok(receipt),
        }
    }

    /// Parse source and template, match, and move the job to `Ingested`
    #[instrument(skip(self))]
    pub async fn ingest(&self, job_id: Uuid, actor: &str) -> Result<SubmitReceipt, SubmitError> {
        let (job, _) = self.load_job(job_id).await?;
        if job.stage != Stage::Created {
            return Err(SubmitError::StageMismatch {
                job_id,
                expected: Stage::Created,
                actual: job.stage,
            });
        }

        let failure_token = format!("{}:ingest:failed", job_id);

        let document = match self
            .document_parser
            .parse_document(job_id, &job.descriptor.source)
            .await
        {
            Ok(document) => document,
            Err(e) => return Err(self.record_failure(&job, &failure_token, actor, e).await),
        };

        let template = match self
            .template_parser
            .parse_template(job_id, &job.descriptor.template)
            .await
        {
            Ok(template) => template,
            Err(e) => return Err(self.record_failure(&job, &failure_token, actor, e).await),
        };

        let mut warnings = document.warnings;
        warnings.extend(template.warnings);

        let report = ParseReport {
            elements: document.elements,
            slots: template.slots,
            warnings,
        };

        self.submit(
            SubmitRequest::new(job_id, Stage::Created, StagePayload::Parsed(report)).by(actor),
        )
        .await
    }

    /// Force a blocked job past the validation gate and generate
    #[instrument(skip(self))]
    pub async fn override_job(
        &self,
        job_id: Uuid,
        reason: &str,
        actor: &str,
    ) -> Result<SubmitReceipt, SubmitError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(SubmitError::EmptyOverrideReason);
        }

        let (job, entries) = self.load_job(job_id).await?;

        // one override per block
        let blocked_seq = entries
            .iter()
            .rev()
            .find(|e| e.kind == EntryKind::ValidationBlocked)
            .map(|e| e.seq)
            .ok_or(SubmitError::NotBlocked {
                job_id,
                stage: job.stage,
            })?;
        let token = format!("{}:override:{}", job_id, blocked_seq);

        let (op_token, op_actor, op_reason) =
            (token.clone(), actor.to_string(), reason.to_string());
        let (replayed, appended) = self
            .store
            .ledger(job_id)
            .transact(
                move |committed| -> Result<(Vec<LedgerEntry>, Option<SubmitReceipt>), SubmitError> {
                    if let Some(receipt) = receipt_for_token(job_id, &op_token, committed, true) {
                        return Ok((Vec::new(), Some(receipt)));
                    }

                    let current =
                        Job::from_entries(committed).ok_or(SubmitError::JobNotFound(job_id))?;
                    let next = check_transition(&current, Action::Override)?;
                    let overridden = current.blocking_findings();

                    let entry = LedgerEntry::new(
                        job_id,
                        EntryKind::OverrideApplied,
                        Some(current.stage),
                        next,
                        &op_token,
                        &op_actor,
                        format!(
                            "Override of {} critical finding(s): {}",
                            overridden.len(),
                            op_reason
                        ),
                    )
                    .with_payload(StagePayload::Override(OverrideRecord {
                        reason: op_reason.clone(),
                        overridden: overridden.clone(),
                    }))
                    .with_findings(overridden);

                    Ok((vec![entry], None))
                },
            )
            .await?;

        if let Some(receipt) = replayed {
            info!(%token, "Override already applied, replaying receipt");
            return Ok(receipt);
        }

        info!(%reason, "Override applied");
        self.record_feedback(&job, FeedbackDecision::Overridden, Some(reason))
            .await;

        let receipt = receipt_for_token(job_id, &token, &appended, false)
            .context("Override appended no ledger entries")?;

        // an override forces the transition regardless of auto_generate
        self.chain_generation(&token, actor, None, receipt).await
    }

    /// Run the artifact generator for a validated (or already generated) job
    #[instrument(skip(self))]
    pub async fn generate(
        &self,
        job_id: Uuid,
        actor: &str,
        operation_token: Option<String>,
    ) -> Result<SubmitReceipt, SubmitError> {
        let (job, _) = self.load_job(job_id).await?;
        let token = operation_token.unwrap_or_else(|| {
            format!("{}:generate:{}", job_id, job.generation_attempts().len())
        });

        self.run_generation(job_id, &token, actor, None).await
    }

    /// Render a preview of the latest generated artifact
    #[instrument(skip(self))]
    pub async fn render_preview(
        &self,
        job_id: Uuid,
        actor: &str,
        operation_token: Option<String>,
    ) -> Result<SubmitReceipt, SubmitError> {
        let (job, entries) = self.load_job(job_id).await?;
        let attempts = job.generation_attempts();
        let token = operation_token
            .unwrap_or_else(|| format!("{}:preview:{}", job_id, attempts.len()));

        if let Some(receipt) = receipt_for_token(job_id, &token, &entries, true) {
            return Ok(receipt);
        }

        if job.stage != Stage::Generated {
            return Err(SubmitError::StageMismatch {
                job_id,
                expected: Stage::Generated,
                actual: job.stage,
            });
        }

        let renderer = self
            .renderer
            .as_ref()
            .ok_or(SubmitError::NotConfigured("preview renderer"))?;
        let artifact = latest_artifact(&job)?;

        match renderer.render(job_id, &artifact).await {
            Ok(preview) => {
                self.commit_result(&job, &token, actor, StagePayload::Preview(preview))
                    .await
            }
            Err(e) => Err(self.record_failure(&job, &token, actor, e).await),
        }
    }

    /// Ask for another generation attempt
    #[instrument(skip(self))]
    pub async fn request_regeneration(
        &self,
        job_id: Uuid,
        note: Option<String>,
        actor: &str,
        operation_token: Option<String>,
    ) -> Result<SubmitReceipt, SubmitError> {
        let (job, _) = self.load_job(job_id).await?;
        let token = operation_token.unwrap_or_else(|| {
            format!("{}:regenerate:{}", job_id, job.generation_attempts().len())
        });

        let payload = StagePayload::RegenerationRequested(RegenerationRequest { note });
        self.submit(
            SubmitRequest::new(job_id, Stage::Generated, payload)
                .with_token(token)
                .by(actor),
        )
        .await
    }

    /// Approve the rendered preview
    #[instrument(skip(self))]
    pub async fn approve_preview(
        &self,
        job_id: Uuid,
        note: Option<String>,
        actor: &str,
    ) -> Result<SubmitReceipt, SubmitError> {
        let (job, _) = self.load_job(job_id).await?;

        let preview = job.payloads.get(&Stage::Generated).and_then(|list| {
            list.iter().rev().find_map(|p| match p {
                StagePayload::Preview(preview) => Some(preview.location.clone()),
                _ => None,
            })
        });

        let payload = StagePayload::PreviewApproved(PreviewReceipt { preview, note });
        self.submit(SubmitRequest::new(job_id, Stage::Generated, payload).by(actor))
            .await
    }

    /// Record final packaging; runs the packager when no reference is given
    #[instrument(skip(self))]
    pub async fn package(
        &self,
        job_id: Uuid,
        reference: Option<String>,
        actor: &str,
    ) -> Result<SubmitReceipt, SubmitError> {
        let (job, _) = self.load_job(job_id).await?;
        if job.stage != Stage::PreviewApproved {
            return Err(SubmitError::StageMismatch {
                job_id,
                expected: Stage::PreviewApproved,
                actual: job.stage,
            });
        }

        let receipt = match reference {
            Some(package) => PackageReceipt {
                package,
                metadata: serde_json::Value::Null,
            },
            None => {
                let packager = self
                    .packager
                    .as_ref()
                    .ok_or(SubmitError::NotConfigured("packager"))?;
                let artifact = latest_artifact(&job)?;
                match packager.package(job_id, &artifact).await {
                    Ok(receipt) => receipt,
                    Err(e) => {
                        let token = format!("{}:package:failed", job_id);
                        return Err(self.record_failure(&job, &token, actor, e).await);
                    }
                }
            }
        };

        self.submit(
            SubmitRequest::new(job_id, Stage::PreviewApproved, StagePayload::Packaged(receipt))
                .by(actor),
        )
        .await
    }

    /// Administrative cancel: a guarded write to `Failed`
    #[instrument(skip(self))]
    pub async fn fail_job(
        &self,
        job_id: Uuid,
        from_stage: Stage,
        reason: &str,
        actor: &str,
    ) -> Result<SubmitReceipt, SubmitError> {
        let payload = StagePayload::Failed(FailureReport::administrative(reason.trim()));
        self.submit(SubmitRequest::new(job_id, from_stage, payload).by(actor))
            .await
    }

    /// Current state, latest findings and full ledger of a job
    pub async fn get_job(&self, job_id: Uuid) -> Result<JobView, SubmitError> {
        let (job, ledger) = self.load_job(job_id).await?;
        Ok(JobView {
            findings: job.findings.clone(),
            job,
            ledger,
        })
    }

    /// Jobs matching a filter, oldest first
    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, SubmitError> {
        let mut jobs = Vec::new();

        for job_id in self.store.list_job_ids().await? {
            match self.store.load(job_id).await {
                Ok(Some((job, _))) if filter.matches(&job) => jobs.push(job),
                Ok(_) => {}
                Err(e) => warn!(%job_id, error = %e, "Skipping unreadable job ledger"),
            }
        }

        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    /// Non-terminal jobs not updated within `threshold`
    pub async fn stalled_jobs(&self, threshold: chrono::Duration) -> Result<Vec<Job>, SubmitError> {
        let cutoff = Utc::now() - threshold;
        let jobs = self.list_jobs(&JobFilter::default()).await?;

        Ok(jobs
            .into_iter()
            .filter(|job| !job.is_terminal() && job.updated_at < cutoff)
            .collect())
    }

    async fn load_job(&self, job_id: Uuid) -> Result<(Job, Vec<LedgerEntry>), SubmitError> {
        self.store
            .load(job_id)
            .await?
            .ok_or(SubmitError::JobNotFound(job_id))
    }

    fn match_report(&self, report: ParseReport) -> IngestRecord {
        let mapping = self.matcher.match_elements(&report.elements, &report.slots);
        IngestRecord {
            elements: report.elements,
            slots: report.slots,
            mapping,
            warnings: report.warnings,
        }
    }

    /// Generation following an accepted request, under a derived token
    async fn chain_generation(
        &self,
        token: &str,
        actor: &str,
        note: Option<String>,
        receipt: SubmitReceipt,
    ) -> Result<SubmitReceipt, SubmitError> {
        let generation_token = format!("{}#generate", token);
        let generated = self
            .run_generation(receipt.job_id, &generation_token, actor, note)
            .await?;

        Ok(SubmitReceipt {
            stage: generated.stage,
            seq: generated.seq,
            ..receipt
        })
    }

    async fn run_generation(
        &self,
        job_id: Uuid,
        token: &str,
        actor: &str,
        note: Option<String>,
    ) -> Result<SubmitReceipt, SubmitError> {
        let (job, entries) = self.load_job(job_id).await?;
        if let Some(receipt) = receipt_for_token(job_id, token, &entries, true) {
            return Ok(receipt);
        }

        check_transition(&job, Action::Generate)?;

        let record = job
            .ingest_record()
            .cloned()
            .with_context(|| format!("Job {} has no ingest record", job_id))?;
        let request = GenerationRequest {
            mapping: job.mapping().cloned().unwrap_or_default(),
            elements: record.elements,
            slots: record.slots,
            attempt: job.generation_attempts().len() + 1,
            note,
        };

        debug!(attempt = request.attempt, generator = self.generator.name(), "Generating artifact");

        match self.generator.generate(job_id, &request).await {
            Ok(artifact) => {
                self.commit_result(&job, token, actor, StagePayload::Generated(artifact))
                    .await
            }
            Err(e) => Err(self.record_failure(&job, token, actor, e).await),
        }
    }

    /// Record a collaborator's success payload, guarded on the stage it was called at
    async fn commit_result(
        &self,
        snapshot: &Job,
        token: &str,
        actor: &str,
        payload: StagePayload,
    ) -> Result<SubmitReceipt, SubmitError> {
        let job_id = snapshot.id;
        let action = Action::for_payload(&payload);

        let expected = snapshot.stage;
        let (op_token, op_actor) = (token.to_string(), actor.to_string());

        let (replayed, appended) = self
            .store
            .ledger(job_id)
            .transact(
                move |committed| -> Result<(Vec<LedgerEntry>, Option<SubmitReceipt>), SubmitError> {
                    if let Some(receipt) = receipt_for_token(job_id, &op_token, committed, true) {
                        return Ok((Vec::new(), Some(receipt)));
                    }

                    let current =
                        Job::from_entries(committed).ok_or(SubmitError::JobNotFound(job_id))?;
                    if current.stage != expected {
                        return Err(SubmitError::StageMismatch {
                            job_id,
                            expected,
                            actual: current.stage,
                        });
                    }

                    let next = check_transition(&current, action)?;
                    let entries = plan_entries(&current, next, payload, &op_token, &op_actor)?;
                    Ok((entries, None))
                },
            )
            .await?;

        if let Some(receipt) = replayed {
            return Ok(receipt);
        }

        let receipt = receipt_for_token(job_id, token, &appended, false)
            .context("Collaborator result appended no ledger entries")?;
        info!(%job_id, stage = %receipt.stage, "Collaborator result recorded");
        Ok(receipt)
    }

    /// Move the job to `Failed` with the collaborator's message, and return the error
    async fn record_failure(
        &self,
        snapshot: &Job,
        token: &str,
        actor: &str,
        failure: CollaboratorError,
    ) -> SubmitError {
        let job_id = snapshot.id;
        error!(
            %job_id,
            collaborator = %failure.collaborator,
            error = %failure.message,
            "Collaborator failed"
        );

        let (op_token, op_actor) = (token.to_string(), actor.to_string());
        let (collaborator, message) = (failure.collaborator.clone(), failure.message.clone());

        let result = self
            .store
            .ledger(job_id)
            .transact(
                move |committed| -> Result<(Vec<LedgerEntry>, ()), SubmitError> {
                    if committed.iter().any(|e| e.operation_token == op_token) {
                        return Ok((Vec::new(), ()));
                    }

                    let current =
                        Job::from_entries(committed).ok_or(SubmitError::JobNotFound(job_id))?;
                    if current.is_terminal() {
                        return Ok((Vec::new(), ()));
                    }

                    let entry = LedgerEntry::new(
                        job_id,
                        EntryKind::JobFailed,
                        Some(current.stage),
                        Stage::Failed,
                        &op_token,
                        &op_actor,
                        format!("{} failed", collaborator),
                    )
                    .with_payload(StagePayload::Failed(FailureReport::collaborator(
                        &collaborator,
                        &message,
                    )))
                    .with_error(&message);

                    Ok((vec![entry], ()))
                },
            )
            .await;

        if let Err(e) = result {
            error!(%job_id, error = %e, "Failed to record collaborator failure");
        }

        SubmitError::CollaboratorFailure {
            collaborator: failure.collaborator,
            message: failure.message,
        }
    }

    /// Append feedback for the entries that blocked `job`'s last validation run
    async fn record_feedback(&self, job: &Job, decision: FeedbackDecision, note: Option<&str>) {
        let (Some(record), Some(mapping)) = (job.ingest_record(), job.mapping()) else {
            return;
        };

        let report = validate_mapping(mapping, &record.elements, &record.slots);
        let records = report.feedback_for_blocked(job.id, decision, note);

        let count = records.len();
        let feedback = self.feedback.clone();

        match tokio::task::spawn_blocking(move || feedback.append(&records)).await {
            Ok(Ok(())) => debug!(job_id = %job.id, records = count, ?decision, "Feedback recorded"),
            Ok(Err(e)) => warn!(job_id = %job.id, error = %e, "Failed to record feedback"),
            Err(e) => warn!(job_id = %job.id, error = %e, "Feedback task failed"),
        }
    }
}

/// Stage the action leads to, or the structured reason it cannot be taken
fn check_transition(job: &Job, action: Action) -> Result<Stage, SubmitError> {
    next_stage(job.stage, job.blocked, action).map_err(|_| match action {
        Action::Generate if job.blocked => SubmitError::Blocked {
            job_id: job.id,
            findings: job.blocking_findings(),
        },
        Action::Override if !job.is_terminal() => SubmitError::NotBlocked {
            job_id: job.id,
            stage: job.stage,
        },
        _ => SubmitError::InvalidTransition {
            stage: job.stage,
            action,
        },
    })
}

/// Ledger entries for an accepted transition
fn plan_entries(
    job: &Job,
    next: Stage,
    payload: StagePayload,
    token: &str,
    actor: &str,
) -> Result<Vec<LedgerEntry>, SubmitError> {
    let job_id = job.id;
    let from = Some(job.stage);
    let entry = |kind: EntryKind, to: Stage, summary: String| {
        LedgerEntry::new(job_id, kind, from, to, token, actor, summary)
    };

    let entries = match payload {
        StagePayload::Ingested(record) => {
            let mut entries: Vec<LedgerEntry> = record
                .warnings
                .iter()
                .map(|w| entry(EntryKind::WarningRecorded, job.stage, w.clone()))
                .collect();

            let summary = format!(
                "Ingested {} element(s), {} slot(s), {} matched",
                record.elements.len(),
                record.slots.len(),
                record.mapping.accepted().count()
            );
            entries.push(
                entry(EntryKind::StageAdvanced, next, summary)
                    .with_payload(StagePayload::Ingested(record)),
            );
            entries
        }

        StagePayload::Mapping(mapping) => {
            let record = job
                .ingest_record()
                .with_context(|| format!("Job {} has no ingest record", job_id))?;
            mapping.validate(&record.elements, &record.slots)?;

            let report = validate_mapping(&mapping, &record.elements, &record.slots);

            let reviewed = entry(
                EntryKind::StageAdvanced,
                next,
                format!(
                    "Mapping approved: {} of {} element(s) assigned",
                    mapping.accepted().count(),
                    mapping.entries.len()
                ),
            )
            .with_payload(StagePayload::Mapping(mapping));

            let validated = if report.is_blocked() {
                LedgerEntry::new(
                    job_id,
                    EntryKind::ValidationBlocked,
                    Some(next),
                    Stage::Validated,
                    token,
                    actor,
                    format!(
                        "Validation blocked: {} critical finding(s)",
                        report.critical_findings().len()
                    ),
                )
            } else {
                LedgerEntry::new(
                    job_id,
                    EntryKind::StageAdvanced,
                    Some(next),
                    Stage::Validated,
                    token,
                    actor,
                    format!("Validation passed with {} finding(s)", report.findings.len()),
                )
            }
            .with_payload(StagePayload::Validation(report.to_record()))
            .with_findings(report.findings);

            vec![reviewed, validated]
        }

        StagePayload::Generated(artifact) => {
            let summary = format!(
                "Artifact generated by {} (attempt {})",
                artifact.generator,
                job.generation_attempts().len() + 1
            );
            vec![entry(EntryKind::StageAdvanced, next, summary)
                .with_payload(StagePayload::Generated(artifact))]
        }

        StagePayload::RegenerationRequested(request) => {
            let summary = match request.note {
                Some(ref note) => format!("Regeneration requested: {}", note),
                None => "Regeneration requested".to_string(),
            };
            vec![entry(EntryKind::RegenerationRequested, next, summary)
                .with_payload(StagePayload::RegenerationRequested(request))]
        }

        StagePayload::Preview(preview) => {
            let summary = format!("Preview rendered at {}", preview.location);
            vec![entry(EntryKind::PreviewRendered, next, summary)
                .with_payload(StagePayload::Preview(preview))]
        }

        StagePayload::PreviewApproved(receipt) => {
            vec![entry(EntryKind::StageAdvanced, next, "Preview approved".to_string())
                .with_payload(StagePayload::PreviewApproved(receipt))]
        }

        StagePayload::Packaged(receipt) => {
            let summary = format!("Packaged: {}", receipt.package);
            vec![entry(EntryKind::StageAdvanced, next, summary)
                .with_payload(StagePayload::Packaged(receipt))]
        }

        StagePayload::Failed(report) => {
            let message = report.message.clone();
            vec![entry(EntryKind::JobFailed, next, format!("Job failed: {}", message))
                .with_payload(StagePayload::Failed(report))
                .with_error(message)]
        }

        other @ (StagePayload::Created(_)
        | StagePayload::Parsed(_)
        | StagePayload::Validation(_)
        | StagePayload::Override(_)) => {
            return Err(SubmitError::InvalidTransition {
                stage: job.stage,
                action: Action::for_payload(&other),
            });
        }
    };

    Ok(entries)
}

/// Trailing entries written under `token` or its chained follow-ups
fn latest_run<'a>(token: &str, entries: &'a [LedgerEntry]) -> &'a [LedgerEntry] {
    let chained = format!("{}#", token);
    let start = entries
        .iter()
        .rposition(|e| e.operation_token != token && !e.operation_token.starts_with(&chained))
        .map_or(0, |i| i + 1);
    &entries[start..]
}

/// Receipt reconstructed from the entries a token (and its chained follow-ups) produced
fn receipt_for_token(
    job_id: Uuid,
    token: &str,
    entries: &[LedgerEntry],
    replayed: bool,
) -> Option<SubmitReceipt> {
    let chained = format!("{}#", token);
    let group: Vec<&LedgerEntry> = entries
        .iter()
        .filter(|e| e.operation_token == token || e.operation_token.starts_with(&chained))
        .collect();

    let last = group.last()?;
    let blocked = last.kind == EntryKind::ValidationBlocked;

    let findings: Vec<ValidationFinding> = group
        .iter()
        .rev()
        .find(|e| !e.findings.is_empty())
        .map(|e| e.findings.clone())
        .unwrap_or_default();
    let findings = if blocked {
        findings.into_iter().filter(|f| f.is_critical()).collect()
    } else {
        findings
    };

    Some(SubmitReceipt {
        job_id,
        stage: last.to_stage,
        blocked,
        findings,
        replayed,
        seq: last.seq,
    })
}

fn latest_artifact(job: &Job) -> Result<GeneratedArtifact, SubmitError> {
    job.generation_attempts()
        .last()
        .map(|a| (*a).clone())
        .with_context(|| format!("Job {} has no generated artifact", job.id))
        .map_err(SubmitError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MappingEntry, MatchMethod, Severity, FindingCategory};

    #[test]
    fn test_submit_request_token_is_stable() {
        let job_id = Uuid::new_v4();
        let payload = StagePayload::RegenerationRequested(RegenerationRequest {
            note: Some("tighter crop".to_string()),
        });

        let a = SubmitRequest::new(job_id, Stage::Generated, payload.clone());
        let b = SubmitRequest::new(job_id, Stage::Generated, payload);
        assert_eq!(a.token().unwrap(), b.token().unwrap());

        let c = a.clone().with_token("op-1");
        assert_eq!(c.token().unwrap(), "op-1");
    }

    #[test]
    fn test_receipt_for_token_groups_chained_entries() {
        let job_id = Uuid::new_v4();
        let finding = ValidationFinding::new(
            Severity::Warning,
            FindingCategory::AspectRatio,
            "moderate",
            MappingEntry::matched("hero", "Hero", 0.9, MatchMethod::Fuzzy),
        );

        let mut validated = LedgerEntry::new(
            job_id,
            EntryKind::StageAdvanced,
            Some(Stage::MatchReviewed),
            Stage::Validated,
            "op",
            "r",
            "passed",
        )
        .with_findings(vec![finding.clone()]);
        validated.seq = 4;

        let mut generated = LedgerEntry::new(
            job_id,
            EntryKind::StageAdvanced,
            Some(Stage::Validated),
            Stage::Generated,
            "op#generate",
            "r",
            "generated",
        );
        generated.seq = 5;

        let mut unrelated = generated.clone();
        unrelated.operation_token = "op-2".to_string();
        unrelated.seq = 6;

        let receipt =
            receipt_for_token(job_id, "op", &[validated, generated, unrelated], true).unwrap();
        assert_eq!(receipt.stage, Stage::Generated);
        assert_eq!(receipt.seq, 5);
        assert_eq!(receipt.findings, vec![finding]);
        assert!(receipt.replayed);
        assert!(!receipt.blocked);

        assert!(receipt_for_token(job_id, "missing", &[], true).is_none());
    }

    #[test]
    fn test_job_filter() {
        let batch_id = Uuid::new_v4();
        let mut created = LedgerEntry::new(
            Uuid::new_v4(),
            EntryKind::JobCreated,
            None,
            Stage::Created,
            "create",
            "t",
            "created",
        )
        .with_payload(StagePayload::Created(
            JobDescriptor::new("a.json", "b.json").in_batch(batch_id),
        ));
        created.seq = 1;
        let job = Job::from_entries(&[created]).unwrap();

        assert!(JobFilter::default().matches(&job));
        assert!(JobFilter {
            stage: Some(Stage::Created),
            batch_id: Some(batch_id)
        }
        .matches(&job));
        assert!(!JobFilter {
            stage: Some(Stage::Ingested),
            batch_id: None
        }
        .matches(&job));
    }
}
