//! Orchestrator: sequences the review rituals for one proposal update.
//!
//! Phases run strictly in order and the first error aborts the rest. Every
//! ritual call carries the run's job id (in the body and as a header) and is
//! recorded in the ritual ledger. The run ends with exactly one orchestrator
//! record in the mutation log, followed by a best-effort liveness ping and,
//! when a fanout is attached, a relay to the external broadcast channels.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use beehive_core::{new_job_id, DiffArtifact, Error, Overlay, Result};
use beehive_ritual::{
    InvocationRecord, InvokeOptions, Metadata, RitualInvoker, RitualLedger, RitualResponse,
};
use beehive_store::{MutationLog, MutationRecord};

use crate::broadcast::{BroadcastFanout, BroadcastRequest};
use crate::dedup::{ClaimOutcome, DeliveryDedup};
use crate::files::ChangedFilesSource;
use crate::labels;
use crate::outputs::{CoherenceVerdict, RiskAssessment, RitualOutputs, TodoSuggestions};
use crate::trigger::{Proposal, Trigger};

/// Ritual names, as addressed under the ritual base endpoint.
pub mod rituals {
    pub const PREDICT_TODOS: &str = "predict-todos";
    pub const LABEL_PR: &str = "label-pr";
    pub const FORGE_EDGE: &str = "forge-edge";
    pub const COHERENCE_CHECK: &str = "coherence-check";
    pub const RISK_SCORE: &str = "risk-score";
    pub const REVIEWER_SUMMONER: &str = "reviewer-summoner";
    pub const PR_GATE: &str = "pr-gate";
    pub const MUTATION_MAP: &str = "mutation-map";
    pub const RITUAL_PING: &str = "ritual-ping";
}

/// Name under which the orchestrator writes its own mutation records.
pub const ORCHESTRATOR_RITUAL: &str = "orchestrator";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Initial,
    FetchFiles,
    Housekeeping,
    PredictTodos,
    Labeling,
    Forge,
    Coherence,
    Risk,
    Reviewers,
    Gate,
    Preservation,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::FetchFiles => "fetch-files",
            Self::Housekeeping => "housekeeping",
            Self::PredictTodos => "predict-todos",
            Self::Labeling => "labeling",
            Self::Forge => "forge",
            Self::Coherence => "coherence",
            Self::Risk => "risk",
            Self::Reviewers => "reviewers",
            Self::Gate => "gate",
            Self::Preservation => "preservation",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReviewOutcome {
    Ignored { action: String },
    /// Collapsed into an earlier run for the same proposal update.
    Duplicate { job_id: String },
    Completed {
        job_id: String,
        overlay: Overlay,
        outputs: RitualOutputs,
    },
    Failed {
        job_id: String,
        phase: Phase,
        error: String,
    },
}

impl ReviewOutcome {
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::Ignored { .. } => None,
            Self::Duplicate { job_id }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. } => Some(job_id),
        }
    }

    /// Human-readable acknowledgement or phase-qualified failure.
    pub fn message(&self) -> String {
        match self {
            Self::Ignored { action } => {
                format!("Ignoring event: action '{}' is not a proposal update.", action)
            }
            Self::Duplicate { job_id } => {
                format!("Duplicate delivery; already handled by {}.", job_id)
            }
            Self::Completed { overlay, .. } => format!(
                "Review completed for PR #{} ({} files).",
                overlay.proposal_number, overlay.file_count
            ),
            Self::Failed { phase, error, .. } => {
                format!("Orchestration failed during the {} phase: {}", phase, error)
            }
        }
    }
}

/// Per-run state threaded through every phase.
struct RunContext {
    job_id: String,
    actor: String,
    proposal: Proposal,
    options: InvokeOptions,
    overlay: Option<Overlay>,
    diffs: Vec<DiffArtifact>,
    files: Vec<String>,
}

impl RunContext {
    /// Stamp a ritual payload with the job id and, once known, the overlay.
    fn payload(&self, mut body: Value) -> Value {
        if let Value::Object(map) = &mut body {
            map.insert("job_id".into(), json!(self.job_id));
            if let Some(overlay) = &self.overlay {
                let overlay = serde_json::to_value(overlay).unwrap_or(Value::Null);
                map.insert("overlay".into(), overlay);
            }
        }
        body
    }

    fn full_context(&self) -> Value {
        self.payload(json!({
            "pr_number": self.proposal.number,
            "pr_author": self.proposal.author,
            "head_sha": self.proposal.head_commit,
            "diffs": self.diffs,
            "files": self.files,
        }))
    }
}

pub struct Orchestrator {
    rituals: Arc<dyn RitualInvoker>,
    files: Arc<dyn ChangedFilesSource>,
    log: Arc<MutationLog>,
    ledger: Arc<RitualLedger>,
    dedup: Arc<DeliveryDedup>,
    source_token: Option<String>,
    broadcast: Option<Arc<BroadcastFanout>>,
}

impl Orchestrator {
    pub fn new(
        rituals: Arc<dyn RitualInvoker>,
        files: Arc<dyn ChangedFilesSource>,
        log: Arc<MutationLog>,
        ledger: Arc<RitualLedger>,
        dedup: Arc<DeliveryDedup>,
        source_token: Option<String>,
    ) -> Self {
        Self {
            rituals,
            files,
            log,
            ledger,
            dedup,
            source_token,
            broadcast: None,
        }
    }

    /// Relay each run's outcome to the external broadcast channels.
    pub fn with_broadcast(mut self, fanout: Arc<BroadcastFanout>) -> Self {
        self.broadcast = Some(fanout);
        self
    }

    /// Handle one validated trigger end to end.
    pub async fn handle(&self, trigger: Trigger) -> ReviewOutcome {
        let proposal = match trigger {
            Trigger::Ignored { action } => {
                info!("Ignoring trigger with action '{}'", action);
                return ReviewOutcome::Ignored { action };
            }
            Trigger::Review { proposal, .. } => proposal,
        };

        let job_id = new_job_id();
        let mut ctx = RunContext {
            actor: proposal.actor(),
            options: InvokeOptions::for_job(&job_id),
            job_id: job_id.clone(),
            proposal,
            overlay: None,
            diffs: Vec::new(),
            files: Vec::new(),
        };
        let mut outputs = RitualOutputs::new(&job_id);

        let token = match self.source_token.as_deref() {
            Some(token) => token.to_string(),
            None => {
                let err = Error::configuration("Missing required environment variable: GITHUB_PAT");
                return self.fail(&ctx, &outputs, err).await;
            }
        };
        if let Err(err) = self.rituals.ensure_ready(&ctx.options) {
            return self.fail(&ctx, &outputs, err).await;
        }

        if let ClaimOutcome::Duplicate { job_id } =
            self.dedup
                .claim(ctx.proposal.number, &ctx.proposal.head_commit, &ctx.job_id)
        {
            info!(
                "PR #{}@{} already handled by {}",
                ctx.proposal.number, ctx.proposal.head_commit, job_id
            );
            return ReviewOutcome::Duplicate { job_id };
        }

        info!("Review started: PR #{} job={}", ctx.proposal.number, ctx.job_id);
        match self.execute(&mut ctx, &mut outputs, &token).await {
            Ok(()) => self.succeed(&ctx, outputs).await,
            Err(err) => {
                self.dedup
                    .release(ctx.proposal.number, &ctx.proposal.head_commit, &ctx.job_id);
                self.fail(&ctx, &outputs, err).await
            }
        }
    }

    async fn execute(
        &self,
        ctx: &mut RunContext,
        outputs: &mut RitualOutputs,
        token: &str,
    ) -> Result<()> {
        enter(outputs, Phase::FetchFiles);
        ctx.diffs = self.files.list(&ctx.proposal, token).await?;
        ctx.files = ctx.diffs.iter().map(|d| d.filename.clone()).collect();
        let overlay = Overlay::compute(
            &ctx.job_id,
            ctx.proposal.number,
            &ctx.proposal.head_commit,
            &ctx.diffs,
        );
        info!(
            "Overlay: {} files, +{} -{}, {} patch bytes",
            overlay.file_count, overlay.additions, overlay.deletions, overlay.patch_bytes
        );
        ctx.overlay = Some(overlay);

        enter(outputs, Phase::Housekeeping);
        outputs.housekeeping = Some(json!({
            "marker": "housekeeping",
            "at": chrono::Utc::now(),
            "fileCount": ctx.files.len(),
        }));

        enter(outputs, Phase::PredictTodos);
        let payload = ctx.payload(json!({ "diffs": ctx.diffs }));
        let response = self.call(ctx, rituals::PREDICT_TODOS, payload).await?;
        let todos = TodoSuggestions::from_response(response);
        info!("{} todo suggestions", todos.total());
        outputs.todos = Some(todos);

        enter(outputs, Phase::Labeling);
        let report = labels::classify(&ctx.files);
        if !report.unmatched.is_empty() {
            info!("{} files matched no label rule", report.unmatched.len());
        }
        let payload = ctx.payload(json!({
            "pr_number": ctx.proposal.number,
            "files": ctx.files,
            "labels": report.labels,
            "unmatched": report.unmatched,
        }));
        self.call(ctx, rituals::LABEL_PR, payload).await?;
        outputs.labels = Some(report);

        enter(outputs, Phase::Forge);
        let response = self.call(ctx, rituals::FORGE_EDGE, ctx.full_context()).await?;
        outputs.forge = Some(response.into_value());

        enter(outputs, Phase::Coherence);
        let response = self.call(ctx, rituals::COHERENCE_CHECK, ctx.full_context()).await?;
        let verdict = CoherenceVerdict::from_response(rituals::COHERENCE_CHECK, response)?;
        outputs.coherence = Some(verdict.clone());
        if verdict.is_fail() {
            return Err(Error::GateFailure(verdict.reason_or_default().to_string()));
        }

        enter(outputs, Phase::Risk);
        let payload = ctx.payload(json!({ "diffs": ctx.diffs }));
        let response = self.call(ctx, rituals::RISK_SCORE, payload).await?;
        let risk = RiskAssessment::from_response(rituals::RISK_SCORE, response)?;
        info!("Risk {} ({})", risk.level.as_str(), risk.score);
        outputs.risk = Some(risk.clone());

        enter(outputs, Phase::Reviewers);
        let payload = ctx.payload(json!({
            "pr_number": ctx.proposal.number,
            "files": ctx.files,
        }));
        outputs.reviewers = Some(match self.call(ctx, rituals::REVIEWER_SUMMONER, payload).await {
            Ok(response) => response.into_value(),
            Err(e) => {
                warn!("Reviewer assignment failed, continuing: {}", e);
                json!({ "error": e.to_string() })
            }
        });

        if risk.is_high() {
            enter(outputs, Phase::Gate);
            let payload = ctx.payload(json!({
                "pr_number": ctx.proposal.number,
                "risk_level": risk.level,
                "head_sha": ctx.proposal.head_commit,
            }));
            let response = self.call(ctx, rituals::PR_GATE, payload).await?;
            outputs.gate = Some(response.into_value());
        }

        enter(outputs, Phase::Preservation);
        let payload = ctx.payload(json!({
            "pr_number": ctx.proposal.number,
            "head_sha": ctx.proposal.head_commit,
            "changed_files": ctx.files,
            "pr_author": ctx.proposal.author,
            "ritual_outputs": outputs.to_value(),
        }));
        let response = self.call(ctx, rituals::MUTATION_MAP, payload).await?;
        outputs.preservation = Some(response.into_value());

        Ok(())
    }

    /// Invoke one ritual and record it in the ledger.
    async fn call(&self, ctx: &RunContext, ritual: &str, payload: Value) -> Result<RitualResponse> {
        let mut metadata = Metadata::new();
        metadata.insert("jobId".into(), json!(ctx.job_id));
        metadata.insert("prNumber".into(), json!(ctx.proposal.number));

        let record = InvocationRecord::new(ritual, Some(payload.clone()), Some(metadata));
        let invocation_id = record.id.clone();
        if let Err(e) = self.ledger.start(record, None, Some("invoked")) {
            warn!("Ledger start failed for {}: {}", ritual, e);
        }

        match self.rituals.invoke(ritual, &payload, &ctx.actor, &ctx.options).await {
            Ok(response) => {
                if let Err(e) = self.ledger.complete(&invocation_id, None, Some("completed")) {
                    warn!("Ledger complete failed for {}: {}", ritual, e);
                }
                Ok(response)
            }
            Err(err) => {
                let mut detail = Metadata::new();
                detail.insert("error".into(), json!(err.to_string()));
                if let Err(e) = self.ledger.fail(&invocation_id, Some(detail), Some("failed")) {
                    warn!("Ledger fail failed for {}: {}", ritual, e);
                }
                Err(err)
            }
        }
    }

    async fn succeed(&self, ctx: &RunContext, outputs: RitualOutputs) -> ReviewOutcome {
        let overlay = ctx.overlay.clone().unwrap_or_else(|| {
            Overlay::compute(&ctx.job_id, ctx.proposal.number, &ctx.proposal.head_commit, &[])
        });

        let message = format!(
            "Worker lifecycle completed for PR #{}. coherence PASS.",
            ctx.proposal.number
        );
        let record = MutationRecord::ok(&ctx.actor, ORCHESTRATOR_RITUAL, message.clone())
        .with_metadata(json!({
            "prNumber": ctx.proposal.number,
            "jobId": ctx.job_id,
            "headCommit": ctx.proposal.head_commit,
            "coherence": "PASS",
            "outputs": outputs.to_value(),
        }))
        .with_overlay(overlay.clone());
        self.log.append(record);

        info!("Review completed: PR #{} job={}", ctx.proposal.number, ctx.job_id);
        self.ping(ctx, "ok").await;
        self.relay(ctx, &outputs, "success", message).await;

        ReviewOutcome::Completed {
            job_id: ctx.job_id.clone(),
            overlay,
            outputs,
        }
    }

    async fn fail(&self, ctx: &RunContext, outputs: &RitualOutputs, err: Error) -> ReviewOutcome {
        let phase = outputs.current_phase;
        error!("Review failed during {} phase (job {}): {}", phase, ctx.job_id, err);

        let metadata = json!({
            "prNumber": ctx.proposal.number,
            "jobId": ctx.job_id,
            "headCommit": ctx.proposal.head_commit,
            "phase": phase,
            "gate": err.is_gate(),
            "ritualStatus": err.invocation_status(),
            "outputs": outputs.to_value(),
        });
        let mut record = MutationRecord::fail(&ctx.actor, ORCHESTRATOR_RITUAL, err.to_string())
            .with_metadata(metadata);
        if let Some(overlay) = &ctx.overlay {
            record = record.with_overlay(overlay.clone());
        }
        self.log.append(record);

        // Configuration errors stop before any remote call, the ping included.
        if !err.is_configuration() {
            self.ping(ctx, "fail").await;
            let message = format!("Review failed during the {} phase: {}", phase, err);
            self.relay(ctx, outputs, "fail", message).await;
        }

        ReviewOutcome::Failed {
            job_id: ctx.job_id.clone(),
            phase,
            error: err.to_string(),
        }
    }

    async fn ping(&self, ctx: &RunContext, status: &str) {
        let payload = ctx.payload(json!({
            "ritual": ORCHESTRATOR_RITUAL,
            "status": status,
            "pr_number": ctx.proposal.number,
        }));
        if let Err(e) = self
            .rituals
            .invoke(rituals::RITUAL_PING, &payload, &ctx.actor, &ctx.options)
            .await
        {
            warn!("Liveness ping '{}' failed: {}", status, e);
        }
    }

    /// Best-effort relay to the external channels; the primary record is already written.
    async fn relay(
        &self,
        ctx: &RunContext,
        outputs: &RitualOutputs,
        status: &str,
        message: String,
    ) {
        let Some(fanout) = &self.broadcast else {
            return;
        };
        let request = BroadcastRequest {
            pr_number: Some(ctx.proposal.number),
            message,
            ritual_status: status.to_string(),
            ritual_outputs: Some(outputs.to_value()),
            payload: Some(json!({
                "jobId": ctx.job_id,
                "sizeBytes": ctx.overlay.as_ref().map(|o| o.patch_bytes),
            })),
        };
        let report = fanout.relay(&request, &ctx.actor).await;
        debug!("Relayed outcome of job {} to {} channels", ctx.job_id, report.results.len());
    }
}

fn enter(outputs: &mut RitualOutputs, phase: Phase) {
    outputs.current_phase = phase;
    info!("Lifecycle phase: {}", phase);
}
