//! Phase Controller.
//!
//! Drives one evaluation through the state machine in [`super::state`]:
//! scoring fan-out, detection, the optional remediation round, and
//! aggregation. Every phase writes exactly one execution log entry, even when
//! it fails. Recovered failures (a scorer that timed out, a remediation
//! procedure that crashed) are recorded and the run carries on; only "no
//! usable results" and aggregation errors end a run early.

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{warn, Instrument};
use uuid::Uuid;
use verdict_store::{ArtifactKey, ArtifactStore, BaselineStore};

use crate::aggregation::{AggregationInput, Aggregator, FinalVerdict, NormalizedScore, Normalizer};
use crate::collaboration::{panic_message, CollaborationCoordinator};
use crate::config::EvaluationConfig;
use crate::detection::{self, DetectionReport};
use crate::domain::{
    AdversarialResult, Competency, CompetencyResult, JobContext, MediationResult, Transcript,
};
use crate::invoker::{AgentClient, AgentInvoker, AgentResult, AgentRole};
use crate::metrics::METRICS;
use crate::obs;

use super::error::{PipelineError, PipelineResult};
use super::state::{EvaluationRun, FailureRecord, PhasePatch, RunStatus};
use super::trace::ExecutionLogEntry;

/// Input for one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    /// Generated when absent.
    #[serde(default)]
    pub run_id: Option<String>,
    pub candidate_id: String,
    pub job: JobContext,
    pub transcript: Transcript,
}

impl EvaluationRequest {
    pub fn new(candidate_id: impl Into<String>, job: JobContext, transcript: Transcript) -> Self {
        Self {
            run_id: None,
            candidate_id: candidate_id.into(),
            job,
            transcript,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }
}

/// What the caller gets back: always a status and the full log, plus the
/// verdict when the run completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub run_id: String,
    pub candidate_id: String,
    pub job_id: String,
    pub status: RunStatus,
    pub verdict: Option<FinalVerdict>,
    pub normalized: Option<NormalizedScore>,
    pub detection: Option<DetectionReport>,
    pub mediations: Vec<MediationResult>,
    pub validations: Vec<AdversarialResult>,
    pub failures: Vec<FailureRecord>,
    pub error: Option<String>,
    pub execution_log: Vec<ExecutionLogEntry>,
}

impl EvaluationOutcome {
    fn from_run(run: &EvaluationRun) -> Self {
        let (mediations, validations) = run
            .collaboration()
            .map(|c| (c.mediations.clone(), c.validations.clone()))
            .unwrap_or_default();
        Self {
            run_id: run.run_id().to_string(),
            candidate_id: run.candidate_id().to_string(),
            job_id: run.job().job_id.clone(),
            status: run.status(),
            verdict: run.verdict().cloned(),
            normalized: run.normalized().cloned(),
            detection: run.detection().cloned(),
            mediations,
            validations,
            failures: run.failures().to_vec(),
            error: run.error().map(str::to_string),
            execution_log: run.log().entries().to_vec(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

struct Scored {
    results: BTreeMap<Competency, CompetencyResult>,
    failures: Vec<FailureRecord>,
    attempted: usize,
}

/// What one scoring task hands back: the agent's answer, or the message of a
/// panic caught inside the task.
type ScoringSlot = Result<AgentResult<CompetencyResult>, String>;

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Sequences the phases of an evaluation.
pub struct PhaseController {
    invoker: AgentInvoker,
    config: Arc<EvaluationConfig>,
    artifacts: Option<Arc<dyn ArtifactStore>>,
    normalizer: Option<Normalizer>,
    /// Detached artifact writes not yet seen finished. Finished handles are
    /// dropped on every new write; dropping the controller leaves the rest
    /// running.
    pending_writes: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for PhaseController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseController")
            .field("invoker", &self.invoker)
            .field("config", &self.config)
            .field("artifacts", &self.artifacts.is_some())
            .field("normalizer", &self.normalizer)
            .finish()
    }
}

impl PhaseController {
    /// Validate `config` and build a controller around `client`.
    pub fn new(client: Arc<dyn AgentClient>, config: EvaluationConfig) -> PipelineResult<Self> {
        config.validate()?;
        let invoker = AgentInvoker::new(client).with_call_timeout(config.agent.call_timeout());
        Ok(Self {
            invoker,
            config: Arc::new(config),
            artifacts: None,
            normalizer: None,
            pending_writes: Mutex::new(Vec::new()),
        })
    }

    /// Store phase outputs and the execution log for auditing.
    pub fn with_artifact_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = Some(store);
        self
    }

    /// Normalize against (and record into) population baselines. Only used
    /// when `normalization.enabled` is set.
    pub fn with_baseline_store(mut self, store: Arc<dyn BaselineStore>) -> Self {
        self.normalizer = Some(Normalizer::new(store, self.config.normalization.clone()));
        self
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Run an evaluation to completion.
    pub async fn execute(&self, request: EvaluationRequest) -> EvaluationOutcome {
        self.execute_with_cancel(request, std::future::pending())
            .await
    }

    /// Run an evaluation, abandoning it as soon as `cancel` resolves.
    ///
    /// A cancelled run is marked failed and still returns its full log, ending
    /// with a `cancelled` entry.
    pub async fn execute_with_cancel<C>(
        &self,
        request: EvaluationRequest,
        cancel: C,
    ) -> EvaluationOutcome
    where
        C: Future<Output = ()>,
    {
        let run_id = request
            .run_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let span = obs::evaluation_span(&run_id, &request.candidate_id, &request.job.job_id);
        self.drive(run_id, request, cancel).instrument(span).await
    }

    async fn drive<C>(
        &self,
        run_id: String,
        request: EvaluationRequest,
        cancel: C,
    ) -> EvaluationOutcome
    where
        C: Future<Output = ()>,
    {
        let started = Instant::now();
        let mut run = EvaluationRun::new(run_id, request.candidate_id.clone(), request.job.clone());
        obs::emit_evaluation_started(run.run_id(), self.config.weights.len());

        let cancel_started = Instant::now();
        tokio::pin!(cancel);
        let result = tokio::select! {
            biased;
            _ = &mut cancel => None,
            result = self.run_phases(&mut run, &request.transcript) => Some(result),
        };

        let failure = match result {
            Some(Ok(())) => None,
            Some(Err(e)) => Some(e),
            None => {
                let phase = run.status();
                let entry = ExecutionLogEntry::new(phase, "cancelled", elapsed_ms(cancel_started))
                    .with_error("evaluation cancelled");
                self.record(&mut run, PhasePatch::Log(entry));
                Some(PipelineError::Cancelled { phase })
            }
        };
        if let Some(err) = failure {
            warn!(run_id = %run.run_id(), error = %err, "evaluation failed");
            self.record(&mut run, PhasePatch::Fail(err.to_string()));
        }

        let completed = run.status() == RunStatus::Completed;
        METRICS.inc_evaluations(completed);
        obs::emit_evaluation_finished(
            run.run_id(),
            run.status().as_str(),
            elapsed_ms(started),
            run.verdict().map(|v| v.weighted_score),
        );

        let outcome = EvaluationOutcome::from_run(&run);
        self.store_artifact(
            run.run_id(),
            "execution_log",
            serde_json::to_value(run.log()),
        );
        self.store_artifact(run.run_id(), "outcome", serde_json::to_value(&outcome));
        outcome
    }

    /// Apply a patch the controller itself built. These only fail on a
    /// controller bug, so the error is logged rather than surfaced.
    fn record(&self, run: &mut EvaluationRun, patch: PhasePatch) {
        if let Err(e) = run.apply(patch) {
            warn!(run_id = %run.run_id(), error = %e, "run record rejected patch");
        }
    }

    async fn run_phases(
        &self,
        run: &mut EvaluationRun,
        transcript: &Transcript,
    ) -> PipelineResult<()> {
        self.evaluate(run, transcript).await?;
        let detection = self.detect(run)?;
        if detection.requires_collaboration && self.config.collaboration.enabled {
            self.collaborate(run, &detection, transcript).await?;
        }
        self.aggregate(run, &detection).await?;
        run.apply(PhasePatch::Transition(RunStatus::Completed))
    }

    // ---- EVALUATING ---------------------------------------------------------

    async fn evaluate(
        &self,
        run: &mut EvaluationRun,
        transcript: &Transcript,
    ) -> PipelineResult<()> {
        run.apply(PhasePatch::Transition(RunStatus::Evaluating))?;
        let started = Instant::now();
        let scored = self.score_all(run.run_id(), transcript, run.job()).await;

        let succeeded = scored.results.len();
        let failed = scored.failures.len();
        let mut entry = ExecutionLogEntry::new(
            RunStatus::Evaluating,
            "competency_fanout",
            elapsed_ms(started),
        )
        .with_count("attempted", scored.attempted as u64)
        .with_count("succeeded", succeeded as u64)
        .with_count("failed", failed as u64);
        let fatal = (succeeded == 0).then_some(PipelineError::NoUsableResults {
            attempted: scored.attempted,
            failed,
        });
        if let Some(err) = &fatal {
            entry = entry.with_error(err.to_string());
        }
        obs::emit_phase_finished(
            run.run_id(),
            RunStatus::Evaluating.as_str(),
            "competency_fanout",
            entry.duration_ms,
            fatal.is_none(),
        );

        run.apply(PhasePatch::Scored {
            results: scored.results,
            failures: scored.failures,
        })?;
        run.apply(PhasePatch::Log(entry))?;
        self.store_artifact(run.run_id(), "scores", serde_json::to_value(run.results()));
        match fatal {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Fan out one scoring task per configured competency and wait for all
    /// of them. Each task owns its competency's slot and catches its own
    /// panic, so a crash is attributed to the competency that caused it.
    async fn score_all(&self, run_id: &str, transcript: &Transcript, job: &JobContext) -> Scored {
        let competencies: Vec<Competency> = self.config.weights.competencies().collect();
        let mut slots: BTreeMap<Competency, Option<ScoringSlot>> =
            competencies.iter().map(|c| (*c, None)).collect();

        let transcript = Arc::new(transcript.clone());
        let job = Arc::new(job.clone());
        let mut tasks = JoinSet::new();
        for competency in competencies.iter().copied() {
            let invoker = self.invoker.clone();
            let transcript = Arc::clone(&transcript);
            let job = Arc::clone(&job);
            let competency_config = self.config.competency_config(competency);
            tasks.spawn(
                async move {
                    let scoring =
                        invoker.score_competency(competency, &transcript, &job, &competency_config);
                    let result = AssertUnwindSafe(scoring)
                        .catch_unwind()
                        .await
                        .map_err(|payload| panic_message(payload.as_ref()));
                    (competency, result)
                }
                .in_current_span(),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((competency, result)) => {
                    if let Some(slot) = slots.get_mut(&competency) {
                        *slot = Some(result);
                    }
                }
                Err(e) => warn!(run_id = %run_id, error = %e, "scoring task did not finish"),
            }
        }

        let mut results = BTreeMap::new();
        let mut failures = Vec::new();
        for (competency, slot) in slots {
            match slot {
                Some(Ok(Ok(result))) => {
                    results.insert(competency, result);
                }
                Some(Ok(Err(e))) => {
                    obs::emit_agent_failed(run_id, e.target(), e.class().as_str(), &e);
                    failures.push(FailureRecord::from_agent(RunStatus::Evaluating, &e));
                }
                Some(Err(panic)) => {
                    failures.push(scoring_panic(run_id, competency, panic));
                }
                None => {
                    let detail = "scoring task did not finish".to_string();
                    failures.push(scoring_panic(run_id, competency, detail));
                }
            }
        }
        Scored {
            results,
            failures,
            attempted: competencies.len(),
        }
    }

    // ---- DETECTING_ISSUES ---------------------------------------------------

    fn detect(&self, run: &mut EvaluationRun) -> PipelineResult<DetectionReport> {
        run.apply(PhasePatch::Transition(RunStatus::DetectingIssues))?;
        let started = Instant::now();
        let report = detection::detect(&run.result_list(), &self.config.detection);

        let entry = ExecutionLogEntry::new(
            RunStatus::DetectingIssues,
            "issue_detection",
            elapsed_ms(started),
        )
        .with_count("conflicts", report.conflicts.len() as u64)
        .with_count("issues", report.issues.len() as u64)
        .with_count(
            "requires_collaboration",
            u64::from(report.requires_collaboration),
        );
        obs::emit_phase_finished(
            run.run_id(),
            RunStatus::DetectingIssues.as_str(),
            "issue_detection",
            entry.duration_ms,
            true,
        );
        run.apply(PhasePatch::Detected(report.clone()))?;
        run.apply(PhasePatch::Log(entry))?;
        self.store_artifact(run.run_id(), "detection", serde_json::to_value(&report));
        Ok(report)
    }

    // ---- COLLABORATING ------------------------------------------------------

    async fn collaborate(
        &self,
        run: &mut EvaluationRun,
        detection: &DetectionReport,
        transcript: &Transcript,
    ) -> PipelineResult<()> {
        run.apply(PhasePatch::Transition(RunStatus::Collaborating))?;
        let started = Instant::now();
        let coordinator =
            CollaborationCoordinator::new(self.invoker.clone(), self.config.collaboration.clone());
        let results = run.result_list();
        let report = coordinator
            .run(run.run_id(), detection, &results, transcript)
            .await;

        let mut entry =
            ExecutionLogEntry::new(RunStatus::Collaborating, "remediation", elapsed_ms(started))
                .with_count("mediations", report.mediations.len() as u64)
                .with_count("validations", report.validations.len() as u64)
                .with_count("collaboration_count", report.collaboration_count as u64)
                .with_count("failed_calls", report.call_failures.len() as u64)
                .with_count("failed_procedures", report.errors.len() as u64);
        if !report.errors.is_empty() {
            let joined: Vec<String> = report.errors.iter().map(|e| e.to_string()).collect();
            entry = entry.with_error(joined.join("; "));
        }
        obs::emit_phase_finished(
            run.run_id(),
            RunStatus::Collaborating.as_str(),
            "remediation",
            entry.duration_ms,
            report.errors.is_empty(),
        );

        let failures = report
            .call_failures
            .iter()
            .map(|e| FailureRecord::from_agent(RunStatus::Collaborating, e))
            .chain(report.errors.iter().map(FailureRecord::from_collaboration))
            .collect();
        self.store_artifact(run.run_id(), "collaboration", serde_json::to_value(&report));
        run.apply(PhasePatch::Collaborated { report, failures })?;
        run.apply(PhasePatch::Log(entry))
    }

    // ---- AGGREGATING --------------------------------------------------------

    async fn aggregate(
        &self,
        run: &mut EvaluationRun,
        detection: &DetectionReport,
    ) -> PipelineResult<()> {
        run.apply(PhasePatch::Transition(RunStatus::Aggregating))?;
        let started = Instant::now();
        let results = run.result_list();
        let (mediations, validations) = run
            .collaboration()
            .map(|c| (c.mediations.clone(), c.validations.clone()))
            .unwrap_or_default();

        let aggregator =
            Aggregator::new(self.config.weights.clone(), self.config.aggregation.clone());
        let verdict = match aggregator.aggregate(AggregationInput {
            results: &results,
            conflicts: &detection.conflicts,
            mediations: &mediations,
            validations: &validations,
        }) {
            Ok(verdict) => verdict,
            Err(e) => {
                let err = PipelineError::Aggregation(e);
                let entry = ExecutionLogEntry::new(
                    RunStatus::Aggregating,
                    "aggregation",
                    elapsed_ms(started),
                )
                .with_count("results", results.len() as u64)
                .with_error(err.to_string());
                obs::emit_phase_finished(
                    run.run_id(),
                    RunStatus::Aggregating.as_str(),
                    "aggregation",
                    entry.duration_ms,
                    false,
                );
                run.apply(PhasePatch::Log(entry))?;
                return Err(err);
            }
        };

        let normalized = self
            .normalize(run.job().job_id.as_str(), verdict.weighted_score)
            .await;
        let normalized_count = normalized
            .as_ref()
            .and_then(NormalizedScore::normalized)
            .is_some();
        let entry =
            ExecutionLogEntry::new(RunStatus::Aggregating, "aggregation", elapsed_ms(started))
                .with_count("results", results.len() as u64)
                .with_count("flags", verdict.flags.len() as u64)
                .with_count("normalized", u64::from(normalized_count));
        obs::emit_phase_finished(
            run.run_id(),
            RunStatus::Aggregating.as_str(),
            "aggregation",
            entry.duration_ms,
            true,
        );
        self.store_artifact(run.run_id(), "verdict", serde_json::to_value(&verdict));
        run.apply(PhasePatch::Aggregated {
            verdict,
            normalized,
        })?;
        run.apply(PhasePatch::Log(entry))
    }

    /// Normalize against the job baseline, then record the raw score.
    /// Baseline store problems never fail the run.
    async fn normalize(&self, job_id: &str, raw: f64) -> Option<NormalizedScore> {
        let normalizer = self.normalizer.as_ref()?;
        if !normalizer.config().enabled {
            return None;
        }
        let normalized = match normalizer.normalize(job_id, raw).await {
            Ok(n) => Some(n),
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "normalization skipped");
                None
            }
        };
        if normalizer.config().record_observations {
            if let Err(e) = normalizer.record(job_id, raw).await {
                warn!(job_id = %job_id, error = %e, "failed to record baseline observation");
            }
        }
        normalized
    }

    // ---- artifacts ----------------------------------------------------------

    /// Hand `value` to the artifact store without waiting for the write.
    /// Failures are logged and never affect the run. The write is a detached
    /// task: it completes even if the controller is dropped first.
    fn store_artifact(
        &self,
        run_id: &str,
        name: &str,
        value: serde_json::Result<serde_json::Value>,
    ) {
        let Some(store) = self.artifacts.clone() else {
            return;
        };
        let key = match ArtifactKey::new(run_id, name) {
            Ok(key) => key,
            Err(e) => {
                obs::emit_artifact_write_error(run_id, name, &e);
                return;
            }
        };
        let value = match value {
            Ok(value) => value,
            Err(e) => {
                obs::emit_artifact_write_error(run_id, name, &e);
                return;
            }
        };
        let handle = tokio::spawn(
            async move {
                if let Err(e) = store.put(&key, &value).await {
                    obs::emit_artifact_write_error(key.run_id(), key.name(), &e);
                }
            }
            .in_current_span(),
        );
        match self.pending_writes.lock() {
            Ok(mut pending) => {
                pending.retain(|h| !h.is_finished());
                pending.push(handle);
            }
            Err(_) => warn!(run_id = %run_id, "artifact queue poisoned; {name} left untracked"),
        }
    }

    /// Artifact writes that have not finished yet.
    pub fn pending_artifact_writes(&self) -> usize {
        match self.pending_writes.lock() {
            Ok(mut pending) => {
                pending.retain(|h| !h.is_finished());
                pending.len()
            }
            Err(_) => 0,
        }
    }

    /// Wait for every queued artifact write to finish.
    pub async fn flush_artifacts(&self) {
        let pending = match self.pending_writes.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => return,
        };
        for handle in pending {
            if let Err(e) = handle.await {
                warn!(error = %e, "artifact write task failed");
            }
        }
    }
}

fn scoring_panic(run_id: &str, competency: Competency, detail: String) -> FailureRecord {
    let target = format!("{}:{}", AgentRole::Scorer, competency);
    obs::emit_agent_failed(run_id, &target, "panic", &detail);
    FailureRecord {
        phase: RunStatus::Evaluating,
        target,
        class: "panic".to_string(),
        detail,
    }
}
