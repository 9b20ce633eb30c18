//! End-to-end evaluation runs against scripted agents.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use verdict_core::fakes::{ScriptedAgentClient, ScriptedReply};
use verdict_core::pipeline::ExecutionLogEntry;
use verdict_core::{
    AgentCall, AgentClient, AgentError, AgentRole, Competency, ConsistencyFlag, EvaluationConfig,
    EvaluationRequest, JobContext, NormalizedScore, PhaseController, RunStatus, Transcript,
};
use verdict_store::fakes::{MemoryArtifactStore, MemoryBaselineStore};
use verdict_store::{ArtifactKey, ArtifactStore, BaselineStore};

const CONFIG: &str = r#"
[weights]
problem_solving = 0.5
communication = 0.3
collaboration = 0.2
"#;

fn config() -> EvaluationConfig {
    EvaluationConfig::from_toml_str(CONFIG).unwrap()
}

fn transcript() -> Transcript {
    serde_json::from_value(json!({
        "segments": [
            {"id": "S1", "question": "Design a rate limiter", "answer": "token bucket...",
             "competencies": ["problem_solving", "communication"]},
            {"id": "S2", "question": "Explain it to a PM", "answer": "think of tickets...",
             "competencies": ["communication"]},
            {"id": "S3", "question": "A teammate disagrees", "answer": "pair on it...",
             "competencies": ["collaboration"]}
        ]
    }))
    .unwrap()
}

fn request() -> EvaluationRequest {
    EvaluationRequest::new("cand-7", JobContext::new("job-1"), transcript()).with_run_id("run-e2e")
}

fn score(score: f64, confidence: f64, evidence: serde_json::Value) -> ScriptedReply {
    ScriptedReply::Respond(json!({
        "score": score,
        "reasoning": "scripted",
        "strengths": [format!("strength at {score}")],
        "weaknesses": [format!("weakness at {score}")],
        "confidence": confidence,
        "evidence": evidence,
    }))
}

/// Three scorers that agree with each other and are confident.
fn clean_client() -> ScriptedAgentClient {
    ScriptedAgentClient::new()
        .with_reply(
            AgentRole::Scorer,
            "problem_solving",
            score(80.0, 0.9, json!([{"segment_id": "S1", "quality": 0.8}])),
        )
        .with_reply(
            AgentRole::Scorer,
            "communication",
            score(
                70.0,
                0.8,
                json!([{"segment_id": "S1", "quality": 0.7}, {"segment_id": "S2", "quality": 0.9}]),
            ),
        )
        .with_reply(
            AgentRole::Scorer,
            "collaboration",
            score(90.0, 0.6, json!([{"segment_id": "S3", "quality": 0.9}])),
        )
}

/// Scorers that disagree on S1 and a communication scorer that is unsure.
fn contested_client() -> ScriptedAgentClient {
    ScriptedAgentClient::new()
        .with_reply(
            AgentRole::Scorer,
            "problem_solving",
            score(80.0, 0.9, json!([{"segment_id": "S1", "quality": 0.90}])),
        )
        .with_reply(
            AgentRole::Scorer,
            "communication",
            score(70.0, 0.5, json!([{"segment_id": "S1", "quality": 0.50}])),
        )
        .with_reply(
            AgentRole::Scorer,
            "collaboration",
            score(90.0, 0.9, json!([{"segment_id": "S1", "quality": 0.95}])),
        )
        .with_reply(
            AgentRole::Mediator,
            "S1",
            ScriptedReply::Respond(json!({
                "primary_competency": "problem_solving",
                "justification": "the answer is an algorithm walkthrough",
                "confidence": 0.8
            })),
        )
        .with_reply(
            AgentRole::Validator,
            "communication",
            ScriptedReply::Respond(json!({
                "adjusted_score": 60,
                "adjusted_confidence": 0.75,
                "rationale": "explanations skipped key steps"
            })),
        )
}

fn phases(log: &[ExecutionLogEntry]) -> Vec<RunStatus> {
    log.iter().map(|e| e.phase).collect()
}

struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Answers like `inner`, except mediator calls park for a minute first.
struct StalledMediator {
    inner: ScriptedAgentClient,
    dropped: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

#[async_trait]
impl AgentClient for StalledMediator {
    async fn call(&self, call: AgentCall) -> Result<serde_json::Value, AgentError> {
        if call.role != AgentRole::Mediator {
            return self.inner.call(call).await;
        }
        let _guard = SetOnDrop(Arc::clone(&self.dropped));
        tokio::time::sleep(Duration::from_secs(60)).await;
        self.finished.store(true, Ordering::SeqCst);
        self.inner.call(call).await
    }
}

#[tokio::test]
async fn test_clean_run_skips_collaboration_entirely() {
    let client = Arc::new(clean_client());
    let controller = PhaseController::new(client.clone(), config()).unwrap();

    let outcome = controller.execute(request()).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    let detection = outcome.detection.as_ref().unwrap();
    assert!(!detection.requires_collaboration);
    assert_eq!(
        phases(&outcome.execution_log),
        vec![
            RunStatus::Evaluating,
            RunStatus::DetectingIssues,
            RunStatus::Aggregating
        ]
    );
    assert!(!outcome
        .execution_log
        .iter()
        .any(|e| e.phase == RunStatus::Collaborating));
    assert_eq!(client.call_count(AgentRole::Mediator), 0);
    assert_eq!(client.call_count(AgentRole::Validator), 0);

    let verdict = outcome.verdict.unwrap();
    assert!((verdict.weighted_score - 79.0).abs() < 1e-6);
    assert_eq!(verdict.recommendation.as_str(), "hire");
    assert!(outcome.failures.is_empty());
}

#[tokio::test]
async fn test_contested_run_remediates_and_applies_adjustment() {
    let client = Arc::new(contested_client());
    let controller = PhaseController::new(client.clone(), config()).unwrap();

    let outcome = controller.execute(request()).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    let detection = outcome.detection.as_ref().unwrap();
    assert_eq!(detection.conflicts.len(), 1);
    assert!((detection.conflicts[0].gap - 0.45).abs() < 1e-9);
    assert_eq!(detection.issues.len(), 1);
    assert_eq!(
        phases(&outcome.execution_log),
        vec![
            RunStatus::Evaluating,
            RunStatus::DetectingIssues,
            RunStatus::Collaborating,
            RunStatus::Aggregating
        ]
    );

    assert_eq!(outcome.mediations.len(), 1);
    assert_eq!(
        outcome.mediations[0].primary_competency,
        Competency::ProblemSolving
    );
    assert_eq!(outcome.validations.len(), 1);

    let collab_entry = &outcome.execution_log[2];
    assert_eq!(collab_entry.count("collaboration_count"), Some(2));
    assert!(collab_entry.error.is_none());

    // 80*0.5 + 60*0.3 + 90*0.2
    let verdict = outcome.verdict.unwrap();
    assert!((verdict.weighted_score - 76.0).abs() < 1e-6);
    let communication = &verdict.competency_scores[&Competency::Communication];
    assert!(communication.adjusted);
    assert!(!verdict
        .flags
        .iter()
        .any(|f| matches!(f, ConsistencyFlag::UnresolvedConflicts { .. })));
}

#[tokio::test]
async fn test_failed_scorer_is_absent_and_weights_renormalize() {
    let client = clean_client().with_reply(
        AgentRole::Scorer,
        "communication",
        ScriptedReply::Fail(AgentError::invocation("scorer:communication", "503")),
    );
    let controller = PhaseController::new(Arc::new(client), config()).unwrap();

    let outcome = controller.execute(request()).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].target, "scorer:communication");
    assert_eq!(outcome.failures[0].class, "invocation");
    assert_eq!(outcome.execution_log[0].count("failed"), Some(1));

    let verdict = outcome.verdict.unwrap();
    let communication = verdict.competency_scores.get(&Competency::Communication);
    assert!(communication.is_none());
    let expected = (80.0 * 0.5 + 90.0 * 0.2) / 0.7;
    assert!((verdict.weighted_score - expected).abs() < 1e-6);
    let total: f64 = verdict.weights_used.values().sum();
    assert!((total - 1.0).abs() < 1e-9);
    assert!(verdict.flags.contains(&ConsistencyFlag::MissingCompetencies {
        missing: vec![Competency::Communication]
    }));
}

#[tokio::test]
async fn test_unparseable_scorer_reply_is_a_parsing_failure() {
    let client = clean_client().with_reply(
        AgentRole::Scorer,
        "collaboration",
        ScriptedReply::Respond(json!("```json\n{\"score\": 140, \"confidence\": 0.9}\n```")),
    );
    let controller = PhaseController::new(Arc::new(client), config()).unwrap();

    let outcome = controller.execute(request()).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].class, "parsing");
}

#[tokio::test]
async fn test_all_scorers_failing_fails_the_run_with_a_log() {
    let controller = PhaseController::new(Arc::new(ScriptedAgentClient::new()), config()).unwrap();

    let outcome = controller.execute(request()).await;

    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(outcome.verdict.is_none());
    assert_eq!(outcome.failures.len(), 3);
    assert_eq!(outcome.execution_log.len(), 1);
    assert_eq!(outcome.execution_log[0].phase, RunStatus::Evaluating);
    assert!(outcome.execution_log[0].error.is_some());
    let error = outcome.error.unwrap();
    assert!(error.contains("no usable competency results"));
}

#[tokio::test]
async fn test_panicking_mediator_does_not_disturb_validator() {
    let client = contested_client().with_reply(
        AgentRole::Mediator,
        "S1",
        ScriptedReply::Panic("mediator transport crashed".to_string()),
    );
    let controller = PhaseController::new(Arc::new(client), config()).unwrap();

    let outcome = controller.execute(request()).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert!(outcome.mediations.is_empty());
    assert_eq!(outcome.validations.len(), 1);
    assert_eq!(outcome.validations[0].adjusted_score, 60.0);
    assert!(outcome
        .failures
        .iter()
        .any(|f| f.class == "collaboration" && f.target == "evidence_mediation"));

    let collab_entry = outcome
        .execution_log
        .iter()
        .find(|e| e.phase == RunStatus::Collaborating)
        .unwrap();
    assert!(collab_entry.error.as_ref().unwrap().contains("panicked"));

    let verdict = outcome.verdict.unwrap();
    assert!(verdict.flags.contains(&ConsistencyFlag::UnresolvedConflicts {
        detected: 1,
        mediated: 0
    }));
}

#[tokio::test]
async fn test_panicking_scorer_records_panic_message() {
    let client = clean_client().with_reply(
        AgentRole::Scorer,
        "collaboration",
        ScriptedReply::Panic("scorer transport crashed".to_string()),
    );
    let controller = PhaseController::new(Arc::new(client), config()).unwrap();

    let outcome = controller.execute(request()).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.failures.len(), 1);
    let failure = &outcome.failures[0];
    assert_eq!(failure.phase, RunStatus::Evaluating);
    assert_eq!(failure.class, "panic");
    assert_eq!(failure.target, "scorer:collaboration");
    assert!(failure.detail.contains("scorer transport crashed"));
    assert_eq!(outcome.execution_log[0].count("failed"), Some(1));
}

#[tokio::test]
async fn test_failing_validator_does_not_disturb_mediator() {
    let client = contested_client().with_reply(
        AgentRole::Validator,
        "communication",
        ScriptedReply::Fail(AgentError::invocation("validator:communication", "504")),
    );
    let controller = PhaseController::new(Arc::new(client), config()).unwrap();

    let outcome = controller.execute(request()).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.mediations.len(), 1);
    assert!(outcome.validations.is_empty());
    // Unadjusted: 80*0.5 + 70*0.3 + 90*0.2
    let verdict = outcome.verdict.unwrap();
    assert!((verdict.weighted_score - 79.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_disabled_collaboration_still_detects() {
    let mut config = config();
    config.collaboration.enabled = false;
    let client = Arc::new(contested_client());
    let controller = PhaseController::new(client.clone(), config).unwrap();

    let outcome = controller.execute(request()).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert!(outcome.detection.unwrap().requires_collaboration);
    assert!(!outcome
        .execution_log
        .iter()
        .any(|e| e.phase == RunStatus::Collaborating));
    assert_eq!(client.call_count(AgentRole::Mediator), 0);
}

#[tokio::test]
async fn test_coverage_floor_turns_missing_results_into_failure() {
    let mut config = config();
    config.aggregation.min_coverage = 1.0;
    let client = clean_client().with_reply(
        AgentRole::Scorer,
        "communication",
        ScriptedReply::Fail(AgentError::invocation("scorer:communication", "down")),
    );
    let controller = PhaseController::new(Arc::new(client), config).unwrap();

    let outcome = controller.execute(request()).await;

    assert_eq!(outcome.status, RunStatus::Failed);
    let last = outcome.execution_log.last().unwrap();
    assert_eq!(last.phase, RunStatus::Aggregating);
    assert!(last.error.as_ref().unwrap().contains("coverage"));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_marks_run_failed_and_keeps_log() {
    let client = clean_client().with_reply(
        AgentRole::Scorer,
        "collaboration",
        ScriptedReply::Delayed(
            Duration::from_secs(30),
            Box::new(score(90.0, 0.9, json!([]))),
        ),
    );
    let controller = PhaseController::new(Arc::new(client), config()).unwrap();

    let outcome = controller
        .execute_with_cancel(request(), tokio::time::sleep(Duration::from_secs(1)))
        .await;

    assert_eq!(outcome.status, RunStatus::Failed);
    let last = outcome.execution_log.last().unwrap();
    assert_eq!(last.node, "cancelled");
    assert_eq!(last.phase, RunStatus::Evaluating);
    assert!(outcome.error.unwrap().contains("cancelled"));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_during_remediation_aborts_agents() {
    let dropped = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));
    let client = StalledMediator {
        inner: contested_client(),
        dropped: Arc::clone(&dropped),
        finished: Arc::clone(&finished),
    };
    let controller = PhaseController::new(Arc::new(client), config()).unwrap();

    let outcome = controller
        .execute_with_cancel(request(), tokio::time::sleep(Duration::from_secs(5)))
        .await;
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }

    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(outcome
        .execution_log
        .iter()
        .any(|e| e.phase == RunStatus::DetectingIssues));
    let last = outcome.execution_log.last().unwrap();
    assert_eq!(last.node, "cancelled");
    assert_eq!(last.phase, RunStatus::Collaborating);
    assert!(dropped.load(Ordering::SeqCst));
    assert!(!finished.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_slow_scorer_times_out_and_run_continues() {
    let mut config = config();
    config.agent.call_timeout_ms = Some(500);
    let client = clean_client().with_reply(
        AgentRole::Scorer,
        "collaboration",
        ScriptedReply::Delayed(
            Duration::from_secs(30),
            Box::new(score(90.0, 0.9, json!([]))),
        ),
    );
    let controller = PhaseController::new(Arc::new(client), config).unwrap();

    let outcome = controller.execute(request()).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.failures[0].detail.contains("timed out"));
}

#[tokio::test]
async fn test_artifacts_are_stored_for_audit() {
    let store = Arc::new(MemoryArtifactStore::new());
    let controller = PhaseController::new(Arc::new(clean_client()), config())
        .unwrap()
        .with_artifact_store(store.clone());

    let outcome = controller.execute(request()).await;
    controller.flush_artifacts().await;

    let names: Vec<String> = store
        .list("run-e2e")
        .await
        .unwrap()
        .iter()
        .map(|k| k.name().to_string())
        .collect();
    assert_eq!(
        names,
        vec!["detection", "execution_log", "outcome", "scores", "verdict"]
    );

    let stored = store
        .get(&ArtifactKey::new("run-e2e", "execution_log").unwrap())
        .await
        .unwrap();
    let log: Vec<ExecutionLogEntry> = serde_json::from_value(stored.blob).unwrap();
    assert_eq!(log, outcome.execution_log);
}

#[tokio::test]
async fn test_reused_controller_does_not_accumulate_artifact_writes() {
    let store = Arc::new(MemoryArtifactStore::new());
    let controller = PhaseController::new(Arc::new(clean_client()), config())
        .unwrap()
        .with_artifact_store(store.clone());

    for i in 0..50 {
        controller
            .execute(request().with_run_id(format!("run-{i}")))
            .await;
        tokio::task::yield_now().await;
    }

    assert!(controller.pending_artifact_writes() <= 5);
    controller.flush_artifacts().await;
    assert_eq!(controller.pending_artifact_writes(), 0);
    assert_eq!(store.len(), 50 * 5);
}

#[tokio::test]
async fn test_artifact_writes_finish_after_controller_is_dropped() {
    let store = Arc::new(MemoryArtifactStore::new());
    let controller = PhaseController::new(Arc::new(clean_client()), config())
        .unwrap()
        .with_artifact_store(store.clone());

    controller.execute(request()).await;
    assert!(controller.pending_artifact_writes() > 0);
    drop(controller);
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }

    assert_eq!(store.len(), 5);
    let keys = store.list("run-e2e").await.unwrap();
    assert!(keys.iter().any(|k| k.name() == "outcome"));
}

#[tokio::test]
async fn test_normalization_uses_and_updates_job_baseline() {
    let baselines = Arc::new(MemoryBaselineStore::with_observations(
        "job-1",
        &[60.0, 80.0, 60.0, 80.0, 70.0],
    ));
    let mut config = config();
    config.normalization.enabled = true;
    let controller = PhaseController::new(Arc::new(clean_client()), config)
        .unwrap()
        .with_baseline_store(baselines.clone());

    let outcome = controller.execute(request()).await;

    match outcome.normalized.unwrap() {
        NormalizedScore::Normalized {
            raw,
            population,
            normalized,
            ..
        } => {
            assert!((raw - 79.0).abs() < 1e-6);
            assert_eq!(population, 5);
            assert!(normalized > 50.0);
        }
        other => panic!("expected a normalized score, got {other:?}"),
    }
    assert_eq!(baselines.get("job-1").await.unwrap().unwrap().count, 6);
}

#[tokio::test]
async fn test_small_population_reports_insufficient() {
    let baselines = Arc::new(MemoryBaselineStore::new());
    let mut config = config();
    config.normalization.enabled = true;
    let controller = PhaseController::new(Arc::new(clean_client()), config)
        .unwrap()
        .with_baseline_store(baselines);

    let outcome = controller.execute(request()).await;

    assert_eq!(
        outcome.normalized,
        Some(NormalizedScore::InsufficientPopulation {
            population: 0,
            required: 5
        })
    );
}

#[test]
fn test_invalid_config_is_rejected_up_front() {
    let mut config = config();
    config.detection.conflict_threshold = 2.0;
    let err = PhaseController::new(Arc::new(ScriptedAgentClient::new()), config).unwrap_err();
    assert!(err.to_string().contains("conflict_threshold"));
}
