//! Verdict Core Library
//!
//! Multi-phase interview evaluation: fan scoring work out to independent
//! agents, detect disagreement and low confidence with cheap rules, remediate
//! only the problematic parts, and aggregate everything into one weighted,
//! traceable verdict.

pub mod aggregation;
pub mod collaboration;
pub mod config;
pub mod detection;
pub mod domain;
pub mod fakes;
pub mod invoker;
pub mod metrics;
pub mod obs;
pub mod pipeline;
pub mod telemetry;

pub use aggregation::{
    AggregationError, Aggregator, ConsistencyFlag, FinalVerdict, NormalizedScore, Normalizer,
    Recommendation, Synthesis,
};
pub use collaboration::{
    CollaborationCoordinator, CollaborationError, CollaborationReport, OutcomeState, Procedure,
    TaskOutcome,
};
pub use config::{ConfigError, EvaluationConfig};
pub use detection::{detect, DetectionReport};
pub use domain::{
    AdversarialResult, Competency, CompetencyResult, CompetencyWeights, ConfidenceIssue,
    EvidenceConflict, JobContext, MediationResult, Segment, SegmentId, Transcript,
};
pub use invoker::http::{HttpAgentClient, HttpAgentConfig};
pub use invoker::{AgentCall, AgentClient, AgentError, AgentInvoker, AgentRole};
pub use pipeline::{
    EvaluationOutcome, EvaluationRequest, EvaluationRun, ExecutionLogEntry, FailureRecord,
    PhaseController, PipelineError, RunStatus,
};
