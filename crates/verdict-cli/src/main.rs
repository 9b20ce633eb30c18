//! Verdict - multi-phase interview evaluation CLI
//!
//! The `verdict` command runs one evaluation end to end and prints the
//! outcome as JSON on stdout. Logs go to stderr.
//!
//! ## Commands
//!
//! - `evaluate`: Score a transcript against a job and print the verdict
//! - `check-config`: Validate an evaluation config file
//! - `show-trace`: Print the execution log stored for a past run

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use verdict_core::fakes::ScriptedAgentClient;
use verdict_core::metrics::METRICS;
use verdict_core::{
    AgentClient, EvaluationConfig, EvaluationRequest, HttpAgentClient, HttpAgentConfig,
    JobContext, PhaseController, Transcript,
};
use verdict_store::{ArtifactKey, ArtifactStore, FsArtifactStore, FsBaselineStore};

const DEFAULT_ARTIFACTS_DIR: &str = ".verdict/runs";
const DEFAULT_BASELINES_DIR: &str = ".verdict/baselines";

#[derive(Parser)]
#[command(name = "verdict")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-phase interview evaluation orchestrator", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a candidate transcript and print the outcome as JSON
    Evaluate {
        /// Path to the transcript (JSON)
        #[arg(short, long)]
        transcript: PathBuf,

        /// Evaluation config (TOML); built-in defaults when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Base URL of the agent service
        #[arg(long, env = "VERDICT_AGENT_URL")]
        agent_url: Option<String>,

        /// Bearer token for the agent service
        #[arg(long, env = "VERDICT_AGENT_TOKEN", hide_env_values = true)]
        agent_token: Option<String>,

        /// Canned agent responses (JSON) for offline runs; overrides --agent-url
        #[arg(long)]
        responses: Option<PathBuf>,

        /// Job the candidate is evaluated against
        #[arg(long, default_value = "default")]
        job_id: String,

        /// Candidate identifier
        #[arg(long, default_value = "anonymous")]
        candidate_id: String,

        /// Explicit run ID (generated when omitted)
        #[arg(long)]
        run_id: Option<String>,

        /// Root directory for run artifacts (default: .verdict/runs)
        #[arg(long)]
        artifacts_dir: Option<PathBuf>,

        /// Do not persist run artifacts
        #[arg(long)]
        no_artifacts: bool,

        /// Directory holding per-job population baselines
        #[arg(long, default_value = DEFAULT_BASELINES_DIR)]
        baselines_dir: PathBuf,
    },

    /// Validate an evaluation config file
    CheckConfig {
        /// Path to the config (TOML)
        path: PathBuf,
    },

    /// Print the execution log recorded for a run
    ShowTrace {
        /// Run ID to show
        run_id: String,

        /// Root directory containing run artifacts (default: .verdict/runs)
        #[arg(long)]
        artifacts_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    verdict_core::telemetry::init_tracing(cli.json, level);

    let result = match cli.command {
        Commands::Evaluate {
            transcript,
            config,
            agent_url,
            agent_token,
            responses,
            job_id,
            candidate_id,
            run_id,
            artifacts_dir,
            no_artifacts,
            baselines_dir,
        } => {
            let agent = match responses {
                Some(path) => AgentSource::Scripted(path),
                None => AgentSource::Http {
                    url: agent_url,
                    token: agent_token,
                },
            };
            let artifacts = if no_artifacts {
                None
            } else {
                Some(artifacts_root(artifacts_dir.as_deref()))
            };
            cmd_evaluate(EvaluateArgs {
                transcript,
                config,
                agent,
                job_id,
                candidate_id,
                run_id,
                artifacts,
                baselines: baselines_dir,
            })
            .await
        }
        Commands::CheckConfig { path } => cmd_check_config(&path),
        Commands::ShowTrace {
            run_id,
            artifacts_dir,
        } => cmd_show_trace(&run_id, &artifacts_root(artifacts_dir.as_deref())).await,
    };

    METRICS.flush();
    result
}

fn artifacts_root(dir: Option<&Path>) -> PathBuf {
    dir.map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACTS_DIR))
}

enum AgentSource {
    Http {
        url: Option<String>,
        token: Option<String>,
    },
    Scripted(PathBuf),
}

impl AgentSource {
    fn into_client(self) -> Result<Arc<dyn AgentClient>> {
        match self {
            AgentSource::Http { url, token } => {
                let mut config = match url {
                    Some(url) => HttpAgentConfig::new(&url),
                    None => HttpAgentConfig::from_env(),
                };
                if let Some(token) = token {
                    config = config.with_token(&token);
                }
                info!(base_url = %config.base_url, "using HTTP agent service");
                let client =
                    HttpAgentClient::new(config).context("Failed to build HTTP agent client")?;
                Ok(Arc::new(client))
            }
            AgentSource::Scripted(path) => {
                let script = read_json(&path)?;
                let client = ScriptedAgentClient::from_script(script)
                    .with_context(|| format!("Invalid agent responses file: {:?}", path))?;
                info!(path = %path.display(), "using scripted agent responses");
                Ok(Arc::new(client))
            }
        }
    }
}

struct EvaluateArgs {
    transcript: PathBuf,
    config: Option<PathBuf>,
    agent: AgentSource,
    job_id: String,
    candidate_id: String,
    run_id: Option<String>,
    artifacts: Option<PathBuf>,
    baselines: PathBuf,
}

fn load_config(path: Option<&Path>) -> Result<EvaluationConfig> {
    match path {
        Some(path) => EvaluationConfig::load(path)
            .with_context(|| format!("Failed to load config: {:?}", path)),
        None => Ok(EvaluationConfig::default()),
    }
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let raw = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_slice(&raw).with_context(|| format!("{:?} is not valid JSON", path))
}

/// Run one evaluation and print the outcome.
async fn cmd_evaluate(args: EvaluateArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let transcript: Transcript = serde_json::from_value(read_json(&args.transcript)?)
        .with_context(|| format!("Invalid transcript: {:?}", args.transcript))?;
    let client = args.agent.into_client()?;

    let baselines = FsBaselineStore::new(&args.baselines)
        .with_context(|| format!("Failed to open baselines dir: {:?}", args.baselines))?;
    let mut controller = PhaseController::new(client, config)
        .context("Failed to build evaluation pipeline")?
        .with_baseline_store(Arc::new(baselines));
    if let Some(root) = &args.artifacts {
        let store = FsArtifactStore::new(root)
            .with_context(|| format!("Failed to open artifacts dir: {:?}", root))?;
        controller = controller.with_artifact_store(Arc::new(store));
    }

    let mut request =
        EvaluationRequest::new(args.candidate_id, JobContext::new(args.job_id), transcript);
    if let Some(run_id) = args.run_id {
        request = request.with_run_id(run_id);
    }

    let outcome = controller.execute(request).await;
    controller.flush_artifacts().await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if !outcome.is_completed() {
        anyhow::bail!(
            "Evaluation {} ended with status {}: {}",
            outcome.run_id,
            outcome.status,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
    if let Some(root) = &args.artifacts {
        info!(run_id = %outcome.run_id, dir = %root.display(), "artifacts written");
    }
    Ok(())
}

#[derive(Serialize)]
struct ConfigSummary<'a> {
    valid: bool,
    competencies: Vec<(&'static str, f64)>,
    conflict_threshold: f64,
    confidence_threshold: f64,
    collaboration_enabled: bool,
    min_coverage: f64,
    path: &'a Path,
}

/// Validate a config file and print what it resolves to.
fn cmd_check_config(path: &Path) -> Result<()> {
    let config = load_config(Some(path))?;
    let summary = ConfigSummary {
        valid: true,
        competencies: config
            .weights
            .iter()
            .map(|(c, w)| (c.as_str(), w))
            .collect(),
        conflict_threshold: config.detection.conflict_threshold,
        confidence_threshold: config.detection.confidence_threshold,
        collaboration_enabled: config.collaboration.enabled,
        min_coverage: config.aggregation.min_coverage,
        path,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Print the stored execution log for `run_id`.
async fn cmd_show_trace(run_id: &str, root: &Path) -> Result<()> {
    if !root.join(run_id).exists() {
        anyhow::bail!("No artifacts recorded for run {} under {:?}", run_id, root);
    }
    let store = FsArtifactStore::new(root)
        .with_context(|| format!("Failed to open artifacts dir: {:?}", root))?;
    let key = ArtifactKey::new(run_id, "execution_log").context("Invalid run ID")?;
    let artifact = store
        .get(&key)
        .await
        .with_context(|| format!("Failed to read execution log for run {}", run_id))?;

    println!("{}", serde_json::to_string_pretty(&artifact.blob)?);
    info!(run_id = %run_id, digest = %artifact.digest.short(), "execution log verified");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_show_trace_takes_positional_run_id() {
        let cli = Cli::try_parse_from(["verdict", "show-trace", "run-1", "--artifacts-dir", "x"])
            .unwrap();
        match cli.command {
            Commands::ShowTrace {
                run_id,
                artifacts_dir,
            } => {
                assert_eq!(run_id, "run-1");
                assert_eq!(artifacts_dir, Some(PathBuf::from("x")));
            }
            _ => panic!("expected show-trace"),
        }
    }

    #[test]
    fn test_check_config_reports_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[detection]\nconflict_threshold = 2.0\n").unwrap();
        assert!(cmd_check_config(&path).is_err());
    }

    #[tokio::test]
    async fn test_evaluate_offline_writes_trace() {
        let dir = tempfile::tempdir().unwrap();
        let transcript = dir.path().join("transcript.json");
        std::fs::write(
            &transcript,
            r#"{"segments": [{"id": "S1", "question": "q", "answer": "a", "competencies": ["communication"]}]}"#,
        )
        .unwrap();
        let config = dir.path().join("config.toml");
        std::fs::write(&config, "[weights]\ncommunication = 1.0\n").unwrap();
        let responses = dir.path().join("responses.json");
        std::fs::write(
            &responses,
            r#"{"scorer": {"communication": {"score": 80, "confidence": 0.9}}}"#,
        )
        .unwrap();
        let artifacts = dir.path().join("runs");

        cmd_evaluate(EvaluateArgs {
            transcript,
            config: Some(config),
            agent: AgentSource::Scripted(responses),
            job_id: "job-1".to_string(),
            candidate_id: "cand-1".to_string(),
            run_id: Some("run-cli".to_string()),
            artifacts: Some(artifacts.clone()),
            baselines: dir.path().join("baselines"),
        })
        .await
        .unwrap();

        cmd_show_trace("run-cli", &artifacts).await.unwrap();
        assert!(cmd_show_trace("run-missing", &artifacts).await.is_err());
    }

    #[tokio::test]
    async fn test_baselines_persist_across_invocations() {
        let dir = tempfile::tempdir().unwrap();
        let transcript = dir.path().join("transcript.json");
        std::fs::write(
            &transcript,
            r#"{"segments": [{"id": "S1", "question": "q", "answer": "a", "competencies": ["communication"]}]}"#,
        )
        .unwrap();
        let config = dir.path().join("config.toml");
        let config_body = "[weights]\ncommunication = 1.0\n\n\
                           [normalization]\nenabled = true\nmin_population = 1\n";
        std::fs::write(&config, config_body).unwrap();
        let baselines = dir.path().join("baselines");

        for (run_id, score) in [("run-a", 60), ("run-b", 80)] {
            let responses = dir.path().join(format!("{run_id}.json"));
            let body = format!(
                r#"{{"scorer": {{"communication": {{"score": {score}, "confidence": 0.9}}}}}}"#
            );
            std::fs::write(&responses, body).unwrap();
            cmd_evaluate(EvaluateArgs {
                transcript: transcript.clone(),
                config: Some(config.clone()),
                agent: AgentSource::Scripted(responses),
                job_id: "job-1".to_string(),
                candidate_id: "cand-1".to_string(),
                run_id: Some(run_id.to_string()),
                artifacts: None,
                baselines: baselines.clone(),
            })
            .await
            .unwrap();
        }

        let store = FsBaselineStore::new(&baselines).unwrap();
        let baseline = verdict_store::BaselineStore::get(&store, "job-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(baseline.count, 2);
        assert!((baseline.mean - 70.0).abs() < 1e-9);
    }
}
