//! Automaton Auditor CLI
//!
//! The `auditor` command drives the evaluation pipeline from the shell.
//!
//! ## Commands
//!
//! - `validate`: Check a rubric file and print its dimensions
//! - `run`: Run the pipeline over recorded evidence and opinions and emit the report

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};

use auditor_core::{
    standard_graph, write_report_json, ExecutorConfig, Pipeline, RecordedCollector,
    RecordedProducer, Rubric, RunInputs,
};

#[derive(Parser)]
#[command(name = "auditor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Automaton Auditor: parallel evidence collection and arbitrated scoring", long_about = None)]
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
    /// Validate a rubric file without running anything
    Validate {
        /// Path to the rubric (JSON)
        #[arg(short, long)]
        rubric: PathBuf,
    },

    /// Run the pipeline over recorded evidence and opinions
    Run {
        /// Path to the rubric (JSON)
        #[arg(short, long)]
        rubric: PathBuf,

        /// Recorded evidence (JSON array)
        #[arg(short, long)]
        evidence: PathBuf,

        /// Recorded opinions (JSON array)
        #[arg(long)]
        opinions: PathBuf,

        /// Named run targets, e.g. `repo=https://github.com/org/repo`
        #[arg(short, long = "target", value_parser = parse_target)]
        targets: Vec<(String, String)>,

        /// Write the report artifact here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Attempts per stage before a failure is recorded
        #[arg(long, env = "AUDITOR_MAX_ATTEMPTS")]
        max_attempts: Option<u32>,

        /// Per-attempt timeout in seconds
        #[arg(long, env = "AUDITOR_STAGE_TIMEOUT_SECS")]
        stage_timeout_secs: Option<u64>,

        /// Maximum concurrently running stages per group
        #[arg(long, env = "AUDITOR_MAX_CONCURRENT")]
        max_concurrent: Option<usize>,
    },
}

fn parse_target(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{raw}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    auditor_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Validate { rubric } => cmd_validate(&rubric),
        Commands::Run {
            rubric,
            evidence,
            opinions,
            targets,
            output,
            max_attempts,
            stage_timeout_secs,
            max_concurrent,
        } => {
            let config = executor_config(max_attempts, stage_timeout_secs, max_concurrent);
            cmd_run(
                &rubric,
                &evidence,
                &opinions,
                targets,
                output.as_deref(),
                config,
            )
            .await
        }
    }
}

fn executor_config(
    max_attempts: Option<u32>,
    stage_timeout_secs: Option<u64>,
    max_concurrent: Option<usize>,
) -> ExecutorConfig {
    let defaults = ExecutorConfig::default();
    ExecutorConfig {
        max_attempts: max_attempts.unwrap_or(defaults.max_attempts),
        stage_timeout: stage_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.stage_timeout),
        max_concurrent: max_concurrent.unwrap_or(defaults.max_concurrent),
        ..defaults
    }
}

fn cmd_validate(path: &Path) -> Result<()> {
    let rubric = Rubric::load(path).with_context(|| format!("Failed to load rubric {:?}", path))?;
    let arbitration = rubric.arbitration_config()?;

    println!("Rubric '{}' v{} is valid", rubric.name, rubric.version);
    println!("Dimensions ({}):", rubric.dimensions.len());
    for d in &rubric.dimensions {
        let artifact = if d.target_artifact.is_empty() {
            "-"
        } else {
            d.target_artifact.as_str()
        };
        println!("  {:<28} {:<14} {}", d.id, artifact, d.name);
    }
    println!(
        "Arbitration: variance>{} security_cap={} min_opinions={} tie_break={}",
        arbitration.variance_threshold,
        arbitration.security_cap,
        arbitration.min_opinions,
        arbitration.tie_break_role
    );
    Ok(())
}

#[derive(Serialize)]
struct RunSummary<'a> {
    run_id: String,
    overall_score: f64,
    needs_remediation: &'a [String],
    errors: usize,
    report: Option<&'a Path>,
}

async fn cmd_run(
    rubric_path: &Path,
    evidence_path: &Path,
    opinions_path: &Path,
    targets: Vec<(String, String)>,
    output: Option<&Path>,
    config: ExecutorConfig,
) -> Result<()> {
    let rubric = Rubric::load(rubric_path)
        .with_context(|| format!("Failed to load rubric {:?}", rubric_path))?;
    let collector = RecordedCollector::load(evidence_path)
        .with_context(|| format!("Failed to load evidence {:?}", evidence_path))?;
    let producer = RecordedProducer::load(opinions_path)
        .with_context(|| format!("Failed to load opinions {:?}", opinions_path))?;

    let graph = standard_graph(&rubric, Arc::new(collector), Arc::new(producer))?;
    let inputs = targets
        .into_iter()
        .fold(RunInputs::new(), |inputs, (name, value)| inputs.with_target(name, value));

    info!(run_id = %inputs.run_id, stages = graph.stage_count(), "starting audit");
    let pipeline = Pipeline::new(rubric, config);
    let run = pipeline
        .execute(inputs, &graph)
        .await
        .context("Audit run failed")?;
    let artifact = pipeline.artifact(&run)?;

    match output {
        Some(path) => {
            write_report_json(path, &artifact)?;
            let summary = RunSummary {
                run_id: run.run_id().to_string(),
                overall_score: run.report.overall_score,
                needs_remediation: &run.report.needs_remediation,
                errors: run.errors.len(),
                report: Some(path),
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        None => println!("{}", serde_json::to_string_pretty(&artifact)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUBRIC: &str = r#"{
        "name": "CLI Rubric",
        "version": "1.0",
        "dimensions": [
            {
                "id": "safe_tooling",
                "name": "Safe Tool Engineering",
                "target_artifact": "github_repo",
                "guidance": {
                    "prosecutor": "Raw shell calls are a security failure.",
                    "defense": "Credit sandboxing attempts.",
                    "tech_lead": "Check error handling around clones."
                }
            }
        ],
        "arbitration": {
            "variance_threshold": 2,
            "security_cap": 3,
            "min_opinions": 2,
            "evidence_grounded_role": "prosecutor",
            "intent_weighted_role": "defense",
            "tie_break_role": "tech_lead"
        }
    }"#;

    const EVIDENCE: &str = r#"[
        {
            "dimension_id": "safe_tooling",
            "location": "src/tools/repo.py",
            "rationale": "clone runs inside a temporary directory",
            "confidence": 0.9
        }
    ]"#;

    const OPINIONS: &str = r#"[
        {
            "evaluator": "prosecutor",
            "dimension_id": "safe_tooling",
            "score": 4,
            "argument": "Cloning happens in a temporary directory and no raw shell strings are built.",
            "cited_locations": ["src/tools/repo.py"]
        },
        {
            "evaluator": "defense",
            "dimension_id": "safe_tooling",
            "score": 5,
            "argument": "The sandboxing is deliberate and errors from git are surfaced to the caller."
        },
        {
            "evaluator": "tech_lead",
            "dimension_id": "safe_tooling",
            "score": 4,
            "argument": "Sound approach; add a timeout around the clone to keep the pipeline responsive."
        }
    ]"#;

    #[test]
    fn test_parse_target() {
        assert_eq!(
            parse_target("repo=https://example.com/r.git").unwrap(),
            ("repo".to_string(), "https://example.com/r.git".to_string())
        );
        assert!(parse_target("no-separator").is_err());
        assert!(parse_target("=value").is_err());
    }

    #[test]
    fn test_executor_config_falls_back_to_defaults() {
        let config = executor_config(Some(5), None, None);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.stage_timeout, ExecutorConfig::default().stage_timeout);
        assert_eq!(config.max_concurrent, ExecutorConfig::default().max_concurrent);
    }

    #[test]
    fn test_cmd_validate_accepts_rubric() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rubric.json");
        std::fs::write(&path, RUBRIC).unwrap();
        assert!(cmd_validate(&path).is_ok());
        assert!(cmd_validate(&dir.path().join("missing.json")).is_err());
    }

    #[tokio::test]
    async fn test_cmd_run_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let rubric = dir.path().join("rubric.json");
        let evidence = dir.path().join("evidence.json");
        let opinions = dir.path().join("opinions.json");
        let output = dir.path().join("audit_report.json");
        std::fs::write(&rubric, RUBRIC).unwrap();
        std::fs::write(&evidence, EVIDENCE).unwrap();
        std::fs::write(&opinions, OPINIONS).unwrap();

        let config = ExecutorConfig {
            retry_backoff: Duration::ZERO,
            ..ExecutorConfig::default()
        };
        cmd_run(
            &rubric,
            &evidence,
            &opinions,
            vec![("repo".to_string(), "https://example.com/r.git".to_string())],
            Some(&output),
            config,
        )
        .await
        .unwrap();

        let raw = std::fs::read_to_string(&output).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["rubric_name"], "CLI Rubric");
        assert_eq!(value["report"]["verdicts"][0]["final_score"], 4);
        assert_eq!(value["report"]["errors"].as_array().unwrap().len(), 0);
    }
}
