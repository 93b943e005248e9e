//! End-to-end run: executor, arbitration and report assembly.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument};

use crate::arbitration::{arbitrate, ArbitrationConfig};
use crate::config::Rubric;
use crate::domain::{AuditError, EvaluatorRole, Opinion, Result, RunInputs};
use crate::executor::{ExecutionOutcome, ExecutorConfig, PipelineGraph, StageExecutor};
use crate::metrics::METRICS;
use crate::obs::{self, RunSpan};
use crate::report::{assemble_report, AuditReport, ReportArtifact};
use crate::router::Route;
use crate::stage::{CollectionStage, EvidenceCollector, OpinionProducer, ScoringStage};
use crate::state::{PipelineState, StageErrorRecord};

/// Build the usual graph for a rubric: one collection stage per target
/// artifact (plus `collect:default` for dimensions without one) sharing
/// `collector`, and one scoring stage per evaluator role sharing `producer`.
pub fn standard_graph(
    rubric: &Rubric,
    collector: Arc<dyn EvidenceCollector>,
    producer: Arc<dyn OpinionProducer>,
) -> Result<PipelineGraph> {
    let mut builder = PipelineGraph::builder();
    for artifact in rubric.target_artifacts() {
        builder = builder.collector(
            CollectionStage::new(format!("collect:{artifact}"), collector.clone())
                .for_artifact(artifact),
        );
    }
    if rubric.dimensions.iter().any(|d| d.target_artifact.is_empty()) {
        builder = builder
            .collector(CollectionStage::new("collect:default", collector.clone()).for_artifact(""));
    }
    for role in EvaluatorRole::ALL {
        builder = builder.scorer(ScoringStage::new(role, producer.clone()));
    }
    builder.build()
}

/// Opinions that count toward arbitration.
///
/// On the degraded path an opinion on a dimension that received no evidence
/// is ungrounded and set aside, so that dimension falls to the
/// insufficient-opinions rule. The opinions stay in the final state.
fn admissible_opinions(outcome: &ExecutionOutcome) -> Vec<Opinion> {
    let state = &outcome.state;
    match outcome.route {
        Route::Normal => state.opinions().to_vec(),
        Route::Degraded => {
            let (kept, ungrounded): (Vec<&Opinion>, Vec<&Opinion>) = state
                .opinions()
                .iter()
                .partition(|o| !state.evidence_for(o.dimension_id()).is_empty());
            if !ungrounded.is_empty() {
                debug!(
                    set_aside = ungrounded.len(),
                    "ignoring opinions on dimensions without evidence"
                );
            }
            kept.into_iter().cloned().collect()
        }
    }
}

/// Result of one audit run.
#[derive(Debug, Clone)]
pub struct AuditRun {
    pub report: AuditReport,
    /// Every stage error and router diagnostic, in canonical order.
    pub errors: Vec<StageErrorRecord>,
    pub outcome: ExecutionOutcome,
}

impl AuditRun {
    pub fn run_id(&self) -> uuid::Uuid {
        self.outcome.state.inputs().run_id
    }
}

/// A configured audit pipeline. Reusable across runs.
#[derive(Debug, Clone)]
pub struct Pipeline {
    rubric: Rubric,
    executor_config: ExecutorConfig,
}

impl Pipeline {
    pub fn new(rubric: Rubric, executor_config: ExecutorConfig) -> Self {
        Self {
            rubric,
            executor_config,
        }
    }

    pub fn rubric(&self) -> &Rubric {
        &self.rubric
    }

    /// Validate all static configuration. Nothing runs if this fails.
    pub fn validate(&self) -> Result<ArbitrationConfig> {
        self.rubric.validate()?;
        self.executor_config.validate()?;
        self.rubric.arbitration_config()
    }

    /// Run the graph once and arbitrate the resulting opinions.
    ///
    /// Stage failures never make this return `Err`; they are listed in the
    /// report. Configuration errors and opinions on unconfigured dimensions
    /// do.
    #[instrument(skip_all, fields(run_id = %inputs.run_id))]
    pub async fn execute(&self, inputs: RunInputs, graph: &PipelineGraph) -> Result<AuditRun> {
        let arbitration = self.validate()?;

        let run_id = inputs.run_id.to_string();
        let started = Instant::now();
        obs::emit_run_started(&run_id, self.rubric.dimensions.len(), graph.stage_count());

        let initial = PipelineState::new(inputs, self.rubric.dimensions.clone());
        let outcome = StageExecutor::new(self.executor_config.clone())
            .run(graph, initial)
            .await;

        let opinions = admissible_opinions(&outcome);
        let verdicts = arbitrate(&arbitration, outcome.state.dimensions(), &opinions)?;
        METRICS.add_verdicts(verdicts.len() as u64);
        for verdict in &verdicts {
            obs::emit_verdict(verdict);
        }

        let errors = outcome.errors.clone();
        let report = assemble_report(verdicts, errors.clone(), &self.rubric.report);
        obs::emit_run_finished(
            &run_id,
            started.elapsed().as_millis() as u64,
            report.overall_score,
            errors.len(),
        );

        Ok(AuditRun {
            report,
            errors,
            outcome,
        })
    }

    /// Synchronous wrapper around [`Pipeline::execute`] on a fresh
    /// multi-thread runtime.
    pub fn execute_blocking(&self, inputs: RunInputs, graph: &PipelineGraph) -> Result<AuditRun> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| AuditError::Runtime(format!("failed to start runtime: {e}")))?;
        let _span = RunSpan::enter(&inputs.run_id.to_string());
        runtime.block_on(self.execute(inputs, graph))
    }

    /// Wrap a run's report for persistence.
    pub fn artifact(&self, run: &AuditRun) -> Result<ReportArtifact> {
        info!(run_id = %run.run_id(), "building report artifact");
        ReportArtifact::new(
            run.run_id(),
            self.rubric.name.clone(),
            self.rubric.version.clone(),
            run.report.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::fakes::{FixedCollector, ScriptedProducer};

    const RUBRIC: &str = r#"{
        "name": "Pipeline Rubric",
        "version": "1.0",
        "dimensions": [
            {
                "id": "orchestration",
                "name": "Graph Orchestration",
                "target_artifact": "github_repo",
                "guidance": {
                    "prosecutor": "Linear pipelines score low.",
                    "defense": "Credit partial fan-out.",
                    "tech_lead": "Check fan-in correctness."
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

    fn graph(producer: ScriptedProducer) -> PipelineGraph {
        let rubric = Rubric::from_json_str(RUBRIC).unwrap();
        standard_graph(
            &rubric,
            Arc::new(FixedCollector::new("src/graph.rs")),
            Arc::new(producer),
        )
        .unwrap()
    }

    #[test]
    fn test_standard_graph_names_stages() {
        let g = graph(ScriptedProducer::new(3));
        let names: Vec<&str> = g.collection().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["collect:github_repo"]);
        let names: Vec<&str> = g.scoring().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["score:prosecutor", "score:defense", "score:tech_lead"]);
    }

    fn fast_config() -> ExecutorConfig {
        ExecutorConfig {
            stage_timeout: Duration::from_secs(5),
            retry_backoff: Duration::ZERO,
            ..ExecutorConfig::default()
        }
    }

    #[tokio::test]
    async fn test_clean_run_produces_report() {
        let pipeline = Pipeline::new(Rubric::from_json_str(RUBRIC).unwrap(), fast_config());
        let run = pipeline
            .execute(RunInputs::new(), &graph(ScriptedProducer::new(4)))
            .await
            .unwrap();

        assert!(run.errors.is_empty());
        assert_eq!(run.report.verdicts.len(), 1);
        assert_eq!(run.report.verdicts[0].final_score, 4);
        assert_eq!(run.report.overall_score, 4.0);
        assert_eq!(run.outcome.state.opinions().len(), 3);

        let artifact = pipeline.artifact(&run).unwrap();
        assert_eq!(artifact.rubric_name, "Pipeline Rubric");
        assert_eq!(artifact.run_id, run.run_id());
    }

    #[tokio::test]
    async fn test_invalid_executor_config_fails_before_run() {
        let config = ExecutorConfig {
            max_attempts: 0,
            ..fast_config()
        };
        let pipeline = Pipeline::new(Rubric::from_json_str(RUBRIC).unwrap(), config);
        let err = pipeline
            .execute(RunInputs::new(), &graph(ScriptedProducer::new(4)))
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_execute_blocking() {
        let pipeline = Pipeline::new(Rubric::from_json_str(RUBRIC).unwrap(), fast_config());
        let run = pipeline
            .execute_blocking(RunInputs::new(), &graph(ScriptedProducer::new(2)))
            .unwrap();
        assert_eq!(run.report.needs_remediation, vec!["orchestration".to_string()]);
    }
}
