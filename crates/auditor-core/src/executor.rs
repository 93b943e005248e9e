//! Stage executor: fan-out, fan-in and the single routing branch.
//!
//! The graph is fixed and acyclic:
//!
//! ```text
//! Init → CollectingEvidence → AggregatingEvidence → Routing
//!      → {Normal | Degraded} → ScoringOpinions → AggregatingOpinions → Done
//! ```
//!
//! Each stage of a group runs as its own tokio task and sees only the
//! snapshot merged at the previous barrier. Failed attempts are retried for
//! the failing stage alone; a stage that exhausts its attempts contributes an
//! error record instead of output and never aborts its siblings. Evidence and
//! opinion ids must be new to the run: an update reusing an id from the
//! snapshot is invalid output, and of two siblings returning the same id the
//! one declared later is dropped at the barrier. The state
//! is written only here, single-threaded, after every member of a group has
//! finished.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::instrument;

use crate::domain::{AuditError, EvidenceId, EvidenceItem, Opinion, OpinionId, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::router::{self, Route};
use crate::stage::{Stage, StageContext};
use crate::state::{PipelineState, StageErrorKind, StageErrorRecord, StateUpdate};

/// Executor state machine phases, in the order a run visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorPhase {
    Init,
    CollectingEvidence,
    AggregatingEvidence,
    Routing,
    Normal,
    Degraded,
    ScoringOpinions,
    AggregatingOpinions,
    Done,
}

impl std::fmt::Display for ExecutorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutorPhase::Init => "init",
            ExecutorPhase::CollectingEvidence => "collecting_evidence",
            ExecutorPhase::AggregatingEvidence => "aggregating_evidence",
            ExecutorPhase::Routing => "routing",
            ExecutorPhase::Normal => "normal",
            ExecutorPhase::Degraded => "degraded",
            ExecutorPhase::ScoringOpinions => "scoring_opinions",
            ExecutorPhase::AggregatingOpinions => "aggregating_opinions",
            ExecutorPhase::Done => "done",
        };
        write!(f, "{s}")
    }
}

/// Retry, timeout and concurrency settings for stage execution.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Attempts per stage before the failure becomes permanent.
    pub max_attempts: u32,
    /// Deadline for a single attempt.
    pub stage_timeout: Duration,
    /// Pause between attempts of the same stage.
    pub retry_backoff: Duration,
    /// Maximum number of stages of one group running at once.
    pub max_concurrent: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            stage_timeout: Duration::from_secs(60),
            retry_backoff: Duration::from_millis(250),
            max_concurrent: 8,
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(AuditError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent == 0 {
            return Err(AuditError::InvalidConfig(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.stage_timeout.is_zero() {
            return Err(AuditError::InvalidConfig(
                "stage_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// The statically declared two-layer stage graph.
#[derive(Clone)]
pub struct PipelineGraph {
    collection: Vec<Arc<dyn Stage>>,
    scoring: Vec<Arc<dyn Stage>>,
}

impl PipelineGraph {
    pub fn builder() -> PipelineGraphBuilder {
        PipelineGraphBuilder::default()
    }

    pub fn collection(&self) -> &[Arc<dyn Stage>] {
        &self.collection
    }

    pub fn scoring(&self) -> &[Arc<dyn Stage>] {
        &self.scoring
    }

    pub fn stage_count(&self) -> usize {
        self.collection.len() + self.scoring.len()
    }
}

impl std::fmt::Debug for PipelineGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |stages: &[Arc<dyn Stage>]| {
            stages.iter().map(|s| s.name().to_string()).collect::<Vec<_>>()
        };
        f.debug_struct("PipelineGraph")
            .field("collection", &names(&self.collection))
            .field("scoring", &names(&self.scoring))
            .finish()
    }
}

/// Builder for [`PipelineGraph`].
#[derive(Default)]
pub struct PipelineGraphBuilder {
    collection: Vec<Arc<dyn Stage>>,
    scoring: Vec<Arc<dyn Stage>>,
}

impl PipelineGraphBuilder {
    /// Add a stage to the evidence-collection fan-out group.
    pub fn collector<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.collection.push(Arc::new(stage));
        self
    }

    /// Add a stage to the opinion-scoring fan-out group.
    pub fn scorer<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.scoring.push(Arc::new(stage));
        self
    }

    /// Validate and freeze the graph.
    ///
    /// Returns [`AuditError::InvalidGraph`] for an empty group or a stage
    /// name used twice anywhere in the graph.
    pub fn build(self) -> Result<PipelineGraph> {
        if self.collection.is_empty() {
            return Err(AuditError::InvalidGraph(
                "evidence-collection group has no stages".to_string(),
            ));
        }
        if self.scoring.is_empty() {
            return Err(AuditError::InvalidGraph(
                "opinion-scoring group has no stages".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for stage in self.collection.iter().chain(self.scoring.iter()) {
            if !seen.insert(stage.name().to_string()) {
                return Err(AuditError::InvalidGraph(format!(
                    "duplicate stage name '{}'",
                    stage.name()
                )));
            }
        }
        Ok(PipelineGraph {
            collection: self.collection,
            scoring: self.scoring,
        })
    }
}

/// Everything a completed execution yields.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Final state; read-only from here on.
    pub state: PipelineState,
    /// Copy of the state's error accumulator.
    pub errors: Vec<StageErrorRecord>,
    pub route: Route,
    /// Phases visited, in order.
    pub trace: Vec<ExecutorPhase>,
}

/// Runs a [`PipelineGraph`] against an initial [`PipelineState`].
#[derive(Debug, Clone, Default)]
pub struct StageExecutor {
    config: ExecutorConfig,
}

enum StageOutcome {
    Completed { update: StateUpdate, attempts: u32 },
    Failed(StageErrorRecord),
}

impl StageExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute the whole graph once. Never fails: stage errors end up in the
    /// returned state's error accumulator.
    #[instrument(skip_all, fields(run_id = %initial.inputs().run_id))]
    pub async fn run(&self, graph: &PipelineGraph, initial: PipelineState) -> ExecutionOutcome {
        let run_id = initial.inputs().run_id.to_string();
        let mut trace = vec![ExecutorPhase::Init];
        obs::emit_phase(&run_id, &ExecutorPhase::Init, initial.version());

        enter(&mut trace, ExecutorPhase::CollectingEvidence, &run_id, &initial);
        let snapshot = Arc::new(initial);
        let updates = self.run_group(graph.collection(), &snapshot).await;

        let state = release(snapshot);
        enter(&mut trace, ExecutorPhase::AggregatingEvidence, &run_id, &state);
        let state = state.apply_fan_in(updates);

        enter(&mut trace, ExecutorPhase::Routing, &run_id, &state);
        let route = router::route(&state);
        obs::emit_route(&run_id, route, state.errors().len(), state.evidence_count());
        let branch = match route {
            Route::Normal => ExecutorPhase::Normal,
            Route::Degraded => {
                METRICS.inc_degraded_routes();
                ExecutorPhase::Degraded
            }
        };
        enter(&mut trace, branch, &run_id, &state);
        let state = router::apply_route(route, state);

        enter(&mut trace, ExecutorPhase::ScoringOpinions, &run_id, &state);
        let snapshot = Arc::new(state);
        let updates = self.run_group(graph.scoring(), &snapshot).await;

        let state = release(snapshot);
        enter(&mut trace, ExecutorPhase::AggregatingOpinions, &run_id, &state);
        let state = state.apply_fan_in(updates);

        enter(&mut trace, ExecutorPhase::Done, &run_id, &state);
        METRICS.flush();

        ExecutionOutcome {
            errors: state.errors().to_vec(),
            state,
            route,
            trace,
        }
    }

    /// Fan out one group and wait for every member (the fan-in barrier).
    ///
    /// Updates are returned in declared stage order; failed stages, and stages
    /// whose output reuses an id a sibling declared earlier already returned,
    /// yield an update carrying only their error record.
    async fn run_group(
        &self,
        stages: &[Arc<dyn Stage>],
        snapshot: &Arc<PipelineState>,
    ) -> Vec<StateUpdate> {
        let sem = Arc::new(Semaphore::new(self.config.max_concurrent));
        let known = Arc::new(KnownIds::of(snapshot));

        let mut tasks = Vec::with_capacity(stages.len());
        for stage in stages {
            let stage = Arc::clone(stage);
            let snapshot = Arc::clone(snapshot);
            let known = Arc::clone(&known);
            let sem = Arc::clone(&sem);
            let config = self.config.clone();

            let task = tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                run_stage(stage, snapshot, known, config).await
            });
            tasks.push(task);
        }

        let joined = futures::future::join_all(tasks).await;

        let mut claimed = KnownIds::default();
        let mut updates = Vec::with_capacity(stages.len());
        for (stage, result) in stages.iter().zip(joined) {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => StageOutcome::Failed(StageErrorRecord::new(
                    stage.name(),
                    StageErrorKind::Panicked,
                    format!("stage supervisor task failed: {e}"),
                    0,
                )),
            };
            let outcome = match outcome {
                StageOutcome::Completed { update, attempts } => match claimed.claim(&update) {
                    Ok(()) => StageOutcome::Completed { update, attempts },
                    Err(e) => StageOutcome::Failed(StageErrorRecord::new(
                        stage.name(),
                        StageErrorKind::InvalidOutput,
                        e.to_string(),
                        attempts,
                    )),
                },
                failed => failed,
            };
            updates.push(match outcome {
                StageOutcome::Completed { update, .. } => update,
                StageOutcome::Failed(record) => {
                    METRICS.inc_stage_failures();
                    obs::emit_stage_failed(&record);
                    StateUpdate::empty().with_error(record)
                }
            });
        }
        updates
    }
}

/// Drive one stage through its attempts.
async fn run_stage(
    stage: Arc<dyn Stage>,
    snapshot: Arc<PipelineState>,
    known: Arc<KnownIds>,
    config: ExecutorConfig,
) -> StageOutcome {
    let name = stage.name().to_string();
    let mut last = (StageErrorKind::Failed, String::from("stage never ran"));

    for attempt in 1..=config.max_attempts {
        METRICS.inc_stage_attempts();
        let started = Instant::now();

        let workspace = match tempfile::Builder::new().prefix("auditor-stage-").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                last = (StageErrorKind::Failed, format!("workspace setup failed: {e}"));
                obs::emit_stage_attempt_failed(&name, attempt, last.0, &last.1);
                backoff(&config, attempt).await;
                continue;
            }
        };
        let ctx = StageContext {
            snapshot: Arc::clone(&snapshot),
            attempt,
            workspace: workspace.path().to_path_buf(),
        };

        let attempt_stage = Arc::clone(&stage);
        let mut handle = tokio::spawn(async move { attempt_stage.run(&ctx).await });

        let result = match tokio::time::timeout(config.stage_timeout, &mut handle).await {
            Ok(Ok(Ok(update))) => match validate_update(&snapshot, &known, &update) {
                Ok(()) => Ok(update),
                Err(e) => Err((StageErrorKind::InvalidOutput, e.to_string())),
            },
            Ok(Ok(Err(e))) => Err((classify(&e), format!("{e:#}"))),
            Ok(Err(join)) if join.is_panic() => {
                Err((StageErrorKind::Panicked, "stage panicked".to_string()))
            }
            Ok(Err(join)) => Err((StageErrorKind::Failed, join.to_string())),
            Err(_) => {
                handle.abort();
                Err((
                    StageErrorKind::TimedOut,
                    format!("timed out after {}ms", config.stage_timeout.as_millis()),
                ))
            }
        };
        drop(workspace);

        match result {
            Ok(update) => {
                obs::emit_stage_completed(&name, attempt, started.elapsed().as_millis() as u64);
                return StageOutcome::Completed {
                    update,
                    attempts: attempt,
                };
            }
            Err(failure) => {
                obs::emit_stage_attempt_failed(&name, attempt, failure.0, &failure.1);
                last = failure;
                backoff(&config, attempt).await;
            }
        }
    }

    StageOutcome::Failed(StageErrorRecord::new(
        name,
        last.0,
        last.1,
        config.max_attempts,
    ))
}

async fn backoff(config: &ExecutorConfig, attempt: u32) {
    if attempt < config.max_attempts {
        METRICS.inc_stage_retries();
        if !config.retry_backoff.is_zero() {
            tokio::time::sleep(config.retry_backoff).await;
        }
    }
}

/// Contract violations surfaced by the stage adapters count as invalid output.
fn classify(error: &anyhow::Error) -> StageErrorKind {
    match error.downcast_ref::<AuditError>() {
        Some(
            AuditError::InvalidEvidence(_)
            | AuditError::InvalidOpinion { .. }
            | AuditError::UnknownDimension { .. },
        ) => StageErrorKind::InvalidOutput,
        _ => StageErrorKind::Failed,
    }
}

/// Evidence and opinion ids already taken within a run.
#[derive(Debug, Default)]
struct KnownIds {
    evidence: HashSet<EvidenceId>,
    opinions: HashSet<OpinionId>,
}

impl KnownIds {
    fn of(state: &PipelineState) -> Self {
        Self {
            evidence: state.known_evidence_ids(),
            opinions: state.known_opinion_ids(),
        }
    }

    /// Fails on the first id of `update` that is already taken or repeated
    /// within the update itself.
    fn check(&self, update: &StateUpdate) -> Result<()> {
        let mut evidence = HashSet::new();
        for item in update.evidence.values().flatten() {
            if self.evidence.contains(&item.id()) || !evidence.insert(item.id()) {
                return Err(AuditError::InvalidEvidence(format!(
                    "evidence id {} is already used in this run",
                    item.id()
                )));
            }
        }
        let mut opinions = HashSet::new();
        for opinion in &update.opinions {
            if self.opinions.contains(&opinion.id()) || !opinions.insert(opinion.id()) {
                return Err(AuditError::InvalidOpinion {
                    evaluator: opinion.evaluator().to_string(),
                    dimension_id: opinion.dimension_id().to_string(),
                    reason: format!("opinion id {} is already used in this run", opinion.id().0),
                });
            }
        }
        Ok(())
    }

    /// Take every id of `update`, or none when any is already taken.
    fn claim(&mut self, update: &StateUpdate) -> Result<()> {
        self.check(update)?;
        self.evidence
            .extend(update.evidence.values().flatten().map(EvidenceItem::id));
        self.opinions.extend(update.opinions.iter().map(Opinion::id));
        Ok(())
    }
}

/// Check a stage's update against the snapshot it was computed from.
fn validate_update(snapshot: &PipelineState, known: &KnownIds, update: &StateUpdate) -> Result<()> {
    known.check(update)?;
    for (dimension_id, items) in &update.evidence {
        if snapshot.dimension(dimension_id).is_none() {
            return Err(AuditError::InvalidEvidence(format!(
                "evidence for unknown dimension '{dimension_id}'"
            )));
        }
        for item in items {
            item.validate()?;
            if item.dimension_id() != dimension_id {
                return Err(AuditError::InvalidEvidence(format!(
                    "evidence {} filed under '{}' but belongs to '{}'",
                    item.id(),
                    dimension_id,
                    item.dimension_id()
                )));
            }
        }
    }
    for opinion in &update.opinions {
        opinion.validate(snapshot.dimensions(), &known.evidence)?;
    }
    Ok(())
}

fn enter(trace: &mut Vec<ExecutorPhase>, phase: ExecutorPhase, run_id: &str, state: &PipelineState) {
    trace.push(phase);
    obs::emit_phase(run_id, &phase, state.version());
}

/// Take the state back from the snapshot once the group's tasks are done.
/// A timed-out attempt may still hold a reference while it unwinds.
fn release(snapshot: Arc<PipelineState>) -> PipelineState {
    Arc::try_unwrap(snapshot).unwrap_or_else(|shared| (*shared).clone())
}
