//! Stage contracts and the adapters for the two external collaborators.
//!
//! A [`Stage`] reads a read-only snapshot and returns a [`StateUpdate`]; it
//! never mutates shared state. Evidence gathering and opinion scoring are
//! external concerns plugged in through [`EvidenceCollector`] and
//! [`OpinionProducer`], wrapped by [`CollectionStage`] and [`ScoringStage`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{AuditError, Dimension, EvaluatorRole, EvidenceItem, Opinion, RunInputs};
use crate::state::{PipelineState, StateUpdate};

/// Everything a stage may observe during one attempt.
#[derive(Debug, Clone)]
pub struct StageContext {
    /// State as merged after the previous fan-in.
    pub snapshot: Arc<PipelineState>,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Isolated scratch directory owned by the executor for this attempt.
    /// Removed when the attempt ends.
    pub workspace: PathBuf,
}

/// A unit of work inside a fan-out group.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Unique name within the pipeline graph; used in error records.
    fn name(&self) -> &str;

    async fn run(&self, ctx: &StageContext) -> anyhow::Result<StateUpdate>;
}

/// Arguments handed to an [`EvidenceCollector`].
#[derive(Debug, Clone, Copy)]
pub struct CollectionRequest<'a> {
    pub inputs: &'a RunInputs,
    /// The dimensions this collector is responsible for.
    pub dimensions: &'a [Dimension],
    /// Scratch directory; collectors must not write outside it.
    pub workspace: &'a Path,
}

/// Gathers objective evidence (clone + AST inspection, document parsing,
/// diagram detection, ...).
#[async_trait]
pub trait EvidenceCollector: Send + Sync {
    async fn collect(&self, request: CollectionRequest<'_>) -> anyhow::Result<Vec<EvidenceItem>>;
}

/// Produces one scored opinion for a dimension from a given role's lens.
///
/// This is the only place role-specific behaviour lives; the executor and
/// arbitration engine dispatch on [`EvaluatorRole`] alone. A producer may
/// score a dimension that received no evidence; on the degraded path such
/// opinions are not counted by arbitration.
#[async_trait]
pub trait OpinionProducer: Send + Sync {
    async fn produce_opinion(
        &self,
        role: EvaluatorRole,
        dimension: &Dimension,
        snapshot: &PipelineState,
    ) -> anyhow::Result<Opinion>;
}

/// Evidence-collection stage wrapping an [`EvidenceCollector`].
pub struct CollectionStage {
    name: String,
    /// When set, only dimensions with this `target_artifact` are requested.
    target_artifact: Option<String>,
    collector: Arc<dyn EvidenceCollector>,
}

impl CollectionStage {
    pub fn new(name: impl Into<String>, collector: Arc<dyn EvidenceCollector>) -> Self {
        Self {
            name: name.into(),
            target_artifact: None,
            collector,
        }
    }

    /// Restrict the stage to dimensions targeting `artifact`.
    pub fn for_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.target_artifact = Some(artifact.into());
        self
    }
}

#[async_trait]
impl Stage for CollectionStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &StageContext) -> anyhow::Result<StateUpdate> {
        let dimensions: Vec<Dimension> = match &self.target_artifact {
            Some(artifact) => ctx
                .snapshot
                .dimensions()
                .iter()
                .filter(|d| &d.target_artifact == artifact)
                .cloned()
                .collect(),
            None => ctx.snapshot.dimensions().to_vec(),
        };
        if dimensions.is_empty() {
            debug!(stage = %self.name, "no dimensions target this collector");
            return Ok(StateUpdate::empty());
        }

        let items = self
            .collector
            .collect(CollectionRequest {
                inputs: ctx.snapshot.inputs(),
                dimensions: &dimensions,
                workspace: &ctx.workspace,
            })
            .await?;

        let mut update = StateUpdate::empty();
        for item in items {
            if !dimensions.iter().any(|d| d.id == item.dimension_id()) {
                return Err(AuditError::InvalidEvidence(format!(
                    "collector {} produced evidence for dimension '{}' it was not asked about",
                    self.name,
                    item.dimension_id()
                ))
                .into());
            }
            update = update.with_evidence(item);
        }
        Ok(update)
    }
}

/// Opinion-scoring stage for one evaluator role.
///
/// Produces one opinion per configured dimension. An attempt is
/// all-or-nothing: any producer error fails the whole attempt.
pub struct ScoringStage {
    name: String,
    role: EvaluatorRole,
    producer: Arc<dyn OpinionProducer>,
}

impl ScoringStage {
    pub fn new(role: EvaluatorRole, producer: Arc<dyn OpinionProducer>) -> Self {
        Self {
            name: format!("score:{role}"),
            role,
            producer,
        }
    }

    pub fn role(&self) -> EvaluatorRole {
        self.role
    }
}

#[async_trait]
impl Stage for ScoringStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &StageContext) -> anyhow::Result<StateUpdate> {
        let snapshot = ctx.snapshot.as_ref();
        let mut update = StateUpdate::empty();
        for dimension in snapshot.dimensions() {
            let opinion = self
                .producer
                .produce_opinion(self.role, dimension, snapshot)
                .await?;

            if opinion.evaluator() != self.role || opinion.dimension_id() != dimension.id {
                return Err(AuditError::InvalidOpinion {
                    evaluator: opinion.evaluator().to_string(),
                    dimension_id: opinion.dimension_id().to_string(),
                    reason: format!(
                        "requested {} opinion on '{}'",
                        self.role, dimension.id
                    ),
                }
                .into());
            }
            update = update.with_opinion(opinion);
        }
        Ok(update)
    }
}
