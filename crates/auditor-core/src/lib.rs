//! Automaton Auditor core library
//!
//! Parallel evaluation pipeline: concurrent evidence collection, race-free
//! state merging, conditional routing, concurrent opinion scoring and
//! deterministic arbitration into a structured report.

pub mod arbitration;
pub mod config;
pub mod domain;
pub mod executor;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod pipeline;
pub mod recorded;
pub mod report;
pub mod router;
pub mod stage;
pub mod state;
pub mod telemetry;

pub use arbitration::{
    arbitrate, arbitrate_dimension, verdict_digest, ArbitrationConfig, ArbitrationTable,
};

pub use config::Rubric;

pub use domain::{
    AuditError, CriterionVerdict, Dimension, DimensionId, EvaluatorRole, EvidenceId, EvidenceItem,
    Opinion, OpinionId, ResolutionRule, Result, RunInputs, MIN_ARGUMENT_CHARS, SCORE_MAX,
    SCORE_MIN,
};

pub use executor::{
    ExecutionOutcome, ExecutorConfig, ExecutorPhase, PipelineGraph, PipelineGraphBuilder,
    StageExecutor,
};

pub use pipeline::{standard_graph, AuditRun, Pipeline};

pub use recorded::{EvidenceRecord, OpinionRecord, RecordedCollector, RecordedProducer};

pub use report::{
    assemble_report, write_report_json, AuditReport, ReportArtifact, ReportConfig,
    REPORT_SCHEMA_VERSION,
};

pub use router::{apply_route, route, Route};

pub use stage::{
    CollectionRequest, CollectionStage, EvidenceCollector, OpinionProducer, ScoringStage, Stage,
    StageContext,
};

pub use state::{merge, PipelineState, StageErrorKind, StageErrorRecord, StateUpdate};

/// Crate version, embedded in CLI output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
