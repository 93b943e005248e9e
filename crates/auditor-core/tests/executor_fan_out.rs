//! Stage executor fan-out/fan-in, retry and isolation tests.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;

use auditor_core::fakes::{
    FixedCollector, FlakyCollector, HangingCollector, PanickingCollector, ScriptedProducer,
};
use auditor_core::{
    merge, CollectionRequest, CollectionStage, Dimension, EvaluatorRole, EvidenceCollector,
    EvidenceId, EvidenceItem, ExecutorConfig, ExecutorPhase, Opinion, OpinionProducer,
    PipelineGraph, PipelineState, Route, RunInputs, ScoringStage, Stage, StageContext,
    StageErrorKind, StageExecutor, StateUpdate,
};

use common::{dimension, fast_config};

fn initial(dimensions: Vec<Dimension>) -> PipelineState {
    PipelineState::new(RunInputs::new(), dimensions)
}

fn scorers(
    builder: auditor_core::PipelineGraphBuilder,
    producer: Arc<dyn OpinionProducer>,
) -> auditor_core::PipelineGraphBuilder {
    EvaluatorRole::ALL
        .into_iter()
        .fold(builder, |b, role| b.scorer(ScoringStage::new(role, producer.clone())))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_evidence_lost_under_varied_delays() {
    let dims = vec![
        dimension("a", "github_repo"),
        dimension("b", "github_repo"),
        dimension("c", "pdf_report"),
    ];
    let mut builder = PipelineGraph::builder();
    for i in 0..6u64 {
        let delay = Duration::from_millis((i * 37) % 50);
        let collector = FixedCollector::new(format!("src/module_{i}.rs"))
            .with_delay(delay)
            .with_items_per_dimension(2);
        builder = builder.collector(CollectionStage::new(format!("collect:{i}"), Arc::new(collector)));
    }
    let producer = ScriptedProducer::new(4).with_delay(Duration::from_millis(5));
    let graph = scorers(builder, Arc::new(producer)).build().unwrap();

    let config = ExecutorConfig {
        max_concurrent: 2,
        ..fast_config()
    };
    let outcome = StageExecutor::new(config).run(&graph, initial(dims)).await;

    assert!(outcome.errors.is_empty(), "unexpected errors: {:?}", outcome.errors);
    assert_eq!(outcome.route, Route::Normal);
    assert_eq!(outcome.state.evidence_count(), 6 * 3 * 2);
    for id in ["a", "b", "c"] {
        assert_eq!(outcome.state.evidence_for(id).len(), 12);
    }
    let ids: HashSet<EvidenceId> = outcome.state.known_evidence_ids();
    assert_eq!(ids.len(), 36);

    assert_eq!(outcome.state.opinions().len(), 9);
    // one version bump per barrier
    assert_eq!(outcome.state.version(), 2);
}

#[tokio::test]
async fn test_trace_follows_normal_path() {
    let graph = PipelineGraph::builder()
        .collector(CollectionStage::new("collect:repo", Arc::new(FixedCollector::new("src/lib.rs"))))
        .scorer(ScoringStage::new(
            EvaluatorRole::TechLead,
            Arc::new(ScriptedProducer::new(3)),
        ))
        .build()
        .unwrap();

    let outcome = StageExecutor::new(fast_config())
        .run(&graph, initial(vec![dimension("a", "github_repo")]))
        .await;

    assert_eq!(
        outcome.trace,
        vec![
            ExecutorPhase::Init,
            ExecutorPhase::CollectingEvidence,
            ExecutorPhase::AggregatingEvidence,
            ExecutorPhase::Routing,
            ExecutorPhase::Normal,
            ExecutorPhase::ScoringOpinions,
            ExecutorPhase::AggregatingOpinions,
            ExecutorPhase::Done,
        ]
    );
}

#[tokio::test]
async fn test_transient_failure_is_retried_without_record() {
    let flaky = Arc::new(FlakyCollector::new("src/flaky.rs", 2));
    let graph = PipelineGraph::builder()
        .collector(CollectionStage::new("collect:flaky", flaky.clone()))
        .scorer(ScoringStage::new(
            EvaluatorRole::Prosecutor,
            Arc::new(ScriptedProducer::new(3)),
        ))
        .build()
        .unwrap();

    let outcome = StageExecutor::new(fast_config())
        .run(&graph, initial(vec![dimension("a", "github_repo")]))
        .await;

    assert_eq!(flaky.calls(), 3);
    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.route, Route::Normal);
    assert_eq!(outcome.state.evidence_for("a").len(), 1);
}

#[tokio::test]
async fn test_permanent_failure_records_once_and_spares_siblings() {
    let broken = Arc::new(FlakyCollector::always_failing("src/broken.rs"));
    let graph = PipelineGraph::builder()
        .collector(CollectionStage::new("collect:broken", broken.clone()))
        .collector(CollectionStage::new("collect:ok", Arc::new(FixedCollector::new("src/ok.rs"))))
        .scorer(ScoringStage::new(
            EvaluatorRole::Defense,
            Arc::new(ScriptedProducer::new(4)),
        ))
        .build()
        .unwrap();

    let outcome = StageExecutor::new(fast_config())
        .run(&graph, initial(vec![dimension("a", "github_repo")]))
        .await;

    assert_eq!(broken.calls(), 3);
    assert_eq!(outcome.route, Route::Degraded);
    assert!(outcome.trace.contains(&ExecutorPhase::Degraded));

    let failures: Vec<_> = outcome
        .errors
        .iter()
        .filter(|e| e.stage == "collect:broken")
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].kind, StageErrorKind::Failed);
    assert_eq!(failures[0].attempts, 3);

    // sibling output survives and scoring still ran
    assert_eq!(outcome.state.evidence_for("a").len(), 1);
    assert_eq!(outcome.state.opinions().len(), 1);
    assert_eq!(
        outcome
            .errors
            .iter()
            .filter(|e| e.kind == StageErrorKind::Diagnostic)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_timeout_and_panic_are_recorded() {
    let config = ExecutorConfig {
        max_attempts: 2,
        stage_timeout: Duration::from_millis(100),
        ..fast_config()
    };
    let graph = PipelineGraph::builder()
        .collector(CollectionStage::new("collect:hang", Arc::new(HangingCollector)))
        .collector(CollectionStage::new("collect:panic", Arc::new(PanickingCollector)))
        .scorer(ScoringStage::new(
            EvaluatorRole::TechLead,
            Arc::new(ScriptedProducer::new(2)),
        ))
        .build()
        .unwrap();

    let outcome = StageExecutor::new(config)
        .run(&graph, initial(vec![dimension("a", "github_repo")]))
        .await;

    let hang = outcome.errors.iter().find(|e| e.stage == "collect:hang").unwrap();
    assert_eq!(hang.kind, StageErrorKind::TimedOut);
    assert_eq!(hang.attempts, 2);

    let panic = outcome.errors.iter().find(|e| e.stage == "collect:panic").unwrap();
    assert_eq!(panic.kind, StageErrorKind::Panicked);

    assert_eq!(outcome.route, Route::Degraded);
    assert_eq!(outcome.state.opinions().len(), 1);
}

/// Cites evidence that does not exist in any snapshot.
struct DanglingCitationProducer;

#[async_trait]
impl OpinionProducer for DanglingCitationProducer {
    async fn produce_opinion(
        &self,
        role: EvaluatorRole,
        dimension: &Dimension,
        _snapshot: &PipelineState,
    ) -> anyhow::Result<Opinion> {
        Ok(Opinion::new(
            role,
            dimension.id.clone(),
            3,
            "This opinion points at evidence that was never collected by any stage.",
            [EvidenceId::new()],
        )?)
    }
}

#[tokio::test]
async fn test_dangling_citation_is_invalid_output() {
    let graph = PipelineGraph::builder()
        .collector(CollectionStage::new("collect:repo", Arc::new(FixedCollector::new("src/lib.rs"))))
        .scorer(ScoringStage::new(
            EvaluatorRole::Prosecutor,
            Arc::new(DanglingCitationProducer),
        ))
        .build()
        .unwrap();

    let outcome = StageExecutor::new(fast_config())
        .run(&graph, initial(vec![dimension("a", "github_repo")]))
        .await;

    assert!(outcome.state.opinions().is_empty());
    let record = outcome
        .errors
        .iter()
        .find(|e| e.stage == "score:prosecutor")
        .unwrap();
    assert_eq!(record.kind, StageErrorKind::InvalidOutput);
    assert_eq!(record.attempts, 3);
}

/// Hands out clones of one stored item, id included.
struct CachedCollector {
    item: EvidenceItem,
}

#[async_trait]
impl EvidenceCollector for CachedCollector {
    async fn collect(&self, _request: CollectionRequest<'_>) -> anyhow::Result<Vec<EvidenceItem>> {
        Ok(vec![self.item.clone()])
    }
}

fn cached_item() -> EvidenceItem {
    EvidenceItem::new("a", true, None, "src/cache.rs", "served from cache", 0.6).unwrap()
}

#[tokio::test]
async fn test_sibling_reusing_an_evidence_id_is_dropped() {
    let item = cached_item();
    let cached = Arc::new(CachedCollector { item: item.clone() });
    let graph = PipelineGraph::builder()
        .collector(CollectionStage::new("collect:first", cached.clone()))
        .collector(CollectionStage::new("collect:second", cached))
        .scorer(ScoringStage::new(
            EvaluatorRole::TechLead,
            Arc::new(ScriptedProducer::new(3)),
        ))
        .build()
        .unwrap();

    let outcome = StageExecutor::new(fast_config())
        .run(&graph, initial(vec![dimension("a", "github_repo")]))
        .await;

    assert_eq!(outcome.state.evidence_count(), 1);
    assert_eq!(outcome.state.evidence_for("a")[0].id(), item.id());

    // the stage declared first keeps the id
    let record = outcome
        .errors
        .iter()
        .find(|e| e.kind == StageErrorKind::InvalidOutput)
        .unwrap();
    assert_eq!(record.stage, "collect:second");
    assert_eq!(record.attempts, 1);
    assert!(record.message.contains(&item.id().to_string()));
    assert_eq!(outcome.route, Route::Degraded);
}

#[tokio::test]
async fn test_reusing_a_snapshot_evidence_id_is_invalid_output() {
    let item = cached_item();
    let seeded = merge(
        initial(vec![dimension("a", "github_repo")]),
        StateUpdate::empty().with_evidence(item.clone()),
    );
    let graph = PipelineGraph::builder()
        .collector(CollectionStage::new(
            "collect:stale",
            Arc::new(CachedCollector { item }),
        ))
        .scorer(ScoringStage::new(
            EvaluatorRole::Defense,
            Arc::new(ScriptedProducer::new(4)),
        ))
        .build()
        .unwrap();

    let outcome = StageExecutor::new(fast_config()).run(&graph, seeded).await;

    assert_eq!(outcome.state.evidence_count(), 1);
    let record = outcome
        .errors
        .iter()
        .find(|e| e.stage == "collect:stale")
        .unwrap();
    assert_eq!(record.kind, StageErrorKind::InvalidOutput);
    assert_eq!(record.attempts, 3);
}

/// Returns the same opinion twice in one update.
struct EchoingScorer {
    opinion: Opinion,
}

#[async_trait]
impl Stage for EchoingScorer {
    fn name(&self) -> &str {
        "score:echo"
    }

    async fn run(&self, _ctx: &StageContext) -> anyhow::Result<StateUpdate> {
        Ok(StateUpdate::empty()
            .with_opinion(self.opinion.clone())
            .with_opinion(self.opinion.clone()))
    }
}

#[tokio::test]
async fn test_opinion_id_repeated_within_an_update_is_invalid_output() {
    let opinion = Opinion::new(
        EvaluatorRole::Prosecutor,
        "a",
        2,
        "The same judgement is emitted twice by a stage that echoes its output.",
        [],
    )
    .unwrap();
    let graph = PipelineGraph::builder()
        .collector(CollectionStage::new("collect:repo", Arc::new(FixedCollector::new("src/lib.rs"))))
        .scorer(EchoingScorer { opinion })
        .scorer(ScoringStage::new(
            EvaluatorRole::Defense,
            Arc::new(ScriptedProducer::new(4)),
        ))
        .build()
        .unwrap();

    let outcome = StageExecutor::new(fast_config())
        .run(&graph, initial(vec![dimension("a", "github_repo")]))
        .await;

    assert_eq!(outcome.state.opinions().len(), 1);
    assert_eq!(outcome.state.opinions()[0].evaluator(), EvaluatorRole::Defense);
    let record = outcome.errors.iter().find(|e| e.stage == "score:echo").unwrap();
    assert_eq!(record.kind, StageErrorKind::InvalidOutput);
    assert_eq!(record.attempts, 3);
}

/// Fails if it can observe any opinion, i.e. a sibling's output.
struct IsolationProducer;

#[async_trait]
impl OpinionProducer for IsolationProducer {
    async fn produce_opinion(
        &self,
        role: EvaluatorRole,
        dimension: &Dimension,
        snapshot: &PipelineState,
    ) -> anyhow::Result<Opinion> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if !snapshot.opinions().is_empty() {
            bail!("scoring stage observed sibling output");
        }
        if snapshot.evidence_for(&dimension.id).is_empty() {
            bail!("scoring stage did not observe merged evidence");
        }
        Ok(Opinion::new(
            role,
            dimension.id.clone(),
            4,
            "Evidence was visible and no sibling opinion leaked into this snapshot.",
            [],
        )?)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scoring_stages_see_only_the_evidence_barrier_snapshot() {
    let builder = PipelineGraph::builder()
        .collector(CollectionStage::new("collect:a", Arc::new(FixedCollector::new("src/a.rs"))))
        .collector(CollectionStage::new("collect:b", Arc::new(FixedCollector::new("src/b.rs"))));
    let graph = scorers(builder, Arc::new(IsolationProducer)).build().unwrap();

    let outcome = StageExecutor::new(fast_config())
        .run(&graph, initial(vec![dimension("a", ""), dimension("b", "")]))
        .await;

    assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
    assert_eq!(outcome.state.opinions().len(), 6);
}
