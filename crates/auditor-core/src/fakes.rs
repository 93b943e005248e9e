//! Deterministic stub collaborators (testing only).
//!
//! Provides collectors and producers with configurable delays, failures,
//! hangs and panics so executor behaviour can be exercised without real
//! extraction or model calls.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;

use crate::domain::{Dimension, DimensionId, EvaluatorRole, EvidenceItem, Opinion};
use crate::stage::{CollectionRequest, EvidenceCollector, OpinionProducer};
use crate::state::PipelineState;

// ---------------------------------------------------------------------------
// Collectors
// ---------------------------------------------------------------------------

/// Emits `per_dimension` found items for every requested dimension, after an
/// optional delay.
#[derive(Debug)]
pub struct FixedCollector {
    location: String,
    per_dimension: usize,
    delay: Duration,
    calls: AtomicU32,
}

impl FixedCollector {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            per_dimension: 1,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_items_per_dimension(mut self, n: usize) -> Self {
        self.per_dimension = n;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EvidenceCollector for FixedCollector {
    async fn collect(&self, request: CollectionRequest<'_>) -> anyhow::Result<Vec<EvidenceItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut items = Vec::new();
        for dimension in request.dimensions {
            for n in 0..self.per_dimension {
                items.push(EvidenceItem::new(
                    dimension.id.clone(),
                    true,
                    Some(format!("{} finding #{n}", dimension.id)),
                    format!("{}#{n}", self.location),
                    format!("{} inspected for {}", self.location, dimension.name),
                    0.9,
                )?);
            }
        }
        Ok(items)
    }
}

/// Fails the first `failures` calls, then delegates to a [`FixedCollector`].
/// `u32::MAX` failures means it never succeeds.
#[derive(Debug)]
pub struct FlakyCollector {
    inner: FixedCollector,
    failures: u32,
    calls: AtomicU32,
}

impl FlakyCollector {
    pub fn new(location: impl Into<String>, failures: u32) -> Self {
        Self {
            inner: FixedCollector::new(location),
            failures,
            calls: AtomicU32::new(0),
        }
    }

    pub fn always_failing(location: impl Into<String>) -> Self {
        Self::new(location, u32::MAX)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EvidenceCollector for FlakyCollector {
    async fn collect(&self, request: CollectionRequest<'_>) -> anyhow::Result<Vec<EvidenceItem>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            bail!("collector unavailable (call {call})");
        }
        self.inner.collect(request).await
    }
}

/// Never completes.
#[derive(Debug, Default)]
pub struct HangingCollector;

#[async_trait]
impl EvidenceCollector for HangingCollector {
    async fn collect(&self, _request: CollectionRequest<'_>) -> anyhow::Result<Vec<EvidenceItem>> {
        std::future::pending::<()>().await;
        Ok(Vec::new())
    }
}

/// Panics on every call.
#[derive(Debug, Default)]
pub struct PanickingCollector;

#[async_trait]
impl EvidenceCollector for PanickingCollector {
    async fn collect(&self, _request: CollectionRequest<'_>) -> anyhow::Result<Vec<EvidenceItem>> {
        panic!("collector panicked");
    }
}

// ---------------------------------------------------------------------------
// Producers
// ---------------------------------------------------------------------------

/// Returns scripted scores per `(role, dimension)`, falling back to a default.
///
/// Each opinion cites every evidence item the snapshot holds for its
/// dimension.
#[derive(Debug)]
pub struct ScriptedProducer {
    default_score: u8,
    scores: BTreeMap<(EvaluatorRole, DimensionId), u8>,
    security_flags: BTreeSet<(EvaluatorRole, DimensionId)>,
    failing_roles: BTreeSet<EvaluatorRole>,
    require_evidence: bool,
    delay: Duration,
}

impl ScriptedProducer {
    pub fn new(default_score: u8) -> Self {
        Self {
            default_score,
            scores: BTreeMap::new(),
            security_flags: BTreeSet::new(),
            failing_roles: BTreeSet::new(),
            require_evidence: false,
            delay: Duration::ZERO,
        }
    }

    pub fn score(mut self, role: EvaluatorRole, dimension_id: &str, score: u8) -> Self {
        self.scores.insert((role, dimension_id.to_string()), score);
        self
    }

    pub fn flag_security(mut self, role: EvaluatorRole, dimension_id: &str) -> Self {
        self.security_flags.insert((role, dimension_id.to_string()));
        self
    }

    /// Every call for `role` fails.
    pub fn fail_role(mut self, role: EvaluatorRole) -> Self {
        self.failing_roles.insert(role);
        self
    }

    /// Fail when the snapshot holds no evidence for the dimension.
    pub fn requiring_evidence(mut self) -> Self {
        self.require_evidence = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl OpinionProducer for ScriptedProducer {
    async fn produce_opinion(
        &self,
        role: EvaluatorRole,
        dimension: &Dimension,
        snapshot: &PipelineState,
    ) -> anyhow::Result<Opinion> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing_roles.contains(&role) {
            bail!("{role} producer unavailable");
        }
        let evidence = snapshot.evidence_for(&dimension.id);
        if self.require_evidence && evidence.is_empty() {
            bail!("no evidence to judge '{}'", dimension.id);
        }

        let key = (role, dimension.id.clone());
        let score = self.scores.get(&key).copied().unwrap_or(self.default_score);
        let argument = format!(
            "As {role}, after weighing {} evidence item(s) for {}, the score is {score}.",
            evidence.len(),
            dimension.name
        );
        let opinion = Opinion::new(
            role,
            dimension.id.clone(),
            score,
            argument,
            evidence.iter().map(EvidenceItem::id),
        )?;
        Ok(if self.security_flags.contains(&key) {
            opinion.with_security_flag()
        } else {
            opinion
        })
    }
}
