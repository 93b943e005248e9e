//! Versioned pipeline state and its merge operations.
//!
//! Stages never touch [`PipelineState`] directly. They return a
//! [`StateUpdate`] and the executor folds a whole group's updates in at the
//! fan-in barrier through [`merge`]. Every field merge is an append, and each
//! collection is kept in a canonical order, so the merged state does not
//! depend on the order in which sibling stages finished:
//!
//! - `evidence_by_dimension`: union of keys, per-key concatenation
//! - `opinions`: concatenation
//! - `errors`: concatenation
//!
//! No merge drops, overwrites or deduplicates an element. Evidence and
//! opinion ids are unique within a run because the executor rejects any
//! update that reuses one before the update reaches [`merge`].

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::{
    Dimension, DimensionId, EvidenceId, EvidenceItem, Opinion, OpinionId, RunInputs,
};

/// Classification of a recorded stage error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageErrorKind {
    /// The stage returned an error on its final attempt.
    Failed,
    /// The final attempt exceeded the stage timeout.
    TimedOut,
    /// The stage returned output that violated the evidence/opinion contract.
    InvalidOutput,
    /// The stage task panicked.
    Panicked,
    /// Diagnostic appended by the router on the degraded path.
    Diagnostic,
}

/// One entry of the state's error accumulator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StageErrorRecord {
    pub stage: String,
    pub kind: StageErrorKind,
    pub message: String,
    /// Attempts made before the failure became permanent (0 for diagnostics).
    pub attempts: u32,
}

impl StageErrorRecord {
    pub fn new(
        stage: impl Into<String>,
        kind: StageErrorKind,
        message: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            stage: stage.into(),
            kind,
            message: message.into(),
            attempts,
        }
    }
}

impl std::fmt::Display for StageErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {:?} after {} attempt(s): {}",
            self.stage, self.kind, self.attempts, self.message
        )
    }
}

/// A partial update returned by one stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub evidence: BTreeMap<DimensionId, Vec<EvidenceItem>>,
    pub opinions: Vec<Opinion>,
    pub errors: Vec<StageErrorRecord>,
}

impl StateUpdate {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_evidence(mut self, item: EvidenceItem) -> Self {
        self.evidence
            .entry(item.dimension_id().to_string())
            .or_default()
            .push(item);
        self
    }

    pub fn with_opinion(mut self, opinion: Opinion) -> Self {
        self.opinions.push(opinion);
        self
    }

    pub fn with_error(mut self, error: StageErrorRecord) -> Self {
        self.errors.push(error);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.evidence.values().all(Vec::is_empty)
            && self.opinions.is_empty()
            && self.errors.is_empty()
    }
}

/// The shared accumulator for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    version: u64,
    inputs: RunInputs,
    dimensions: Vec<Dimension>,
    evidence_by_dimension: BTreeMap<DimensionId, Vec<EvidenceItem>>,
    opinions: Vec<Opinion>,
    errors: Vec<StageErrorRecord>,
}

impl PipelineState {
    /// Fresh state with empty accumulators and the static inputs.
    pub fn new(inputs: RunInputs, dimensions: Vec<Dimension>) -> Self {
        Self {
            version: 0,
            inputs,
            dimensions,
            evidence_by_dimension: BTreeMap::new(),
            opinions: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Fold one fan-in's updates into the state and bump the version once.
    pub fn apply_fan_in<I>(self, updates: I) -> Self
    where
        I: IntoIterator<Item = StateUpdate>,
    {
        let mut state = updates.into_iter().fold(self, merge);
        state.version += 1;
        state
    }

    /// Number of fan-in barriers applied so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn inputs(&self) -> &RunInputs {
        &self.inputs
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn dimension(&self, id: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.id == id)
    }

    pub fn evidence_by_dimension(&self) -> &BTreeMap<DimensionId, Vec<EvidenceItem>> {
        &self.evidence_by_dimension
    }

    /// Evidence collected for one dimension (empty slice when none).
    pub fn evidence_for(&self, dimension_id: &str) -> &[EvidenceItem] {
        self.evidence_by_dimension
            .get(dimension_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn evidence_count(&self) -> usize {
        self.evidence_by_dimension.values().map(Vec::len).sum()
    }

    /// `true` when no collector contributed a single item.
    pub fn has_no_evidence(&self) -> bool {
        self.evidence_count() == 0
    }

    pub fn known_evidence_ids(&self) -> HashSet<EvidenceId> {
        self.evidence_by_dimension
            .values()
            .flatten()
            .map(EvidenceItem::id)
            .collect()
    }

    pub fn known_opinion_ids(&self) -> HashSet<OpinionId> {
        self.opinions.iter().map(Opinion::id).collect()
    }

    pub fn opinions(&self) -> &[Opinion] {
        &self.opinions
    }

    pub fn opinions_for<'a>(&'a self, dimension_id: &'a str) -> impl Iterator<Item = &'a Opinion> {
        self.opinions
            .iter()
            .filter(move |o| o.dimension_id() == dimension_id)
    }

    pub fn errors(&self) -> &[StageErrorRecord] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Merge a partial update into the state.
///
/// Pure and order-insensitive: for any updates `a` and `b`,
/// `merge(merge(s, a), b) == merge(merge(s, b), a)`. The version is left
/// alone; [`PipelineState::apply_fan_in`] owns it.
pub fn merge(mut current: PipelineState, update: StateUpdate) -> PipelineState {
    for (dimension_id, items) in update.evidence {
        let bucket = current.evidence_by_dimension.entry(dimension_id).or_default();
        bucket.extend(items);
        bucket.sort_by_key(EvidenceItem::id);
    }

    if !update.opinions.is_empty() {
        current.opinions.extend(update.opinions);
        sort_opinions(&mut current.opinions);
    }

    if !update.errors.is_empty() {
        current.errors.extend(update.errors);
        current.errors.sort();
    }

    current
}

/// Canonical opinion order: dimension, then role, then id.
pub(crate) fn sort_opinions(opinions: &mut [Opinion]) {
    opinions.sort_by(|a, b| {
        a.dimension_id()
            .cmp(b.dimension_id())
            .then(a.evaluator().cmp(&b.evaluator()))
            .then(a.id().cmp(&b.id()))
    });
}
