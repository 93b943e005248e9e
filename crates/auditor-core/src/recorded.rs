//! Collaborators that replay previously recorded evidence and opinions.
//!
//! Lets the pipeline run end to end from JSON files without any live
//! extraction or model calls. Evidence ids are minted fresh on every
//! collection; opinions cite evidence by `location` and the citations are
//! resolved against the snapshot the producer is handed.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{
    Dimension, DimensionId, EvaluatorRole, EvidenceId, EvidenceItem, Opinion, Result,
};
use crate::stage::{CollectionRequest, EvidenceCollector, OpinionProducer};
use crate::state::PipelineState;

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

/// One recorded evidence finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub dimension_id: DimensionId,
    #[serde(default = "default_found")]
    pub found: bool,
    #[serde(default)]
    pub content: Option<String>,
    pub location: String,
    pub rationale: String,
    pub confidence: f64,
}

fn default_found() -> bool {
    true
}

impl EvidenceRecord {
    fn to_item(&self) -> Result<EvidenceItem> {
        EvidenceItem::new(
            self.dimension_id.clone(),
            self.found,
            self.content.clone(),
            self.location.clone(),
            self.rationale.clone(),
            self.confidence,
        )
    }
}

/// Replays [`EvidenceRecord`]s for whichever dimensions a stage asks about.
#[derive(Debug, Clone, Default)]
pub struct RecordedCollector {
    records: Vec<EvidenceRecord>,
}

impl RecordedCollector {
    pub fn new(records: Vec<EvidenceRecord>) -> Self {
        Self { records }
    }

    /// Load a JSON array of evidence records.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Self::new(serde_json::from_str(&raw)?))
    }

    pub fn records(&self) -> &[EvidenceRecord] {
        &self.records
    }
}

#[async_trait]
impl EvidenceCollector for RecordedCollector {
    async fn collect(&self, request: CollectionRequest<'_>) -> anyhow::Result<Vec<EvidenceItem>> {
        let mut items = Vec::new();
        for record in &self.records {
            if request.dimensions.iter().any(|d| d.id == record.dimension_id) {
                items.push(record.to_item()?);
            }
        }
        Ok(items)
    }
}

// ---------------------------------------------------------------------------
// Opinions
// ---------------------------------------------------------------------------

/// One recorded opinion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpinionRecord {
    pub evaluator: EvaluatorRole,
    pub dimension_id: DimensionId,
    pub score: u8,
    pub argument: String,
    /// Evidence locations this opinion relies on.
    #[serde(default)]
    pub cited_locations: Vec<String>,
    #[serde(default)]
    pub security_flag: bool,
}

/// Replays [`OpinionRecord`]s keyed by role and dimension.
#[derive(Debug, Clone, Default)]
pub struct RecordedProducer {
    records: Vec<OpinionRecord>,
}

impl RecordedProducer {
    pub fn new(records: Vec<OpinionRecord>) -> Self {
        Self { records }
    }

    /// Load a JSON array of opinion records.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Self::new(serde_json::from_str(&raw)?))
    }

    pub fn records(&self) -> &[OpinionRecord] {
        &self.records
    }
}

#[async_trait]
impl OpinionProducer for RecordedProducer {
    async fn produce_opinion(
        &self,
        role: EvaluatorRole,
        dimension: &Dimension,
        snapshot: &PipelineState,
    ) -> anyhow::Result<Opinion> {
        let record = self
            .records
            .iter()
            .find(|r| r.evaluator == role && r.dimension_id == dimension.id)
            .ok_or_else(|| anyhow!("no recorded {role} opinion for '{}'", dimension.id))?;

        let available = snapshot.evidence_for(&dimension.id);
        let mut cited = BTreeSet::<EvidenceId>::new();
        for location in &record.cited_locations {
            // Citations to evidence that was not collected this run are dropped.
            cited.extend(
                available
                    .iter()
                    .filter(|e| e.location() == location)
                    .map(EvidenceItem::id),
            );
        }

        let opinion = Opinion::new(role, dimension.id.clone(), record.score, record.argument.clone(), cited)?;
        Ok(if record.security_flag {
            opinion.with_security_flag()
        } else {
            opinion
        })
    }
}
