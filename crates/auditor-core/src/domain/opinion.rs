//! Scored opinions rendered by evaluator roles.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::dimension::{Dimension, DimensionId};
use crate::domain::error::{AuditError, Result};
use crate::domain::evidence::EvidenceId;
use crate::domain::role::EvaluatorRole;

/// Lowest score an opinion may carry.
pub const SCORE_MIN: u8 = 1;
/// Highest score an opinion may carry.
pub const SCORE_MAX: u8 = 5;
/// Minimum number of characters in an opinion's argument.
pub const MIN_ARGUMENT_CHARS: usize = 50;

/// Process-unique identifier of an [`Opinion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpinionId(pub Uuid);

impl OpinionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OpinionId {
    fn default() -> Self {
        Self::new()
    }
}

/// An interpretive, scored judgement of one dimension by one role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Opinion {
    id: OpinionId,
    evaluator: EvaluatorRole,
    dimension_id: DimensionId,
    score: u8,
    argument: String,
    #[serde(default)]
    cited_evidence: BTreeSet<EvidenceId>,
    /// Set by the producer when the argument reports a confirmed security
    /// deficiency. Arbitration reads this flag, never the argument text.
    #[serde(default)]
    security_flag: bool,
}

impl Opinion {
    /// Create an opinion with a fresh id, checking the local invariants
    /// (score range, argument length).
    pub fn new(
        evaluator: EvaluatorRole,
        dimension_id: impl Into<DimensionId>,
        score: u8,
        argument: impl Into<String>,
        cited_evidence: impl IntoIterator<Item = EvidenceId>,
    ) -> Result<Self> {
        let opinion = Self {
            id: OpinionId::new(),
            evaluator,
            dimension_id: dimension_id.into(),
            score,
            argument: argument.into(),
            cited_evidence: cited_evidence.into_iter().collect(),
            security_flag: false,
        };
        opinion.validate_shape()?;
        Ok(opinion)
    }

    /// Mark this opinion as reporting a security deficiency.
    pub fn with_security_flag(mut self) -> Self {
        self.security_flag = true;
        self
    }

    fn invalid(&self, reason: String) -> AuditError {
        AuditError::InvalidOpinion {
            evaluator: self.evaluator.to_string(),
            dimension_id: self.dimension_id.clone(),
            reason,
        }
    }

    /// Score range and argument length.
    pub fn validate_shape(&self) -> Result<()> {
        if !(SCORE_MIN..=SCORE_MAX).contains(&self.score) {
            return Err(self.invalid(format!(
                "score {} outside [{SCORE_MIN}, {SCORE_MAX}]",
                self.score
            )));
        }
        let chars = self.argument.trim().chars().count();
        if chars < MIN_ARGUMENT_CHARS {
            return Err(self.invalid(format!(
                "argument has {chars} characters, minimum is {MIN_ARGUMENT_CHARS}"
            )));
        }
        Ok(())
    }

    /// Full contract check before an opinion is accepted into the state:
    /// shape, configured dimension, and citations that resolve to evidence
    /// present in the snapshot the producer saw.
    pub fn validate(
        &self,
        dimensions: &[Dimension],
        known_evidence: &HashSet<EvidenceId>,
    ) -> Result<()> {
        self.validate_shape()?;
        if !dimensions.iter().any(|d| d.id == self.dimension_id) {
            return Err(AuditError::UnknownDimension {
                dimension_id: self.dimension_id.clone(),
            });
        }
        if let Some(missing) = self
            .cited_evidence
            .iter()
            .find(|id| !known_evidence.contains(id))
        {
            return Err(self.invalid(format!("cites unknown evidence {missing}")));
        }
        Ok(())
    }

    pub fn id(&self) -> OpinionId {
        self.id
    }

    pub fn evaluator(&self) -> EvaluatorRole {
        self.evaluator
    }

    pub fn dimension_id(&self) -> &str {
        &self.dimension_id
    }

    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn argument(&self) -> &str {
        &self.argument
    }

    pub fn cited_evidence(&self) -> &BTreeSet<EvidenceId> {
        &self.cited_evidence
    }

    pub fn security_flag(&self) -> bool {
        self.security_flag
    }
}
