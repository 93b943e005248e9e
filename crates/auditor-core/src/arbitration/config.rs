//! Arbitration parameters.
//!
//! The rubric carries a raw [`ArbitrationTable`] where every key is optional so
//! that a missing key surfaces as a named configuration error instead of a
//! generic parse failure. [`ArbitrationConfig`] is the validated form the
//! engine consumes.

use serde::{Deserialize, Serialize};

use crate::domain::{AuditError, EvaluatorRole, Result, SCORE_MAX, SCORE_MIN};

/// Arbitration keys as written in the rubric file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArbitrationTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variance_threshold: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_cap: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_opinions: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_grounded_role: Option<EvaluatorRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_weighted_role: Option<EvaluatorRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tie_break_role: Option<EvaluatorRole>,
}

/// Validated arbitration parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbitrationConfig {
    /// Score spread above which opinions count as dissenting.
    pub variance_threshold: u8,
    /// Ceiling applied when a security deficiency is flagged.
    pub security_cap: u8,
    /// Fewer valid opinions than this makes a verdict inconclusive.
    pub min_opinions: usize,
    /// Role whose score wins a fact-versus-intent conflict.
    pub evidence_grounded_role: EvaluatorRole,
    /// Role whose score is set against the evidence-grounded one.
    pub intent_weighted_role: EvaluatorRole,
    /// Role whose score settles a high-variance dimension.
    pub tie_break_role: EvaluatorRole,
}

impl ArbitrationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(SCORE_MIN..=SCORE_MAX).contains(&self.security_cap) {
            return Err(AuditError::InvalidConfig(format!(
                "security_cap {} outside {SCORE_MIN}..={SCORE_MAX}",
                self.security_cap
            )));
        }
        if self.variance_threshold >= SCORE_MAX - SCORE_MIN + 1 {
            return Err(AuditError::InvalidConfig(format!(
                "variance_threshold {} can never be exceeded",
                self.variance_threshold
            )));
        }
        if self.min_opinions == 0 {
            return Err(AuditError::InvalidConfig(
                "min_opinions must be at least 1".to_string(),
            ));
        }
        if self.min_opinions > EvaluatorRole::ALL.len() {
            return Err(AuditError::InvalidConfig(format!(
                "min_opinions {} exceeds the number of roles ({})",
                self.min_opinions,
                EvaluatorRole::ALL.len()
            )));
        }
        if self.evidence_grounded_role == self.intent_weighted_role {
            return Err(AuditError::InvalidConfig(
                "evidence_grounded_role and intent_weighted_role must differ".to_string(),
            ));
        }
        Ok(())
    }
}

fn require<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| AuditError::MissingConfigField {
        field: format!("arbitration.{field}"),
    })
}

impl TryFrom<&ArbitrationTable> for ArbitrationConfig {
    type Error = AuditError;

    fn try_from(table: &ArbitrationTable) -> Result<Self> {
        let config = ArbitrationConfig {
            variance_threshold: require(table.variance_threshold, "variance_threshold")?,
            security_cap: require(table.security_cap, "security_cap")?,
            min_opinions: require(table.min_opinions, "min_opinions")?,
            evidence_grounded_role: require(
                table.evidence_grounded_role,
                "evidence_grounded_role",
            )?,
            intent_weighted_role: require(table.intent_weighted_role, "intent_weighted_role")?,
            tie_break_role: require(table.tie_break_role, "tie_break_role")?,
        };
        config.validate()?;
        Ok(config)
    }
}
