//! Per-dimension verdicts produced by the arbitration engine.

use serde::{Deserialize, Serialize};

use crate::domain::dimension::DimensionId;
use crate::domain::opinion::Opinion;

/// Which arbitration rule decided a verdict's final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionRule {
    SecurityOverride,
    InsufficientOpinions,
    FactSupremacy,
    TieBreak,
    DefaultMean,
}

impl ResolutionRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionRule::SecurityOverride => "security_override",
            ResolutionRule::InsufficientOpinions => "insufficient_opinions",
            ResolutionRule::FactSupremacy => "fact_supremacy",
            ResolutionRule::TieBreak => "tie_break",
            ResolutionRule::DefaultMean => "default_mean",
        }
    }
}

impl std::fmt::Display for ResolutionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The final, immutable outcome for one dimension.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CriterionVerdict {
    pub dimension_id: DimensionId,
    pub dimension_name: String,
    pub final_score: u8,
    /// Opinions spread beyond the variance threshold.
    pub dissent: bool,
    /// Too few opinions were available to judge the dimension.
    pub inconclusive: bool,
    pub resolution_rule: ResolutionRule,
    /// Fixed explanation of how the rule resolved the score.
    pub rationale: String,
    /// Role, score and argument excerpt per opinion; present when `dissent`.
    pub dissent_summary: Option<String>,
    /// Remediation advice taken from the tie-break role's argument.
    pub remediation: String,
    /// Contributing opinions in canonical order.
    pub opinions: Vec<Opinion>,
}
