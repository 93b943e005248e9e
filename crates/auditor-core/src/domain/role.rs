//! Evaluator role vocabulary.

use serde::{Deserialize, Serialize};

/// The closed set of evaluator personas that score every dimension.
///
/// Role-specific behaviour (prompting, model choice) lives behind
/// [`crate::stage::OpinionProducer`]; the engine only dispatches on the role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluatorRole {
    /// Adversarial lens: looks for gaps, flaws and security deficiencies.
    Prosecutor,
    /// Charitable lens: rewards intent and effort.
    Defense,
    /// Pragmatic lens: architecture, maintainability, practical viability.
    TechLead,
}

impl EvaluatorRole {
    /// Every role in canonical order.
    pub const ALL: [EvaluatorRole; 3] = [
        EvaluatorRole::Prosecutor,
        EvaluatorRole::Defense,
        EvaluatorRole::TechLead,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluatorRole::Prosecutor => "prosecutor",
            EvaluatorRole::Defense => "defense",
            EvaluatorRole::TechLead => "tech_lead",
        }
    }

    /// Parse the wire name of a role.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == s)
    }
}

impl std::fmt::Display for EvaluatorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
