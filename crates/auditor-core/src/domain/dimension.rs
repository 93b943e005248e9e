//! Static evaluation dimensions, loaded before a run and read-only afterwards.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::error::{AuditError, Result};
use crate::domain::role::EvaluatorRole;

/// Identifier of one independently scored axis of evaluation.
pub type DimensionId = String;

/// One rubric dimension.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dimension {
    pub id: DimensionId,
    /// Human-readable name.
    pub name: String,
    /// Artifact family whose collectors produce evidence for this dimension
    /// (e.g. `github_repo`, `pdf_report`).
    #[serde(default)]
    pub target_artifact: String,
    /// What collectors should look for.
    #[serde(default)]
    pub evidence_instruction: String,
    /// Per-role evaluation guidance. Must cover every [`EvaluatorRole`].
    pub guidance: BTreeMap<EvaluatorRole, String>,
}

impl Dimension {
    /// Guidance text for `role`, empty when absent.
    pub fn guidance_for(&self, role: EvaluatorRole) -> &str {
        self.guidance.get(&role).map(String::as_str).unwrap_or("")
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(AuditError::InvalidConfig(
                "dimension id must not be empty".to_string(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(AuditError::InvalidConfig(format!(
                "dimension '{}' has an empty name",
                self.id
            )));
        }
        for role in EvaluatorRole::ALL {
            match self.guidance.get(&role) {
                Some(text) if !text.trim().is_empty() => {}
                _ => {
                    return Err(AuditError::InvalidConfig(format!(
                        "dimension '{}' has no guidance for role {}",
                        self.id, role
                    )))
                }
            }
        }
        Ok(())
    }
}

/// Validate a dimension configuration: non-empty, unique ids, full guidance.
pub fn validate_dimensions(dimensions: &[Dimension]) -> Result<()> {
    if dimensions.is_empty() {
        return Err(AuditError::InvalidConfig(
            "at least one dimension must be configured".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for dim in dimensions {
        dim.validate()?;
        if !seen.insert(dim.id.as_str()) {
            return Err(AuditError::InvalidConfig(format!(
                "duplicate dimension id '{}'",
                dim.id
            )));
        }
    }
    Ok(())
}
