//! Evidence records produced by collection stages.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::dimension::DimensionId;
use crate::domain::error::{AuditError, Result};

/// Process-unique identifier of an [`EvidenceItem`], cited by opinions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceId(pub Uuid);

impl EvidenceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EvidenceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EvidenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An objective fact gathered for one dimension.
///
/// Fields are private; build through [`EvidenceItem::new`] so that every
/// item in the state has passed validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceItem {
    id: EvidenceId,
    dimension_id: DimensionId,
    found: bool,
    content: Option<String>,
    location: String,
    rationale: String,
    confidence: f64,
}

impl EvidenceItem {
    /// Create and validate an evidence item with a fresh id.
    pub fn new(
        dimension_id: impl Into<DimensionId>,
        found: bool,
        content: Option<String>,
        location: impl Into<String>,
        rationale: impl Into<String>,
        confidence: f64,
    ) -> Result<Self> {
        let item = Self {
            id: EvidenceId::new(),
            dimension_id: dimension_id.into(),
            found,
            content,
            location: location.into(),
            rationale: rationale.into(),
            confidence,
        };
        item.validate()?;
        Ok(item)
    }

    /// Check the structural invariants. Used again on deserialized items.
    pub fn validate(&self) -> Result<()> {
        if self.dimension_id.trim().is_empty() {
            return Err(AuditError::InvalidEvidence(
                "dimension_id must not be empty".to_string(),
            ));
        }
        if self.location.trim().is_empty() {
            return Err(AuditError::InvalidEvidence(format!(
                "evidence {} has no location",
                self.id
            )));
        }
        if self.rationale.trim().is_empty() {
            return Err(AuditError::InvalidEvidence(format!(
                "evidence {} has no rationale",
                self.id
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(AuditError::InvalidEvidence(format!(
                "evidence {} confidence {} outside [0, 1]",
                self.id, self.confidence
            )));
        }
        Ok(())
    }

    pub fn id(&self) -> EvidenceId {
        self.id
    }

    pub fn dimension_id(&self) -> &str {
        &self.dimension_id
    }

    pub fn found(&self) -> bool {
        self.found
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }
}
