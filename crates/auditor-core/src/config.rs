//! Rubric configuration loaded once before a run.
//!
//! A rubric is a JSON document:
//!
//! ```json
//! {
//!   "name": "Week 2 Auditor Rubric",
//!   "version": "1.0",
//!   "dimensions": [ { "id": "...", "name": "...", "guidance": { ... } } ],
//!   "arbitration": { "variance_threshold": 2, ... },
//!   "report": { "remediation_threshold": 3 }
//! }
//! ```
//!
//! Every arbitration key is required. The `report` table may be omitted.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::arbitration::{ArbitrationConfig, ArbitrationTable};
use crate::domain::{validate_dimensions, AuditError, Dimension, Result};
use crate::report::ReportConfig;

/// The full static configuration of an audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub arbitration: ArbitrationTable,
    #[serde(default)]
    pub report: ReportConfig,
}

impl Rubric {
    /// Read and validate a rubric file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Parse and validate a rubric document.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let rubric: Rubric = serde_json::from_str(raw)?;
        rubric.validate()?;
        Ok(rubric)
    }

    /// Check dimensions, arbitration keys and report settings.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AuditError::InvalidConfig(
                "rubric name must not be empty".to_string(),
            ));
        }
        validate_dimensions(&self.dimensions)?;
        self.arbitration_config()?;
        self.report.validate()
    }

    /// The validated arbitration parameters.
    pub fn arbitration_config(&self) -> Result<ArbitrationConfig> {
        ArbitrationConfig::try_from(&self.arbitration)
    }

    pub fn dimension(&self, id: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.id == id)
    }

    /// Distinct `target_artifact` values, in first-seen order.
    pub fn target_artifacts(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for d in &self.dimensions {
            if !d.target_artifact.is_empty() && !out.contains(&d.target_artifact.as_str()) {
                out.push(&d.target_artifact);
            }
        }
        out
    }
}
