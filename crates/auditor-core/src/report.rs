//! Report assembly and the persisted report artifact.

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::{CriterionVerdict, DimensionId, Result, SCORE_MIN};
use crate::state::StageErrorRecord;

/// Schema version written into every report artifact.
pub const REPORT_SCHEMA_VERSION: &str = "1.0";

/// Report settings from the rubric's `report` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Dimensions scoring strictly below this need remediation.
    #[serde(default = "default_remediation_threshold")]
    pub remediation_threshold: u8,
}

fn default_remediation_threshold() -> u8 {
    3
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            remediation_threshold: default_remediation_threshold(),
        }
    }
}

impl ReportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.remediation_threshold < SCORE_MIN {
            return Err(crate::domain::AuditError::InvalidConfig(format!(
                "remediation_threshold {} below the minimum score {SCORE_MIN}",
                self.remediation_threshold
            )));
        }
        Ok(())
    }
}

/// Structured audit report handed to renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    /// Mean of the verdicts' final scores; 0.0 when there are none.
    pub overall_score: f64,
    pub verdicts: Vec<CriterionVerdict>,
    /// Dimensions scoring below the remediation threshold, in verdict order.
    pub needs_remediation: Vec<DimensionId>,
    pub errors: Vec<StageErrorRecord>,
    pub inconclusive_count: usize,
    pub dissent_count: usize,
}

impl AuditReport {
    pub fn verdict(&self, dimension_id: &str) -> Option<&CriterionVerdict> {
        self.verdicts.iter().find(|v| v.dimension_id == dimension_id)
    }

    pub fn is_degraded(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Build the report from verdicts and the run's error accumulator. Pure.
pub fn assemble_report(
    verdicts: Vec<CriterionVerdict>,
    errors: Vec<StageErrorRecord>,
    config: &ReportConfig,
) -> AuditReport {
    let overall_score = if verdicts.is_empty() {
        0.0
    } else {
        let sum: u32 = verdicts.iter().map(|v| u32::from(v.final_score)).sum();
        f64::from(sum) / verdicts.len() as f64
    };
    let needs_remediation = verdicts
        .iter()
        .filter(|v| v.final_score < config.remediation_threshold)
        .map(|v| v.dimension_id.clone())
        .collect();
    let inconclusive_count = verdicts.iter().filter(|v| v.inconclusive).count();
    let dissent_count = verdicts.iter().filter(|v| v.dissent).count();

    AuditReport {
        overall_score,
        verdicts,
        needs_remediation,
        errors,
        inconclusive_count,
        dissent_count,
    }
}

/// Persisted form of a report, written as `audit_report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportArtifact {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub run_id: Uuid,
    pub rubric_name: String,
    pub rubric_version: String,
    /// SHA-256 hex over the JSON encoding of `report`.
    pub report_digest: String,
    pub report: AuditReport,
}

impl ReportArtifact {
    pub fn new(
        run_id: Uuid,
        rubric_name: impl Into<String>,
        rubric_version: impl Into<String>,
        report: AuditReport,
    ) -> Result<Self> {
        let report_digest = hex::encode(Sha256::digest(serde_json::to_vec(&report)?));
        Ok(Self {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            run_id,
            rubric_name: rubric_name.into(),
            rubric_version: rubric_version.into(),
            report_digest,
            report,
        })
    }
}

/// Write the report artifact in pretty JSON format.
pub fn write_report_json(path: &Path, artifact: &ReportArtifact) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(artifact).context("serialize report artifact")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}
