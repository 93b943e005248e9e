//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::time::Duration;

use auditor_core::{
    ArbitrationTable, Dimension, EvaluatorRole, ExecutorConfig, ReportConfig, Rubric,
};

/// A dimension with guidance for every role.
pub fn dimension(id: &str, artifact: &str) -> Dimension {
    Dimension {
        id: id.to_string(),
        name: format!("Dimension {id}"),
        target_artifact: artifact.to_string(),
        evidence_instruction: format!("collect facts for {id}"),
        guidance: EvaluatorRole::ALL
            .into_iter()
            .map(|r| (r, format!("{r} lens on {id}")))
            .collect(),
    }
}

/// Arbitration keys used throughout: threshold 2, cap 3, two opinions
/// minimum, prosecutor grounded, defense intent, tech lead tie-break.
pub fn arbitration() -> ArbitrationTable {
    ArbitrationTable {
        variance_threshold: Some(2),
        security_cap: Some(3),
        min_opinions: Some(2),
        evidence_grounded_role: Some(EvaluatorRole::Prosecutor),
        intent_weighted_role: Some(EvaluatorRole::Defense),
        tie_break_role: Some(EvaluatorRole::TechLead),
    }
}

pub fn rubric(dimensions: Vec<Dimension>) -> Rubric {
    Rubric {
        name: "integration".to_string(),
        version: "1.0".to_string(),
        dimensions,
        arbitration: arbitration(),
        report: ReportConfig::default(),
    }
}

/// Short timeouts and no backoff so failure paths finish quickly.
pub fn fast_config() -> ExecutorConfig {
    ExecutorConfig {
        max_attempts: 3,
        stage_timeout: Duration::from_millis(500),
        retry_backoff: Duration::ZERO,
        max_concurrent: 8,
    }
}
