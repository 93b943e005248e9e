//! Domain-level error taxonomy for the auditor.
//!
//! Only configuration and contract violations surface as [`AuditError`].
//! Stage failures are data and live in the state's error accumulator.

/// Auditor domain errors.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("arbitration configuration missing required field: {field}")]
    MissingConfigField { field: String },

    #[error("invalid pipeline graph: {0}")]
    InvalidGraph(String),

    #[error("invalid evidence: {0}")]
    InvalidEvidence(String),

    #[error("invalid opinion from {evaluator} on {dimension_id}: {reason}")]
    InvalidOpinion {
        evaluator: String,
        dimension_id: String,
        reason: String,
    },

    #[error("opinion references unknown dimension: {dimension_id}")]
    UnknownDimension { dimension_id: String },

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuditError {
    /// Whether this error indicates a broken static configuration rather
    /// than a broken stage contract.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AuditError::InvalidConfig(_)
                | AuditError::MissingConfigField { .. }
                | AuditError::InvalidGraph(_)
        )
    }
}

/// Result type for auditor domain operations.
pub type Result<T> = std::result::Result<T, AuditError>;
