//! Arbitration engine: turns the opinions on each dimension into a verdict.

pub mod config;
pub mod engine;

pub use config::{ArbitrationConfig, ArbitrationTable};
pub use engine::{
    arbitrate, arbitrate_dimension, verdict_digest, DISSENT_EXCERPT_CHARS, DISSENT_SEPARATOR,
    MISSING_REMEDIATION,
};
