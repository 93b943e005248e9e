//! Core domain vocabulary: dimensions, evidence, opinions, verdicts, errors.

pub mod dimension;
pub mod error;
pub mod evidence;
pub mod inputs;
pub mod opinion;
pub mod role;
pub mod verdict;

pub use dimension::{validate_dimensions, Dimension, DimensionId};
pub use error::{AuditError, Result};
pub use evidence::{EvidenceId, EvidenceItem};
pub use inputs::RunInputs;
pub use opinion::{Opinion, OpinionId, MIN_ARGUMENT_CHARS, SCORE_MAX, SCORE_MIN};
pub use role::EvaluatorRole;
pub use verdict::{CriterionVerdict, ResolutionRule};
