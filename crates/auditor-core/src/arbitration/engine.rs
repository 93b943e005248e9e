//! Deterministic per-dimension conflict resolution.
//!
//! Pure functions only: the same configuration, dimensions and opinions always
//! produce byte-identical verdicts. The engine never reads argument text to
//! decide a score.

use sha2::{Digest, Sha256};

use crate::arbitration::config::ArbitrationConfig;
use crate::domain::{
    AuditError, CriterionVerdict, Dimension, EvaluatorRole, Opinion, ResolutionRule, Result,
    SCORE_MAX, SCORE_MIN,
};
use crate::state::sort_opinions;

/// Characters of each argument quoted in a dissent summary.
pub const DISSENT_EXCERPT_CHARS: usize = 150;

/// Separator between entries of a dissent summary.
pub const DISSENT_SEPARATOR: &str = " | ";

/// Remediation text used when the tie-break role gave no opinion.
pub const MISSING_REMEDIATION: &str =
    "No tie-break opinion was produced for this dimension; re-run the audit to obtain remediation guidance.";

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Produce one verdict per configured dimension, in configuration order.
///
/// Dimensions with no opinions still get a verdict (inconclusive). An opinion
/// naming a dimension that is not configured is a fatal contract violation.
pub fn arbitrate(
    config: &ArbitrationConfig,
    dimensions: &[Dimension],
    opinions: &[Opinion],
) -> Result<Vec<CriterionVerdict>> {
    if let Some(stray) = opinions
        .iter()
        .find(|o| !dimensions.iter().any(|d| d.id == o.dimension_id()))
    {
        return Err(AuditError::UnknownDimension {
            dimension_id: stray.dimension_id().to_string(),
        });
    }

    Ok(dimensions
        .iter()
        .map(|dimension| {
            let subset: Vec<Opinion> = opinions
                .iter()
                .filter(|o| o.dimension_id() == dimension.id)
                .cloned()
                .collect();
            arbitrate_dimension(config, dimension, &subset)
        })
        .collect())
}

/// Resolve one dimension. Opinions for other dimensions are ignored.
pub fn arbitrate_dimension(
    config: &ArbitrationConfig,
    dimension: &Dimension,
    opinions: &[Opinion],
) -> CriterionVerdict {
    let mut opinions: Vec<Opinion> = opinions
        .iter()
        .filter(|o| o.dimension_id() == dimension.id)
        .cloned()
        .collect();
    sort_opinions(&mut opinions);

    let spread = spread(&opinions);
    let dissent = !opinions.is_empty() && spread > config.variance_threshold;

    let (mut final_score, mut rule, inconclusive) = resolve_base(config, &opinions, spread);
    if opinions.iter().any(Opinion::security_flag) {
        final_score = final_score.min(config.security_cap);
        rule = ResolutionRule::SecurityOverride;
    }

    CriterionVerdict {
        dimension_id: dimension.id.clone(),
        dimension_name: dimension.name.clone(),
        final_score,
        dissent,
        inconclusive,
        resolution_rule: rule,
        rationale: rationale_for(rule).to_string(),
        dissent_summary: dissent.then(|| dissent_summary(&opinions)),
        remediation: remediation(config, &opinions),
        opinions,
    }
}

/// SHA-256 hex digest over the JSON encoding of a verdict list.
pub fn verdict_digest(verdicts: &[CriterionVerdict]) -> Result<String> {
    let bytes = serde_json::to_vec(verdicts)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Rules 2 to 5 in priority order. Returns the score, the deciding rule and
/// whether the verdict is inconclusive.
fn resolve_base(
    config: &ArbitrationConfig,
    opinions: &[Opinion],
    spread: u8,
) -> (u8, ResolutionRule, bool) {
    if opinions.len() < config.min_opinions || opinions.is_empty() {
        return (SCORE_MIN, ResolutionRule::InsufficientOpinions, true);
    }

    let grounded = score_of(opinions, config.evidence_grounded_role);
    let intent = score_of(opinions, config.intent_weighted_role);
    if let (Some(grounded), Some(intent)) = (grounded, intent) {
        if grounded.abs_diff(intent) > config.variance_threshold {
            return (grounded, ResolutionRule::FactSupremacy, false);
        }
    }

    if spread > config.variance_threshold {
        if let Some(tie_break) = score_of(opinions, config.tie_break_role) {
            return (tie_break, ResolutionRule::TieBreak, false);
        }
    }

    (mean_half_up(opinions), ResolutionRule::DefaultMean, false)
}

fn rationale_for(rule: ResolutionRule) -> &'static str {
    match rule {
        ResolutionRule::SecurityOverride => {
            "A confirmed security deficiency caps the score regardless of other opinions."
        }
        ResolutionRule::InsufficientOpinions => {
            "Too few valid opinions were produced; the dimension is scored at the lower bound and marked inconclusive."
        }
        ResolutionRule::FactSupremacy => {
            "Evidence-grounded assessment overrides the intent-weighted assessment where they conflict."
        }
        ResolutionRule::TieBreak => {
            "Opinions diverge beyond the variance threshold; the tie-break assessment decides."
        }
        ResolutionRule::DefaultMean => "Opinions agree within the variance threshold; the mean score is adopted.",
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn score_of(opinions: &[Opinion], role: EvaluatorRole) -> Option<u8> {
    opinions
        .iter()
        .find(|o| o.evaluator() == role)
        .map(Opinion::score)
}

fn spread(opinions: &[Opinion]) -> u8 {
    let max = opinions.iter().map(Opinion::score).max();
    let min = opinions.iter().map(Opinion::score).min();
    match (max, min) {
        (Some(max), Some(min)) => max - min,
        _ => 0,
    }
}

/// Arithmetic mean rounded half-up, computed on integers.
fn mean_half_up(opinions: &[Opinion]) -> u8 {
    let n = opinions.len() as u32;
    let sum: u32 = opinions.iter().map(|o| u32::from(o.score())).sum();
    let mean = (2 * sum + n) / (2 * n);
    mean.clamp(u32::from(SCORE_MIN), u32::from(SCORE_MAX)) as u8
}

fn dissent_summary(opinions: &[Opinion]) -> String {
    opinions
        .iter()
        .map(|o| {
            let excerpt: String = o.argument().chars().take(DISSENT_EXCERPT_CHARS).collect();
            format!("{} ({}/{}): {}", o.evaluator(), o.score(), SCORE_MAX, excerpt)
        })
        .collect::<Vec<_>>()
        .join(DISSENT_SEPARATOR)
}

fn remediation(config: &ArbitrationConfig, opinions: &[Opinion]) -> String {
    opinions
        .iter()
        .find(|o| o.evaluator() == config.tie_break_role)
        .map(|o| o.argument().to_string())
        .unwrap_or_else(|| MISSING_REMEDIATION.to_string())
}
