//! Scoring engine
//!
//! Deterministic weighted scoring of conversion-messaging health. Pure
//! functions only: the same inputs always reproduce the same scores, so a
//! stored report can be audited against its own breakdown. The model is
//! versioned; stored reports carry the version they were scored with.

use serde::{Deserialize, Serialize};

/// Version tag stamped on every report scored with the canonical model
pub const CANONICAL_SCORING_MODEL_VERSION: &str = "canonical-v2";

/// Threat/risk bucket derived from a 0-100 signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Bucket a 0-100 signal: >=70 high, >=40 medium, else low
    pub fn from_signal(signal: i32) -> Self {
        if signal >= 70 {
            RiskLevel::High
        } else if signal >= 40 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// Weighted scoring model.
///
/// Always constructed through [`ScoringModel::canonical`]; the version tag
/// travels with the weights so multiple model versions can coexist in
/// stored reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringModel {
    pub version: String,
    pub clarity_weight: f64,
    pub differentiation_weight: f64,
    pub objection_weight: f64,
    pub overlap_weight: f64,
    pub pricing_weight: f64,
}

impl ScoringModel {
    /// The canonical weighted model
    pub fn canonical() -> Self {
        Self {
            version: CANONICAL_SCORING_MODEL_VERSION.to_string(),
            clarity_weight: 0.24,
            differentiation_weight: 0.24,
            objection_weight: 0.20,
            overlap_weight: 0.16,
            pricing_weight: 0.16,
        }
    }
}

/// Inputs to the scorer, derived by the aggregator from module outputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreInputs {
    pub clarity: i32,
    pub differentiation: i32,
    pub objection_coverage: i32,
    /// Mean of per-competitor overlap percentages; 0 when no competitors
    pub overlap_average: f64,
    pub pricing: i32,
    /// Modeled dollars exposed; feeds the revenue risk signal
    pub pipeline_at_risk: i64,
}

/// Full scoring output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub gap_score: u8,
    pub revenue_risk_level: RiskLevel,
    pub competitive_threat_level: RiskLevel,
    pub overall_threat_level: RiskLevel,
    pub scoring_model_version: String,
    pub breakdown: ScoringBreakdown,
}

/// Every term that went into the score, clamped as used.
///
/// Threat levels must be re-derivable from this breakdown alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringBreakdown {
    pub clarity: u8,
    pub differentiation: u8,
    pub objection_coverage: u8,
    pub overlap_average: u8,
    pub inverted_overlap: u8,
    pub pricing: u8,
    pub gap_score: u8,
    pub pipeline_risk_signal: u8,
    pub revenue_risk_signal: u8,
    pub competitive_threat_signal: u8,
}

fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

fn round_clamped(value: f64) -> u8 {
    clamp_unit(value.round()) as u8
}

/// Weighted gap score on its own; used by the aggregator to derive funnel
/// risk before revenue figures exist
pub fn gap_score(inputs: &ScoreInputs, model: &ScoringModel) -> u8 {
    let clarity = clamp_unit(f64::from(inputs.clarity));
    let differentiation = clamp_unit(f64::from(inputs.differentiation));
    let objection = clamp_unit(f64::from(inputs.objection_coverage));
    let inverted_overlap = clamp_unit(100.0 - clamp_unit(inputs.overlap_average));
    let pricing = clamp_unit(f64::from(inputs.pricing));

    let weighted = clarity * model.clarity_weight
        + differentiation * model.differentiation_weight
        + objection * model.objection_weight
        + inverted_overlap * model.overlap_weight
        + pricing * model.pricing_weight;

    round_clamped(weighted)
}

/// Score a report's signals with the given model.
///
/// Pure and deterministic; no hidden state, no I/O.
pub fn calculate_score(inputs: &ScoreInputs, model: &ScoringModel) -> ScoreOutcome {
    let gap = gap_score(inputs, model);

    let pipeline_risk_signal = if inputs.pipeline_at_risk > 0 {
        clamp_unit(inputs.pipeline_at_risk as f64 / 10_000.0)
    } else {
        0.0
    };

    let revenue_risk_signal =
        round_clamped(f64::from(100 - i32::from(gap)) * 0.8 + pipeline_risk_signal * 0.2);

    let differentiation_health = clamp_unit(f64::from(inputs.differentiation));
    let overlap_average = clamp_unit(inputs.overlap_average);
    let competitive_threat_signal =
        round_clamped(overlap_average * 0.6 + (100.0 - differentiation_health) * 0.4);

    let revenue_risk_level = RiskLevel::from_signal(i32::from(revenue_risk_signal));
    let competitive_threat_level = RiskLevel::from_signal(i32::from(competitive_threat_signal));
    let overall_threat_level = revenue_risk_level.max(competitive_threat_level);

    ScoreOutcome {
        gap_score: gap,
        revenue_risk_level,
        competitive_threat_level,
        overall_threat_level,
        scoring_model_version: model.version.clone(),
        breakdown: ScoringBreakdown {
            clarity: round_clamped(f64::from(inputs.clarity)),
            differentiation: round_clamped(f64::from(inputs.differentiation)),
            objection_coverage: round_clamped(f64::from(inputs.objection_coverage)),
            overlap_average: round_clamped(overlap_average),
            inverted_overlap: round_clamped(100.0 - overlap_average),
            pricing: round_clamped(f64::from(inputs.pricing)),
            gap_score: gap,
            pipeline_risk_signal: round_clamped(pipeline_risk_signal),
            revenue_risk_signal,
            competitive_threat_signal,
        },
    }
}

/// Mean of per-competitor overlap percentages, each clamped to [0,100]
pub fn overlap_average(overlaps: &[u8]) -> f64 {
    if overlaps.is_empty() {
        return 0.0;
    }
    let sum: f64 = overlaps
        .iter()
        .map(|&o| clamp_unit(f64::from(o)))
        .sum();
    sum / overlaps.len() as f64
}
