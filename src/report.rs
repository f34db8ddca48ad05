//! Canonical report types and the aggregator
//!
//! The aggregator is the single write path for the report's derived
//! numeric fields: it turns module outputs into score signals, runs the
//! scoring engine and revenue model, and assembles the immutable canonical
//! report. No other component sets scores.

use crate::analyzer::CompetitorInsight;
use crate::error::{ReportError, Result};
use crate::extractor::SiteContent;
use crate::llm::TokenUsage;
use crate::prompts::{
    CounterPositioning, DifferentiationPlan, GapAnalysisOutput, HeroRewrite, ObjectionPlan,
    OverlapItem, PricingRewrite,
};
use crate::revenue::{model_revenue_impact, RevenueImpact, RevenueInputs, RevenueProjection};
use crate::scoring::{
    calculate_score, gap_score, overlap_average, RiskLevel, ScoreInputs, ScoringBreakdown,
    ScoringModel,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Submission-time profile for the analyzed company
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportProfile {
    pub company: Option<String>,
    pub homepage_url: String,
    pub segment: Option<String>,
    /// Opportunities per period the funnel feeds (deal-model assumption)
    pub traffic_baseline: i64,
    /// Currency-agnostic average deal value (deal-model assumption)
    pub average_deal_size: i64,
}

/// Default deal-model assumptions applied when the submission omits them
pub const DEFAULT_TRAFFIC_BASELINE: i64 = 500;
pub const DEFAULT_AVERAGE_DEAL_SIZE: i64 = 8_000;

/// Outputs of the five generation modules, bundled for the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteBundle {
    pub hero: HeroRewrite,
    pub pricing: PricingRewrite,
    pub objections: ObjectionPlan,
    pub differentiation: DifferentiationPlan,
    pub counters: CounterPositioning,
}

/// Everything the aggregator needs to build a report
#[derive(Debug, Clone)]
pub struct BuildReportInput {
    pub profile: ReportProfile,
    pub content: SiteContent,
    pub competitors: Vec<CompetitorInsight>,
    pub gap_analysis: GapAnalysisOutput,
    pub rewrites: RewriteBundle,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectionCoverage {
    pub score: u8,
    pub dimension_scores: BTreeMap<String, u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingOverlap {
    pub items: Vec<OverlapItem>,
}

/// Tier labels for prioritized issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueTier {
    P0,
    P1,
    P2,
}

impl IssueTier {
    /// Pure function of the priority score: >=70 p0, >=40 p1, else p2
    pub fn from_priority(priority_score: u8) -> Self {
        if priority_score >= 70 {
            IssueTier::P0
        } else if priority_score >= 40 {
            IssueTier::P1
        } else {
            IssueTier::P2
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityIssue {
    pub issue: String,
    pub impact_score: u8,
    pub effort_estimate: String,
    pub priority_score: u8,
    pub tier: IssueTier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitiveMatrixRow {
    pub competitor: String,
    pub positioning: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub counter: Option<String>,
}

/// The finished, immutable report artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionGapReport {
    pub id: Uuid,
    pub company: String,
    pub website_url: String,
    pub segment: String,
    pub conversion_score: u8,
    pub funnel_risk: u8,
    pub differentiation_score: u8,
    pub pricing_score: u8,
    pub clarity_score: u8,
    pub confidence_score: u8,
    pub win_rate_delta: i32,
    pub threat_level: RiskLevel,
    pub pipeline_at_risk: i64,
    pub revenue_projection: RevenueProjection,
    pub objection_coverage: ObjectionCoverage,
    pub messaging_overlap: MessagingOverlap,
    pub priority_issues: Vec<PriorityIssue>,
    pub competitive_matrix: Vec<CompetitiveMatrixRow>,
    pub rewrites: RewriteBundle,
    pub scoring_breakdown: ScoringBreakdown,
    pub scoring_model_version: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub token_usage: TokenUsage,
}

// Objection dimensions checked against the missing-objection list. A
// dimension mentioned by any missing objection scores weak.
const OBJECTION_DIMENSIONS: [(&str, &[&str]); 5] = [
    ("pricing", &["price", "cost", "budget", "expensive"]),
    ("trust", &["trust", "proof", "case stud", "review", "social"]),
    ("security", &["security", "complian", "privacy", "data"]),
    ("switching", &["switch", "migrat", "onboard", "implementation"]),
    ("roi", &["roi", "value", "return", "payback"]),
];

const DIMENSION_WEAK_SCORE: u8 = 35;
const DIMENSION_COVERED_SCORE: u8 = 100;

/// Build the canonical report from module outputs.
///
/// Called exactly once per job when it reaches the finalizing stage; the
/// result is persisted and never mutated.
pub fn build_report(input: BuildReportInput) -> Result<ConversionGapReport> {
    let company = resolve_company(&input.profile)?;
    let segment = input
        .profile
        .segment
        .clone()
        .unwrap_or_else(|| "B2B SaaS".to_string());

    let model = ScoringModel::canonical();
    let signals = derive_score_inputs(&input.gap_analysis);

    // Funnel risk and the revenue model need the gap score first; the full
    // score pass afterwards folds pipeline exposure back into risk levels.
    let preliminary_inputs = ScoreInputs {
        pipeline_at_risk: 0,
        ..signals.clone()
    };
    let gap = gap_score(&preliminary_inputs, &model);
    let funnel_risk = 100 - gap;
    let win_rate_delta = (f64::from(100 - gap) * 0.25).round() as i32;

    let revenue: RevenueImpact = model_revenue_impact(&RevenueInputs {
        win_rate_delta,
        funnel_risk: i32::from(funnel_risk),
        traffic_baseline: input.profile.traffic_baseline,
        average_deal_size: input.profile.average_deal_size,
    });

    let outcome = calculate_score(
        &ScoreInputs {
            pipeline_at_risk: revenue.pipeline_at_risk,
            ..signals
        },
        &model,
    );

    let priority_issues = derive_priority_issues(&input.gap_analysis);
    let competitive_matrix = derive_competitive_matrix(&input.competitors, &input.rewrites);
    let objection_coverage = derive_objection_coverage(&input.gap_analysis);
    let confidence_score = derive_confidence(&input);

    Ok(ConversionGapReport {
        id: Uuid::new_v4(),
        company,
        website_url: input.profile.homepage_url.clone(),
        segment,
        conversion_score: outcome.gap_score,
        funnel_risk,
        differentiation_score: outcome.breakdown.differentiation,
        pricing_score: outcome.breakdown.pricing,
        clarity_score: outcome.breakdown.clarity,
        confidence_score,
        win_rate_delta,
        threat_level: outcome.overall_threat_level,
        pipeline_at_risk: revenue.pipeline_at_risk,
        revenue_projection: revenue.revenue_projection,
        objection_coverage,
        messaging_overlap: MessagingOverlap {
            items: input.gap_analysis.messaging_overlap.clone(),
        },
        priority_issues,
        competitive_matrix,
        rewrites: input.rewrites,
        scoring_breakdown: outcome.breakdown,
        scoring_model_version: outcome.scoring_model_version,
        status: "completed".to_string(),
        created_at: Utc::now(),
        token_usage: input.usage,
    })
}

/// Company name from explicit input, else the homepage hostname
fn resolve_company(profile: &ReportProfile) -> Result<String> {
    if let Some(company) = &profile.company {
        let trimmed = company.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }

    url::Url::parse(&profile.homepage_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .filter(|h| !h.is_empty())
        .ok_or(ReportError::CompanyResolutionFailed)
}

/// Derive score signals from gap-analysis output.
///
/// Counts are converted to scores deterministically: every detected issue
/// subtracts a fixed amount from a 100 baseline, clamped at the scorer.
pub fn derive_score_inputs(gap_analysis: &GapAnalysisOutput) -> ScoreInputs {
    let clarity = 100 - 9 * gap_analysis.gaps.len() as i32;
    let differentiation = 100 - 12 * gap_analysis.differentiation_gaps.len() as i32;
    let pricing = 100 - 15 * gap_analysis.pricing_clarity_issues.len() as i32;
    let objection_coverage = 100 - 18 * gap_analysis.missing_objections.len() as i32;

    let overlaps: Vec<u8> = gap_analysis
        .messaging_overlap
        .iter()
        .map(|item| item.overlap_percent.min(100))
        .collect();

    ScoreInputs {
        clarity,
        differentiation,
        objection_coverage,
        overlap_average: overlap_average(&overlaps),
        pricing,
        pipeline_at_risk: 0,
    }
}

/// Rank gaps into priority issues: impact minus an effort penalty
fn derive_priority_issues(gap_analysis: &GapAnalysisOutput) -> Vec<PriorityIssue> {
    let mut issues: Vec<PriorityIssue> = gap_analysis
        .gaps
        .iter()
        .map(|gap| {
            let impact = gap.impact_score.min(100);
            let priority =
                (i32::from(impact) - gap.effort.penalty()).clamp(0, 100) as u8;
            PriorityIssue {
                issue: gap.issue.clone(),
                impact_score: impact,
                effort_estimate: gap.effort.as_str().to_string(),
                priority_score: priority,
                tier: IssueTier::from_priority(priority),
            }
        })
        .collect();

    issues.sort_by(|a, b| b.priority_score.cmp(&a.priority_score));
    issues
}

/// One matrix row per usable competitor, joined with its counter statement
fn derive_competitive_matrix(
    competitors: &[CompetitorInsight],
    rewrites: &RewriteBundle,
) -> Vec<CompetitiveMatrixRow> {
    competitors
        .iter()
        .filter(|insight| !insight.error)
        .map(|insight| {
            let counter = rewrites
                .counters
                .counters
                .iter()
                .find(|c| c.competitor.eq_ignore_ascii_case(&insight.name))
                .map(|c| c.counter.clone());

            CompetitiveMatrixRow {
                competitor: insight.name.clone(),
                positioning: insight.positioning.clone(),
                strengths: insight.strengths.clone(),
                weaknesses: insight.weaknesses.clone(),
                counter,
            }
        })
        .collect()
}

/// Objection coverage score plus per-dimension scores.
///
/// A dimension is weak when any missing objection mentions one of its
/// keywords; the overall score drops a fixed amount per missing objection.
fn derive_objection_coverage(gap_analysis: &GapAnalysisOutput) -> ObjectionCoverage {
    let missing_lowered: Vec<String> = gap_analysis
        .missing_objections
        .iter()
        .map(|o| o.to_lowercase())
        .collect();

    let mut dimension_scores = BTreeMap::new();
    for (dimension, keywords) in OBJECTION_DIMENSIONS {
        let weak = missing_lowered
            .iter()
            .any(|objection| keywords.iter().any(|kw| objection.contains(kw)));
        dimension_scores.insert(
            dimension.to_string(),
            if weak {
                DIMENSION_WEAK_SCORE
            } else {
                DIMENSION_COVERED_SCORE
            },
        );
    }

    let score = (100 - 18 * gap_analysis.missing_objections.len() as i32).clamp(0, 100) as u8;

    ObjectionCoverage {
        score,
        dimension_scores,
    }
}

/// Confidence in the analysis: grows with usable competitor insight and
/// with how much structured content the site exposed
fn derive_confidence(input: &BuildReportInput) -> u8 {
    let usable_competitors = input
        .competitors
        .iter()
        .filter(|insight| !insight.error)
        .count() as i32;

    let homepage = &input.content.homepage;
    let mut confidence = 40 + 10 * usable_competitors;
    if homepage.headline.is_some() {
        confidence += 5;
    }
    if homepage.pricing_table_text.is_some() || input.content.pricing.is_some() {
        confidence += 5;
    }
    if !homepage.faq_blocks.is_empty() {
        confidence += 5;
    }

    confidence.clamp(0, 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::ExtractedPageContent;
    use crate::prompts::{EffortEstimate, GapItem};

    fn page(url: &str) -> ExtractedPageContent {
        ExtractedPageContent {
            url: url.to_string(),
            headline: Some("Close deals faster".to_string()),
            subheadline: None,
            pricing_table_text: Some("Pro $49/mo".to_string()),
            faq_blocks: vec!["Billing is monthly.".to_string()],
            raw_text: "Close deals faster".to_string(),
        }
    }

    fn rewrites() -> RewriteBundle {
        RewriteBundle {
            hero: HeroRewrite {
                headline: "h".to_string(),
                subheadline: "s".to_string(),
                primary_cta: "c".to_string(),
                secondary_cta: None,
            },
            pricing: PricingRewrite {
                value_metric: "per seat".to_string(),
                anchor: "anchor".to_string(),
                packaging_notes: vec![],
            },
            objections: ObjectionPlan { objections: vec![] },
            differentiation: DifferentiationPlan {
                differentiators: vec![],
            },
            counters: CounterPositioning {
                counters: vec![crate::prompts::CompetitorCounter {
                    competitor: "rival.example".to_string(),
                    counter: "We integrate deeper".to_string(),
                }],
            },
        }
    }

    fn build_input() -> BuildReportInput {
        BuildReportInput {
            profile: ReportProfile {
                company: None,
                homepage_url: "https://www.acme.example".to_string(),
                segment: None,
                traffic_baseline: DEFAULT_TRAFFIC_BASELINE,
                average_deal_size: DEFAULT_AVERAGE_DEAL_SIZE,
            },
            content: SiteContent {
                homepage: page("https://www.acme.example"),
                pricing: None,
            },
            competitors: vec![
                CompetitorInsight {
                    name: "rival.example".to_string(),
                    url: "https://rival.example".to_string(),
                    summary: "CRM".to_string(),
                    strengths: vec!["brand".to_string()],
                    weaknesses: vec!["price".to_string()],
                    positioning: "all-in-one".to_string(),
                    error: false,
                },
                CompetitorInsight {
                    name: "broken.example".to_string(),
                    url: "https://broken.example".to_string(),
                    summary: String::new(),
                    strengths: vec![],
                    weaknesses: vec![],
                    positioning: String::new(),
                    error: true,
                },
            ],
            gap_analysis: GapAnalysisOutput {
                gaps: vec![
                    GapItem {
                        issue: "No social proof".to_string(),
                        impact_score: 80,
                        effort: EffortEstimate::Low,
                    },
                    GapItem {
                        issue: "Rebuild pricing page".to_string(),
                        impact_score: 60,
                        effort: EffortEstimate::High,
                    },
                ],
                opportunities: vec![],
                risks: vec![],
                messaging_overlap: vec![OverlapItem {
                    competitor: "rival.example".to_string(),
                    overlap_percent: 40,
                }],
                missing_objections: vec!["No security story".to_string()],
                differentiation_gaps: vec!["Integrations".to_string()],
                pricing_clarity_issues: vec![],
            },
            rewrites: rewrites(),
            usage: TokenUsage::default(),
        }
    }

    #[test]
    fn resolves_company_from_hostname() {
        let report = build_report(build_input()).unwrap();
        assert_eq!(report.company, "acme.example");
    }

    #[test]
    fn explicit_company_wins_over_hostname() {
        let mut input = build_input();
        input.profile.company = Some("Acme Inc".to_string());
        let report = build_report(input).unwrap();
        assert_eq!(report.company, "Acme Inc");
    }

    #[test]
    fn fails_when_company_cannot_be_resolved() {
        let mut input = build_input();
        input.profile.company = Some("   ".to_string());
        input.profile.homepage_url = "garbage".to_string();

        match build_report(input) {
            Err(ReportError::CompanyResolutionFailed) => {}
            other => panic!("expected company resolution failure, got {other:?}"),
        }
    }

    #[test]
    fn scores_are_consistent_with_breakdown() {
        let report = build_report(build_input()).unwrap();

        assert_eq!(report.conversion_score, report.scoring_breakdown.gap_score);
        assert_eq!(
            u32::from(report.funnel_risk) + u32::from(report.conversion_score),
            100
        );
        assert_eq!(report.clarity_score, report.scoring_breakdown.clarity);
        assert_eq!(
            report.scoring_model_version,
            crate::scoring::CANONICAL_SCORING_MODEL_VERSION
        );
    }

    #[test]
    fn priority_issues_are_ranked_and_tiered() {
        let report = build_report(build_input()).unwrap();

        assert_eq!(report.priority_issues.len(), 2);
        // Low-effort high-impact gap ranks first: 80 - 0 = 80 -> p0
        assert_eq!(report.priority_issues[0].issue, "No social proof");
        assert_eq!(report.priority_issues[0].priority_score, 80);
        assert_eq!(report.priority_issues[0].tier, IssueTier::P0);
        // 60 - 30 = 30 -> p2
        assert_eq!(report.priority_issues[1].priority_score, 30);
        assert_eq!(report.priority_issues[1].tier, IssueTier::P2);
    }

    #[test]
    fn matrix_skips_failed_competitors_and_joins_counters() {
        let report = build_report(build_input()).unwrap();

        assert_eq!(report.competitive_matrix.len(), 1);
        let row = &report.competitive_matrix[0];
        assert_eq!(row.competitor, "rival.example");
        assert_eq!(row.counter.as_deref(), Some("We integrate deeper"));
    }

    #[test]
    fn objection_dimensions_reflect_missing_objections() {
        let report = build_report(build_input()).unwrap();

        let coverage = &report.objection_coverage;
        assert_eq!(coverage.score, 82);
        assert_eq!(coverage.dimension_scores["security"], DIMENSION_WEAK_SCORE);
        assert_eq!(coverage.dimension_scores["pricing"], DIMENSION_COVERED_SCORE);
    }

    #[test]
    fn confidence_counts_only_usable_competitors() {
        let report = build_report(build_input()).unwrap();
        // 40 + 10*1 + 5 headline + 5 pricing + 5 faq
        assert_eq!(report.confidence_score, 65);
    }

    #[test]
    fn all_top_level_scores_in_bounds() {
        let report = build_report(build_input()).unwrap();
        for score in [
            report.conversion_score,
            report.funnel_risk,
            report.differentiation_score,
            report.pricing_score,
            report.clarity_score,
            report.confidence_score,
        ] {
            assert!(score <= 100);
        }
    }
}
