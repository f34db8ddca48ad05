//! Revenue impact modeling
//!
//! Converts the funnel-risk score and deal-size assumptions into a
//! pipeline-at-risk estimate and a recovery projection. Pure functions;
//! all inputs come from the aggregator and scoring stage.

use serde::{Deserialize, Serialize};

/// Inputs to the revenue model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueInputs {
    /// Modeled win-rate improvement in percentage points
    pub win_rate_delta: i32,
    /// Funnel risk score, 0-100
    pub funnel_risk: i32,
    /// Opportunities per period the funnel feeds
    pub traffic_baseline: i64,
    /// Currency-agnostic average deal value
    pub average_deal_size: i64,
}

/// Recovery projection derived from the modeled lift
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueProjection {
    pub estimated_lift_percent: i32,
    pub modeled_win_rate_delta: i32,
    pub projected_pipeline_recovery: i64,
}

/// Full revenue impact output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueImpact {
    pub pipeline_at_risk: i64,
    pub revenue_projection: RevenueProjection,
}

/// Model the revenue exposed to conversion-messaging weaknesses.
pub fn model_revenue_impact(inputs: &RevenueInputs) -> RevenueImpact {
    let funnel_risk = f64::from(inputs.funnel_risk).clamp(0.0, 100.0);

    let pipeline_at_risk = (inputs.traffic_baseline as f64
        * inputs.average_deal_size as f64
        * funnel_risk
        / 100.0)
        .round() as i64;

    let modeled_win_rate_delta = inputs.win_rate_delta.max(0);
    let estimated_lift_percent =
        (f64::from(modeled_win_rate_delta) * 0.6 + funnel_risk * 0.1).round() as i32;

    let projected_pipeline_recovery =
        (pipeline_at_risk as f64 * f64::from(estimated_lift_percent) / 100.0).round() as i64;

    RevenueImpact {
        pipeline_at_risk,
        revenue_projection: RevenueProjection {
            estimated_lift_percent,
            modeled_win_rate_delta,
            projected_pipeline_recovery,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn models_pipeline_at_risk() {
        let impact = model_revenue_impact(&RevenueInputs {
            win_rate_delta: 10,
            funnel_risk: 40,
            traffic_baseline: 500,
            average_deal_size: 8_000,
        });

        // 500 * 8000 * 0.40
        assert_eq!(impact.pipeline_at_risk, 1_600_000);

        // 10*0.6 + 40*0.1 = 10
        assert_eq!(impact.revenue_projection.estimated_lift_percent, 10);
        assert_eq!(impact.revenue_projection.modeled_win_rate_delta, 10);
        assert_eq!(impact.revenue_projection.projected_pipeline_recovery, 160_000);
    }

    #[test]
    fn funnel_risk_is_clamped() {
        let impact = model_revenue_impact(&RevenueInputs {
            win_rate_delta: 0,
            funnel_risk: 250,
            traffic_baseline: 100,
            average_deal_size: 1_000,
        });

        // Clamped to 100% at risk
        assert_eq!(impact.pipeline_at_risk, 100_000);
    }

    #[test]
    fn negative_win_rate_delta_contributes_nothing() {
        let impact = model_revenue_impact(&RevenueInputs {
            win_rate_delta: -20,
            funnel_risk: 50,
            traffic_baseline: 100,
            average_deal_size: 1_000,
        });

        assert_eq!(impact.revenue_projection.modeled_win_rate_delta, 0);
        // 0*0.6 + 50*0.1 = 5
        assert_eq!(impact.revenue_projection.estimated_lift_percent, 5);
    }

    #[test]
    fn zero_traffic_means_zero_exposure() {
        let impact = model_revenue_impact(&RevenueInputs {
            win_rate_delta: 15,
            funnel_risk: 80,
            traffic_baseline: 0,
            average_deal_size: 10_000,
        });

        assert_eq!(impact.pipeline_at_risk, 0);
        assert_eq!(impact.revenue_projection.projected_pipeline_recovery, 0);
    }

    #[test]
    fn modeling_is_deterministic() {
        let inputs = RevenueInputs {
            win_rate_delta: 7,
            funnel_risk: 33,
            traffic_baseline: 420,
            average_deal_size: 12_500,
        };
        let a = model_revenue_impact(&inputs);
        let b = model_revenue_impact(&inputs);
        assert_eq!(a.pipeline_at_risk, b.pipeline_at_risk);
        assert_eq!(
            a.revenue_projection.projected_pipeline_recovery,
            b.revenue_projection.projected_pipeline_recovery
        );
    }
}
