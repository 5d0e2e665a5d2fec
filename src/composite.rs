use polars::prelude::*;
use tracing::info;

use crate::config::CompositeConfig;
use crate::error::Result;
use crate::features::ProjectFeatures;
use crate::frame;
use crate::model::{SalesMetrics, Tier};
use crate::schema::{labels, output};
use crate::stats;

const NEUTRAL: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeScore {
    pub score: f64,
    pub tier: Tier,
}

impl CompositeScore {
    pub fn label(&self) -> String {
        format!("{}{}", self.tier.label(), labels::COMPOSITE_SUFFIX)
    }
}

/// Global weighted score, independent of segments. Kept alongside the
/// primary classification for comparison only.
pub fn score(
    metrics: &[SalesMetrics],
    features: &[ProjectFeatures],
    config: &CompositeConfig,
) -> Vec<CompositeScore> {
    let sellout: Vec<f64> = metrics.iter().filter_map(|m| m.months_to_sellout).collect();
    let sellout_range = stats::min_max(&sellout);

    let historical: Vec<f64> = features
        .iter()
        .filter_map(|f| f.historical_velocity)
        .filter(|v| *v > 0.0)
        .collect();
    let historical_range = stats::min_max(&historical);

    metrics
        .iter()
        .zip(features)
        .map(|(m, f)| {
            let speed = match (m.months_to_sellout, sellout_range) {
                (Some(x), Some(range)) => stats::normalize(x, range).map_or(NEUTRAL, |n| 1.0 - n),
                _ => NEUTRAL,
            };
            let penetration = f.penetration.map_or(0.0, |p| p / 100.0);
            let historical = match (f.historical_velocity, historical_range) {
                (Some(v), Some(range)) if v > 0.0 => stats::normalize(v, range).unwrap_or(NEUTRAL),
                (Some(_), Some(_)) => 0.0,
                _ => NEUTRAL,
            };
            let price_position = f.price_pct_zone.map_or(NEUTRAL, |p| (100.0 - p) / 100.0);

            let raw = config.velocity_weight * stats::clamp01(speed)
                + config.penetration_weight * stats::clamp01(penetration)
                + config.historical_velocity_weight * stats::clamp01(historical)
                + config.price_position_weight * stats::clamp01(price_position);
            let score = stats::clamp01(raw);
            CompositeScore {
                score,
                tier: Tier::from_score(score, &config.thresholds),
            }
        })
        .collect()
}

pub fn annotate(
    df: &mut DataFrame,
    metrics: &[SalesMetrics],
    features: &[ProjectFeatures],
    config: &CompositeConfig,
) -> Result<Vec<CompositeScore>> {
    let scores = score(metrics, features, config);
    let values: Vec<f64> = scores.iter().map(|s| s.score).collect();
    let tiers: Vec<String> = scores.iter().map(|s| s.label()).collect();
    frame::upsert(df, Column::new(output::COMPOSITE_SCORE.into(), values))?;
    frame::upsert(df, Column::new(output::COMPOSITE_TIER.into(), tiers))?;

    let exitosos = scores.iter().filter(|s| s.tier == Tier::Exitoso).count();
    info!("Composite score: {} of {} projects above the top threshold", exitosos, scores.len());
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(sellout: Option<f64>) -> SalesMetrics {
        SalesMetrics {
            months_to_sellout: sellout,
            ..SalesMetrics::default()
        }
    }

    #[test]
    fn faster_sellout_scores_higher() {
        let m = [metrics(Some(2.0)), metrics(Some(20.0)), metrics(None)];
        let f = [ProjectFeatures::default(); 3];
        let s = score(&m, &f, &CompositeConfig::default());
        assert!(s[0].score > s[1].score);
        // undefined sell-out gets the neutral speed part
        assert!((s[2].score - (0.40 * 0.5 + 0.20 * 0.5 + 0.15 * 0.5)).abs() < 1e-9);
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        let m = [metrics(Some(1.0))];
        let f = [ProjectFeatures {
            penetration: Some(100.0),
            historical_velocity: Some(10.0),
            price_pct_zone: Some(0.0),
            ..ProjectFeatures::default()
        }];
        let s = score(&m, &f, &CompositeConfig::default());
        assert!(s[0].score <= 1.0 && s[0].score >= 0.0);
        assert_eq!(s[0].label(), "Exitoso_Compuesto");
    }
}
