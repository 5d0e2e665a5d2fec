//! Segment-relative multi-factor scoring.

use std::collections::HashMap;

use tracing::debug;

use crate::config::{SegmentConfig, SubScoreWeights};
use crate::model::{ClassificationMethod, ProjectRecord, SalesMetrics, SalesPattern, Segment, Tier};
use crate::stats::{self, clamp01};

use super::{TierStrategy, Verdict};

const NEUTRAL: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spread {
    pub median: f64,
    pub p25: f64,
    pub p75: f64,
}

impl Spread {
    fn of(values: &[f64]) -> Option<Spread> {
        Some(Spread {
            median: stats::median(values)?,
            p25: stats::quantile(values, 0.25)?,
            p75: stats::quantile(values, 0.75)?,
        })
    }

    fn has_width(&self) -> bool {
        self.p75 > self.p25
    }
}

/// Statistics over the valid projects of one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentStats {
    pub valid: usize,
    pub sellout_range: Option<(f64, f64)>,
    pub velocity: Option<Spread>,
    pub penetration: Option<Spread>,
    pub price_per_m2_median: Option<f64>,
    pub amenity_median: Option<f64>,
}

impl SegmentStats {
    pub fn from_valid(members: &[&ProjectRecord]) -> SegmentStats {
        let sellout: Vec<f64> = members.iter().filter_map(|r| r.metrics.months_to_sellout).collect();
        let velocity: Vec<f64> = members
            .iter()
            .map(|r| r.metrics.velocity)
            .filter(|v| *v > 0.0)
            .collect();
        let penetration: Vec<f64> = members
            .iter()
            .filter_map(|r| r.penetration)
            .filter(|p| *p >= 0.0)
            .collect();
        let pm2: Vec<f64> = members
            .iter()
            .filter_map(|r| r.price_per_m2)
            .filter(|p| *p > 0.0)
            .collect();
        let amenities: Vec<f64> = members.iter().filter_map(|r| r.amenity_count).collect();

        SegmentStats {
            valid: members.len(),
            sellout_range: stats::min_max(&sellout),
            velocity: Spread::of(&velocity),
            penetration: Spread::of(&penetration),
            price_per_m2_median: stats::median(&pm2),
            amenity_median: stats::median(&amenities),
        }
    }
}

// ── Sub-scores ──────────────────────────────────────────────────────────────

/// Fewer months to sell out than the segment's slowest is better.
pub fn time_to_sellout_score(months: f64, range: Option<(f64, f64)>) -> f64 {
    match range.and_then(|r| stats::normalize(months, r)) {
        Some(n) => clamp01(1.0 - n),
        None => NEUTRAL,
    }
}

pub fn velocity_score(velocity: f64, spread: Option<Spread>) -> f64 {
    match spread {
        Some(s) if velocity > 0.0 && s.has_width() => clamp01((velocity - s.p25) / (s.p75 - s.p25)),
        Some(s) if velocity > 0.0 && s.median > 0.0 => clamp01(velocity / (2.0 * s.median)),
        _ => 0.3,
    }
}

pub fn penetration_score(penetration: Option<f64>, spread: Option<Spread>) -> f64 {
    match penetration.filter(|p| *p >= 0.0) {
        Some(p) => match spread {
            Some(s) if s.has_width() => clamp01((p - s.p25) / (s.p75 - s.p25)),
            _ => (p / 100.0).min(1.0),
        },
        None => 0.2,
    }
}

/// Total time on market against the target window, with an extra penalty
/// for active projects that are old and still mostly unsold.
pub fn age_efficiency_score(metrics: &SalesMetrics, penetration: Option<f64>, window: f64) -> f64 {
    let active = metrics.is_active();
    let since = metrics.months_since_launch;
    let remaining = metrics.months_to_sellout.filter(|m| *m > 0.0).unwrap_or(0.0);
    let total = if active { since + remaining } else { since };

    let mut score = 1.0;
    if total > 0.0 {
        let over = total - window;
        score = if total <= window {
            1.0 - (total / window) * 0.3
        } else if total <= window * 1.5 {
            0.7 - (over / (window * 0.5)) * 0.2
        } else if total <= window * 2.0 {
            0.5 - (over / window).min(1.0) * 0.2
        } else {
            (0.3 - (over / (window * 2.0)).min(1.0) * 0.2).max(0.1)
        };
    }

    if active {
        if let Some(p) = penetration {
            if since > window && p < 50.0 {
                score *= 1.0 - ((50.0 - p) / 50.0) * 0.3;
            } else if since > window * 1.5 && p < 70.0 {
                score *= 1.0 - ((70.0 - p) / 70.0) * 0.2;
            }
        }
    }
    clamp01(score)
}

pub fn size_score(total_units: Option<f64>) -> f64 {
    match total_units.filter(|t| *t > 0.0) {
        Some(t) if (50.0..=150.0).contains(&t) => 1.0,
        Some(t) if (25.0..50.0).contains(&t) || (t > 150.0 && t <= 200.0) => 0.7,
        Some(t) if t < 25.0 => 0.5,
        Some(_) => 0.6,
        None => NEUTRAL,
    }
}

pub fn price_score(price_per_m2: Option<f64>, segment_median: Option<f64>) -> f64 {
    let (Some(p), Some(m)) = (price_per_m2.filter(|p| *p > 0.0), segment_median.filter(|m| *m > 0.0)) else {
        return NEUTRAL;
    };
    let ratio = p / m;
    if (0.85..=1.15).contains(&ratio) {
        1.0
    } else if (0.70..0.85).contains(&ratio) || (ratio > 1.15 && ratio <= 1.30) {
        0.7
    } else if ratio < 0.70 {
        0.4
    } else {
        0.3
    }
}

pub fn area_score(avg_area: Option<f64>) -> f64 {
    match avg_area.filter(|a| *a > 0.0) {
        Some(a) if (60.0..=100.0).contains(&a) => 1.0,
        Some(a) if (45.0..60.0).contains(&a) || (a > 100.0 && a <= 120.0) => 0.8,
        Some(a) if a < 45.0 => 0.6,
        Some(_) => 0.7,
        None => NEUTRAL,
    }
}

fn room_fit(count: f64) -> f64 {
    if (2.0..=3.0).contains(&count) {
        1.0
    } else if (1.0..2.0).contains(&count) || (count > 3.0 && count <= 4.0) {
        0.7
    } else {
        0.5
    }
}

fn parking_fit(count: f64) -> f64 {
    if (1.0..=2.0).contains(&count) {
        1.0
    } else if count == 0.0 || count == 3.0 {
        0.6
    } else {
        0.4
    }
}

pub fn unit_mix_score(bedrooms: Option<f64>, bathrooms: Option<f64>, parking: Option<f64>) -> f64 {
    let parts: Vec<f64> = [
        bedrooms.map(room_fit),
        bathrooms.map(room_fit),
        parking.map(parking_fit),
    ]
    .into_iter()
    .flatten()
    .collect();
    stats::mean(&parts).unwrap_or(NEUTRAL)
}

pub fn amenity_score(count: Option<f64>, segment_median: Option<f64>) -> f64 {
    let Some(c) = count else {
        return NEUTRAL;
    };
    match segment_median {
        Some(m) if m > 0.0 => {
            if c >= 1.5 * m {
                1.0
            } else if c >= m {
                0.8
            } else if c >= 0.5 * m {
                0.6
            } else {
                0.3
            }
        }
        _ => {
            if c >= 10.0 {
                1.0
            } else if c >= 5.0 {
                0.7
            } else if c >= 2.0 {
                0.5
            } else {
                0.3
            }
        }
    }
}

pub fn pattern_score(pattern: SalesPattern) -> f64 {
    match pattern {
        SalesPattern::Accelerated => 1.0,
        SalesPattern::Constant => 0.7,
        SalesPattern::Decelerated => 0.3,
        SalesPattern::NoData => NEUTRAL,
    }
}

/// The ten weighted parts of a segment score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubScores {
    pub time_to_sellout: f64,
    pub velocity: f64,
    pub penetration: f64,
    pub age_efficiency: f64,
    pub size: f64,
    pub price_per_m2: f64,
    pub area: f64,
    pub unit_mix: f64,
    pub amenities: f64,
    pub sales_pattern: f64,
}

impl SubScores {
    pub fn compute(
        record: &ProjectRecord,
        pattern: SalesPattern,
        stats: &SegmentStats,
        window: f64,
    ) -> SubScores {
        let months = record.metrics.months_to_sellout.unwrap_or(0.0);
        SubScores {
            time_to_sellout: time_to_sellout_score(months, stats.sellout_range),
            velocity: velocity_score(record.metrics.velocity, stats.velocity),
            penetration: penetration_score(record.penetration, stats.penetration),
            age_efficiency: age_efficiency_score(&record.metrics, record.penetration, window),
            size: size_score(record.metrics.total_units),
            price_per_m2: price_score(record.price_per_m2, stats.price_per_m2_median),
            area: area_score(record.avg_area),
            unit_mix: unit_mix_score(record.bedrooms, record.bathrooms, record.parking),
            amenities: amenity_score(record.amenity_count, stats.amenity_median),
            sales_pattern: pattern_score(pattern),
        }
    }

    pub fn weighted(&self, w: &SubScoreWeights) -> f64 {
        let total = w.time_to_sellout * self.time_to_sellout
            + w.velocity * self.velocity
            + w.penetration * self.penetration
            + w.age_efficiency * self.age_efficiency
            + w.size * self.size
            + w.price_per_m2 * self.price_per_m2
            + w.area * self.area
            + w.unit_mix * self.unit_mix
            + w.amenities * self.amenities
            + w.sales_pattern * self.sales_pattern;
        clamp01(total)
    }
}

// ── Strategy ────────────────────────────────────────────────────────────────

/// Scores projects against peers of their own segment. Declines for
/// unsegmented projects, projects without a valid sell-out projection and
/// segments with too few valid members.
pub struct SegmentStrategy<'a> {
    config: &'a SegmentConfig,
    stats: HashMap<Segment, SegmentStats>,
}

impl<'a> SegmentStrategy<'a> {
    pub fn new(records: &[ProjectRecord], config: &'a SegmentConfig) -> Self {
        let mut members: HashMap<&Segment, Vec<&ProjectRecord>> = HashMap::new();
        for r in records {
            if r.segment.is_segmented() && r.metrics.has_valid_sellout(config.max_months_to_sellout) {
                members.entry(&r.segment).or_default().push(r);
            }
        }

        let mut stats = HashMap::new();
        for (segment, valid) in members {
            if valid.len() < config.min_valid_projects {
                debug!(
                    "segment {} has {} valid projects, deferring to fallback",
                    segment.label(),
                    valid.len()
                );
                continue;
            }
            stats.insert(segment.clone(), SegmentStats::from_valid(&valid));
        }
        Self { config, stats }
    }

    pub fn scored_segments(&self) -> usize {
        self.stats.len()
    }

    pub fn stats(&self, segment: &Segment) -> Option<&SegmentStats> {
        self.stats.get(segment)
    }
}

impl TierStrategy for SegmentStrategy<'_> {
    fn method(&self) -> ClassificationMethod {
        ClassificationMethod::Segment
    }

    fn attempt(&self, record: &ProjectRecord, pattern: SalesPattern) -> Option<Verdict> {
        if !record.metrics.has_valid_sellout(self.config.max_months_to_sellout) {
            return None;
        }
        let stats = self.stats.get(&record.segment)?;
        let parts = SubScores::compute(record, pattern, stats, self.config.target_window_months);
        let composite = parts.weighted(&self.config.weights);
        let tier = Tier::from_score(composite, &self.config.thresholds);
        Some(Verdict {
            tier,
            score: tier.band(&self.config.bands).rescale(composite),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(since: f64, sellout: Option<f64>, available: Option<f64>) -> SalesMetrics {
        SalesMetrics {
            velocity: 5.0,
            months_to_sellout: sellout,
            months_since_launch: since,
            units_sold: Some(10.0),
            available,
            total_units: Some(100.0),
        }
    }

    #[test]
    fn time_score_inverts_range() {
        assert_eq!(time_to_sellout_score(5.0, Some((5.0, 15.0))), 1.0);
        assert_eq!(time_to_sellout_score(15.0, Some((5.0, 15.0))), 0.0);
        assert_eq!(time_to_sellout_score(7.0, Some((7.0, 7.0))), 0.5);
    }

    #[test]
    fn velocity_score_uses_band_then_median() {
        let banded = Spread { median: 10.0, p25: 5.0, p75: 15.0 };
        assert_eq!(velocity_score(10.0, Some(banded)), 0.5);
        let flat = Spread { median: 10.0, p25: 10.0, p75: 10.0 };
        assert_eq!(velocity_score(5.0, Some(flat)), 0.25);
        assert_eq!(velocity_score(0.0, Some(banded)), 0.3);
    }

    #[test]
    fn penetration_score_defaults() {
        assert_eq!(penetration_score(None, None), 0.2);
        assert_eq!(penetration_score(Some(40.0), None), 0.4);
        let s = Spread { median: 50.0, p25: 30.0, p75: 70.0 };
        assert_eq!(penetration_score(Some(80.0), Some(s)), 1.0);
    }

    #[test]
    fn sold_out_project_within_window_is_efficient() {
        let m = metrics(10.0, Some(0.0), Some(0.0));
        let score = age_efficiency_score(&m, Some(100.0), 24.0);
        assert!((score - (1.0 - 10.0 / 24.0 * 0.3)).abs() < 1e-9);
        assert!(score >= 0.7);
    }

    #[test]
    fn age_efficiency_degrades_with_time() {
        let fresh = age_efficiency_score(&metrics(6.0, Some(6.0), Some(30.0)), Some(60.0), 24.0);
        let late = age_efficiency_score(&metrics(30.0, Some(10.0), Some(30.0)), Some(60.0), 24.0);
        let ancient = age_efficiency_score(&metrics(90.0, Some(30.0), Some(30.0)), Some(60.0), 24.0);
        assert!(fresh > late && late > ancient);
        assert!(ancient >= 0.1 * 0.8);
    }

    #[test]
    fn old_unsold_active_projects_are_penalized() {
        let m = metrics(30.0, Some(2.0), Some(80.0));
        let with_sales = age_efficiency_score(&m, Some(60.0), 24.0);
        let without = age_efficiency_score(&m, Some(10.0), 24.0);
        assert!(without < with_sales);
    }

    #[test]
    fn shape_scores() {
        assert_eq!(size_score(Some(100.0)), 1.0);
        assert_eq!(size_score(Some(30.0)), 0.7);
        assert_eq!(size_score(Some(250.0)), 0.6);
        assert_eq!(size_score(None), 0.5);
        assert_eq!(price_score(Some(100.0), Some(100.0)), 1.0);
        assert_eq!(price_score(Some(60.0), Some(100.0)), 0.4);
        assert_eq!(price_score(Some(140.0), Some(100.0)), 0.3);
        assert_eq!(area_score(Some(50.0)), 0.8);
        assert_eq!(area_score(Some(130.0)), 0.7);
        assert_eq!(unit_mix_score(Some(2.0), Some(2.0), Some(1.0)), 1.0);
        assert_eq!(unit_mix_score(None, None, None), 0.5);
        assert!((unit_mix_score(Some(5.0), None, Some(0.0)) - 0.55).abs() < 1e-12);
    }

    #[test]
    fn amenity_score_relative_and_absolute() {
        assert_eq!(amenity_score(None, Some(4.0)), 0.5);
        assert_eq!(amenity_score(Some(6.0), Some(4.0)), 1.0);
        assert_eq!(amenity_score(Some(1.0), Some(4.0)), 0.3);
        assert_eq!(amenity_score(Some(5.0), Some(0.0)), 0.7);
    }

    #[test]
    fn small_segments_are_not_scored() {
        let config = SegmentConfig::default();
        let mk = |seg: &str, m: f64| {
            ProjectRecord::new(Segment::Key(seg.to_string()), metrics(6.0, Some(m), Some(20.0)))
        };
        let records = vec![mk("a", 3.0), mk("a", 6.0), mk("b", 3.0), mk("b", 6.0), mk("b", 9.0)];
        let strategy = SegmentStrategy::new(&records, &config);
        assert_eq!(strategy.scored_segments(), 1);
        assert!(strategy.attempt(&records[0], SalesPattern::NoData).is_none());
        let verdict = strategy.attempt(&records[2], SalesPattern::NoData).unwrap();
        assert!(verdict.tier.band(&config.bands).contains(verdict.score));
    }
}
