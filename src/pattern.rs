use std::collections::HashMap;

use crate::model::{ProjectRecord, SalesPattern, Segment};

const FAST_VELOCITY: f64 = 15.0;
const SLOW_VELOCITY: f64 = 8.0;
const HIGH_RATIO: f64 = 1.2;
const LOW_RATIO: f64 = 0.8;
/// Expected percent sold per month since launch.
const EXPECTED_PENETRATION_PER_MONTH: f64 = 2.5;

/// Inputs of the pattern rules for one project.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternInputs {
    pub velocity: f64,
    pub penetration: f64,
    pub months_since_launch: f64,
    pub segment_mean_velocity: f64,
}

/// 0.7 when behind the age-implied penetration, 1.3 when well ahead.
pub fn age_factor(penetration: f64, months_since_launch: f64) -> f64 {
    let expected = (months_since_launch * EXPECTED_PENETRATION_PER_MONTH).min(100.0);
    if penetration < expected * 0.5 {
        0.7
    } else if penetration > expected * 1.5 {
        1.3
    } else {
        1.0
    }
}

pub fn classify(inputs: &PatternInputs) -> SalesPattern {
    let v = inputs.velocity;
    if v <= 0.0 || !v.is_finite() {
        return SalesPattern::NoData;
    }
    let reference = if inputs.segment_mean_velocity > 0.0 {
        inputs.segment_mean_velocity
    } else {
        v
    };
    let ratio = v / reference;
    let pct = inputs.penetration;
    let months = inputs.months_since_launch;
    let factor = age_factor(pct, months);

    if v > FAST_VELOCITY && ratio > HIGH_RATIO && (pct > 30.0 || factor >= 1.2) {
        SalesPattern::Accelerated
    } else if v < SLOW_VELOCITY || ratio < LOW_RATIO || (months > 12.0 && pct < 20.0) {
        SalesPattern::Decelerated
    } else if (SLOW_VELOCITY..=FAST_VELOCITY).contains(&v) && (LOW_RATIO..=HIGH_RATIO).contains(&ratio) {
        SalesPattern::Constant
    } else if v > FAST_VELOCITY {
        SalesPattern::Accelerated
    } else {
        SalesPattern::Constant
    }
}

/// Mean velocity per segment key; unsegmented projects form one group.
pub fn segment_mean_velocities(records: &[ProjectRecord]) -> HashMap<&Segment, f64> {
    let mut sums: HashMap<&Segment, (f64, usize)> = HashMap::new();
    for r in records {
        let entry = sums.entry(&r.segment).or_insert((0.0, 0));
        entry.0 += r.metrics.velocity;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(seg, (sum, n))| (seg, sum / n as f64))
        .collect()
}

pub fn classify_all(records: &[ProjectRecord]) -> Vec<SalesPattern> {
    let means = segment_mean_velocities(records);
    records
        .iter()
        .map(|r| {
            classify(&PatternInputs {
                velocity: r.metrics.velocity,
                penetration: r.penetration.unwrap_or(0.0),
                months_since_launch: r.metrics.months_since_launch,
                segment_mean_velocity: means.get(&r.segment).copied().unwrap_or(0.0),
            })
        })
        .collect()
}
