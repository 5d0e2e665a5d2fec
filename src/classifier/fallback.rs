//! Fallback links of the classification chain.

use crate::config::{GlobalConfig, HeuristicConfig, HeuristicRule, TierBands};
use crate::model::{ClassificationMethod, ProjectRecord, SalesPattern, Tier};
use crate::stats;

use super::{TierStrategy, Verdict};

// ── Global percentiles ──────────────────────────────────────────────────────

/// Ranks a project's months-to-sell-out against every project in the run.
pub struct GlobalStrategy {
    cuts: Option<(f64, f64)>,
    range: Option<(f64, f64)>,
    bands: TierBands,
    max_months: f64,
}

impl GlobalStrategy {
    pub fn new(records: &[ProjectRecord], config: &GlobalConfig, bands: TierBands, max_months: f64) -> Self {
        let valid: Vec<f64> = records
            .iter()
            .filter(|r| r.metrics.has_valid_sellout(max_months))
            .filter_map(|r| r.metrics.months_to_sellout)
            .collect();

        let cuts = if valid.len() >= config.min_valid_projects {
            stats::quantile(&valid, config.lower_quantile)
                .zip(stats::quantile(&valid, config.upper_quantile))
        } else {
            None
        };
        Self {
            cuts,
            range: stats::min_max(&valid),
            bands,
            max_months,
        }
    }

    pub fn thresholds(&self) -> Option<(f64, f64)> {
        self.cuts
    }
}

impl TierStrategy for GlobalStrategy {
    fn method(&self) -> ClassificationMethod {
        ClassificationMethod::Global
    }

    fn attempt(&self, record: &ProjectRecord, _pattern: SalesPattern) -> Option<Verdict> {
        let (q1, q2) = self.cuts?;
        if !record.metrics.has_valid_sellout(self.max_months) {
            return None;
        }
        let months = record.metrics.months_to_sellout?;
        let tier = if months <= q1 {
            Tier::Exitoso
        } else if months <= q2 {
            Tier::Moderado
        } else {
            Tier::Mejorable
        };
        let speed = self
            .range
            .and_then(|r| stats::normalize(months, r))
            .map_or(0.5, |n| 1.0 - n);
        Some(Verdict {
            tier,
            score: tier.band(&self.bands).rescale(speed),
        })
    }
}

// ── Heuristic ───────────────────────────────────────────────────────────────

/// Rule-of-thumb verdicts from whatever sales signal is present:
/// velocity, then penetration, then units sold.
pub struct HeuristicStrategy<'a> {
    config: &'a HeuristicConfig,
}

impl<'a> HeuristicStrategy<'a> {
    pub fn new(config: &'a HeuristicConfig) -> Self {
        Self { config }
    }
}

fn rule_verdict(value: f64, rule: &HeuristicRule, mid_inclusive: bool) -> Verdict {
    let mid_hit = if mid_inclusive { value >= rule.mid } else { value > rule.mid };
    if value > rule.high {
        Verdict {
            tier: Tier::Exitoso,
            score: rule.high_score,
        }
    } else if mid_hit {
        Verdict {
            tier: Tier::Moderado,
            score: rule.mid_score,
        }
    } else {
        Verdict {
            tier: Tier::Mejorable,
            score: rule.low_score,
        }
    }
}

impl TierStrategy for HeuristicStrategy<'_> {
    fn method(&self) -> ClassificationMethod {
        ClassificationMethod::Heuristic
    }

    fn attempt(&self, record: &ProjectRecord, _pattern: SalesPattern) -> Option<Verdict> {
        let velocity = record.metrics.velocity;
        if velocity > 0.0 {
            return Some(rule_verdict(velocity, &self.config.velocity, true));
        }
        if let Some(p) = record.penetration.filter(|p| *p >= 0.0) {
            return Some(rule_verdict(p, &self.config.penetration, false));
        }
        record
            .metrics
            .units_sold
            .filter(|s| *s >= 0.0)
            .map(|s| rule_verdict(s, &self.config.units_sold, false))
    }
}

// ── Default ─────────────────────────────────────────────────────────────────

pub struct DefaultStrategy;

impl TierStrategy for DefaultStrategy {
    fn method(&self) -> ClassificationMethod {
        ClassificationMethod::Default
    }

    fn attempt(&self, _record: &ProjectRecord, _pattern: SalesPattern) -> Option<Verdict> {
        Some(Verdict {
            tier: Tier::Moderado,
            score: 0.5,
        })
    }
}
