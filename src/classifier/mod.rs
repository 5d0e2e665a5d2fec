//! Tier classification as an ordered chain of strategies.
//!
//! Each [`TierStrategy`] either returns a [`Verdict`] for a project or
//! declines; the first verdict wins and the winning link is recorded as
//! the project's [`ClassificationMethod`].

mod fallback;
mod segment;

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::model::{ClassificationMethod, ClassificationResult, ProjectRecord, SalesPattern};

pub use fallback::{DefaultStrategy, GlobalStrategy, HeuristicStrategy};
pub use segment::{
    age_efficiency_score, amenity_score, area_score, pattern_score, penetration_score, price_score,
    size_score, time_to_sellout_score, unit_mix_score, velocity_score, SegmentStats,
    SegmentStrategy, Spread, SubScores,
};

/// A tier and a score already placed inside that tier's band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub tier: crate::model::Tier,
    pub score: f64,
}

pub trait TierStrategy {
    fn method(&self) -> ClassificationMethod;

    /// `None` means "not applicable, ask the next strategy".
    fn attempt(&self, record: &ProjectRecord, pattern: SalesPattern) -> Option<Verdict>;
}

/// Per-project results plus bookkeeping for the run summary.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    pub results: Vec<ClassificationResult>,
    pub forced_corrections: usize,
    pub method_counts: BTreeMap<ClassificationMethod, usize>,
}

pub fn default_chain<'a>(records: &[ProjectRecord], config: &'a EngineConfig) -> Vec<Box<dyn TierStrategy + 'a>> {
    let max_months = config.segment.max_months_to_sellout;
    vec![
        Box::new(SegmentStrategy::new(records, &config.segment)),
        Box::new(GlobalStrategy::new(
            records,
            &config.global,
            config.segment.bands,
            max_months,
        )),
        Box::new(HeuristicStrategy::new(&config.heuristic)),
        Box::new(DefaultStrategy),
    ]
}

/// Run the chain over every project. Every project leaves with exactly one
/// valid result; anything the chain could not place is forced to the
/// neutral verdict and counted.
pub fn run_chain(
    records: &[ProjectRecord],
    patterns: &[SalesPattern],
    chain: &[Box<dyn TierStrategy + '_>],
    config: &EngineConfig,
) -> ChainOutcome {
    let bands = &config.segment.bands;
    let mut forced_corrections = 0;
    let mut method_counts: BTreeMap<ClassificationMethod, usize> = BTreeMap::new();

    let results: Vec<ClassificationResult> = records
        .iter()
        .zip(patterns)
        .map(|(record, &pattern)| {
            let found = chain.iter().find_map(|strategy| {
                strategy
                    .attempt(record, pattern)
                    .map(|v| ClassificationResult {
                        tier: v.tier,
                        score: v.score,
                        method: strategy.method(),
                    })
            });
            let result = match found {
                Some(r) if r.score.is_finite() && r.tier.band(bands).contains(r.score) => r,
                _ => {
                    forced_corrections += 1;
                    ClassificationResult::neutral(ClassificationMethod::Default)
                }
            };
            *method_counts.entry(result.method).or_default() += 1;
            result
        })
        .collect();

    if forced_corrections > 0 {
        warn!(
            "{} projects had no valid classification and were set to Moderado / 0.5",
            forced_corrections
        );
    }
    for (method, count) in &method_counts {
        info!("{:>5} projects classified by {}", count, method.label());
    }

    ChainOutcome {
        results,
        forced_corrections,
        method_counts,
    }
}

pub fn classify(records: &[ProjectRecord], patterns: &[SalesPattern], config: &EngineConfig) -> ChainOutcome {
    let chain = default_chain(records, config);
    run_chain(records, patterns, &chain, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SalesMetrics, Segment, Tier};

    fn record(segment: &str, sellout: Option<f64>, velocity: f64) -> ProjectRecord {
        ProjectRecord::new(
            Segment::Key(segment.to_string()),
            SalesMetrics {
                velocity,
                months_to_sellout: sellout,
                months_since_launch: 6.0,
                units_sold: Some(20.0),
                available: Some(40.0),
                total_units: Some(60.0),
            },
        )
    }

    #[test]
    fn two_valid_projects_go_global_three_go_segment() {
        let records = vec![
            record("pair", Some(4.0), 10.0),
            record("pair", Some(8.0), 5.0),
            record("trio", Some(3.0), 12.0),
            record("trio", Some(6.0), 6.0),
            record("trio", Some(12.0), 3.0),
        ];
        let patterns = vec![SalesPattern::NoData; records.len()];
        let outcome = classify(&records, &patterns, &EngineConfig::default());
        let methods: Vec<ClassificationMethod> = outcome.results.iter().map(|r| r.method).collect();
        assert_eq!(
            methods,
            vec![
                ClassificationMethod::Global,
                ClassificationMethod::Global,
                ClassificationMethod::Segment,
                ClassificationMethod::Segment,
                ClassificationMethod::Segment,
            ]
        );
    }

    #[test]
    fn every_project_gets_a_banded_result() {
        let records = vec![
            record("x", None, 0.0),
            ProjectRecord::new(Segment::Unsegmented, SalesMetrics::default()),
            record("y", Some(500.0), 0.1),
        ];
        let patterns = vec![SalesPattern::NoData; records.len()];
        let config = EngineConfig::default();
        let outcome = classify(&records, &patterns, &config);
        assert_eq!(outcome.results.len(), 3);
        for r in &outcome.results {
            assert!(r.tier.band(&config.segment.bands).contains(r.score));
        }
        assert_eq!(outcome.results[1].method, ClassificationMethod::Default);
        assert_eq!(outcome.results[1].tier, Tier::Moderado);
        assert_eq!(outcome.forced_corrections, 0);
    }

    struct OutOfBand;

    impl TierStrategy for OutOfBand {
        fn method(&self) -> ClassificationMethod {
            ClassificationMethod::Heuristic
        }

        fn attempt(&self, _: &ProjectRecord, _: SalesPattern) -> Option<Verdict> {
            Some(Verdict {
                tier: Tier::Exitoso,
                score: 0.1,
            })
        }
    }

    #[test]
    fn out_of_band_verdicts_are_forced_to_neutral() {
        let records = vec![record("x", Some(3.0), 1.0)];
        let chain: Vec<Box<dyn TierStrategy>> = vec![Box::new(OutOfBand)];
        let outcome = run_chain(&records, &[SalesPattern::NoData], &chain, &EngineConfig::default());
        assert_eq!(outcome.forced_corrections, 1);
        assert_eq!(outcome.results[0], ClassificationResult::neutral(ClassificationMethod::Default));
    }
}
