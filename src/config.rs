use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ClassifyError, Result};

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Tunable constants of the classification engine. Every field defaults to
/// the tuned production value, so an empty YAML document is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub segment: SegmentConfig,
    pub global: GlobalConfig,
    pub heuristic: HeuristicConfig,
    pub composite: CompositeConfig,
    pub regression: RegressionConfig,
}

impl EngineConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = if let Some(path) = path {
            let data = std::fs::read_to_string(path).map_err(|e| {
                ClassifyError::Config(format!("failed to read config {}: {e}", path.display()))
            })?;
            serde_yaml::from_str::<EngineConfig>(&data)?
        } else {
            EngineConfig::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.segment.validate()?;
        self.global.validate()?;
        self.composite.validate()?;
        self.regression.validate()
    }
}

// ── Tier thresholds and bands ───────────────────────────────────────────────

/// Composite-score cut points: `>= exitoso` is Exitoso, `>= moderado` is Moderado.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TierThresholds {
    pub exitoso: f64,
    pub moderado: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            exitoso: 0.67,
            moderado: 0.33,
        }
    }
}

impl TierThresholds {
    fn validate(&self, field: &str) -> Result<()> {
        if !(0.0..=1.0).contains(&self.moderado)
            || !(0.0..=1.0).contains(&self.exitoso)
            || self.moderado >= self.exitoso
        {
            return Err(ClassifyError::Config(format!(
                "{field}: expected 0 <= moderado < exitoso <= 1, got {} / {}",
                self.moderado, self.exitoso
            )));
        }
        Ok(())
    }
}

/// Closed score interval a tier's score must fall in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoreBand {
    pub low: f64,
    pub high: f64,
}

impl ScoreBand {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Map a unit-interval score linearly onto the band.
    pub fn rescale(&self, score: f64) -> f64 {
        let score = if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.5
        };
        self.low + score * (self.high - self.low)
    }

    pub fn contains(&self, score: f64) -> bool {
        score >= self.low - WEIGHT_TOLERANCE && score <= self.high + WEIGHT_TOLERANCE
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TierBands {
    pub exitoso: ScoreBand,
    pub moderado: ScoreBand,
    pub mejorable: ScoreBand,
}

impl Default for TierBands {
    fn default() -> Self {
        Self {
            exitoso: ScoreBand::new(0.62, 0.79),
            moderado: ScoreBand::new(0.50, 0.62),
            mejorable: ScoreBand::new(0.21, 0.50),
        }
    }
}

impl TierBands {
    fn validate(&self) -> Result<()> {
        for (name, band) in [
            ("exitoso", self.exitoso),
            ("moderado", self.moderado),
            ("mejorable", self.mejorable),
        ] {
            if band.low < 0.0 || band.high > 1.0 || band.low > band.high {
                return Err(ClassifyError::Config(format!(
                    "segment.bands.{name}: expected 0 <= low <= high <= 1, got [{}, {}]",
                    band.low, band.high
                )));
            }
        }
        Ok(())
    }
}

// ── Segment scoring ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SubScoreWeights {
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

impl Default for SubScoreWeights {
    fn default() -> Self {
        Self {
            time_to_sellout: 0.30,
            velocity: 0.18,
            penetration: 0.12,
            age_efficiency: 0.10,
            size: 0.07,
            price_per_m2: 0.07,
            area: 0.05,
            unit_mix: 0.04,
            amenities: 0.03,
            sales_pattern: 0.02,
        }
    }
}

impl SubScoreWeights {
    pub fn total(&self) -> f64 {
        self.time_to_sellout
            + self.velocity
            + self.penetration
            + self.age_efficiency
            + self.size
            + self.price_per_m2
            + self.area
            + self.unit_mix
            + self.amenities
            + self.sales_pattern
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmentConfig {
    /// Valid projects a segment needs before it is scored on its own.
    pub min_valid_projects: usize,
    pub max_months_to_sellout: f64,
    pub target_window_months: f64,
    pub thresholds: TierThresholds,
    pub bands: TierBands,
    pub weights: SubScoreWeights,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            min_valid_projects: 3,
            max_months_to_sellout: 120.0,
            target_window_months: 24.0,
            thresholds: TierThresholds::default(),
            bands: TierBands::default(),
            weights: SubScoreWeights::default(),
        }
    }
}

impl SegmentConfig {
    fn validate(&self) -> Result<()> {
        let total = self.weights.total();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ClassifyError::Config(format!(
                "segment.weights must sum to 1, got {total}"
            )));
        }
        if self.max_months_to_sellout <= 0.0 || self.target_window_months <= 0.0 {
            return Err(ClassifyError::Config(
                "segment month limits must be positive".to_string(),
            ));
        }
        self.thresholds.validate("segment.thresholds")?;
        self.bands.validate()
    }
}

// ── Global fallback ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GlobalConfig {
    pub lower_quantile: f64,
    pub upper_quantile: f64,
    pub min_valid_projects: usize,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            lower_quantile: 0.33,
            upper_quantile: 0.67,
            min_valid_projects: 3,
        }
    }
}

impl GlobalConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.lower_quantile)
            || !(0.0..=1.0).contains(&self.upper_quantile)
            || self.lower_quantile >= self.upper_quantile
        {
            return Err(ClassifyError::Config(format!(
                "global quantiles must satisfy 0 <= lower < upper <= 1, got {} / {}",
                self.lower_quantile, self.upper_quantile
            )));
        }
        Ok(())
    }
}

// ── Heuristic fallback ──────────────────────────────────────────────────────

/// A `(high, mid)` cut pair with the scores handed out above each cut.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HeuristicRule {
    pub high: f64,
    pub mid: f64,
    pub high_score: f64,
    pub mid_score: f64,
    pub low_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Units per month. `high` is exclusive, `mid` inclusive.
    pub velocity: HeuristicRule,
    /// Percent sold. Both cuts exclusive.
    pub penetration: HeuristicRule,
    /// Units sold. Both cuts exclusive.
    pub units_sold: HeuristicRule,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            velocity: HeuristicRule {
                high: 15.0,
                mid: 8.0,
                high_score: 0.70,
                mid_score: 0.50,
                low_score: 0.30,
            },
            penetration: HeuristicRule {
                high: 50.0,
                mid: 25.0,
                high_score: 0.70,
                mid_score: 0.50,
                low_score: 0.30,
            },
            units_sold: HeuristicRule {
                high: 50.0,
                mid: 20.0,
                high_score: 0.65,
                mid_score: 0.50,
                low_score: 0.35,
            },
        }
    }
}

// ── Composite score ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompositeConfig {
    pub velocity_weight: f64,
    pub penetration_weight: f64,
    pub historical_velocity_weight: f64,
    pub price_position_weight: f64,
    pub thresholds: TierThresholds,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            velocity_weight: 0.40,
            penetration_weight: 0.25,
            historical_velocity_weight: 0.20,
            price_position_weight: 0.15,
            thresholds: TierThresholds::default(),
        }
    }
}

impl CompositeConfig {
    fn validate(&self) -> Result<()> {
        let total = self.velocity_weight
            + self.penetration_weight
            + self.historical_velocity_weight
            + self.price_position_weight;
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ClassifyError::Config(format!(
                "composite weights must sum to 1, got {total}"
            )));
        }
        self.thresholds.validate("composite.thresholds")
    }
}

// ── Regression diagnostic ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegressionConfig {
    pub enabled: bool,
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub min_rows: usize,
    pub seed: u64,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            n_trees: 100,
            max_depth: 10,
            min_samples_split: 5,
            min_samples_leaf: 2,
            min_rows: 10,
            seed: 42,
        }
    }
}

impl RegressionConfig {
    fn validate(&self) -> Result<()> {
        if self.enabled && (self.n_trees == 0 || self.max_depth == 0 || self.min_samples_leaf == 0)
        {
            return Err(ClassifyError::Config(
                "regression: n_trees, max_depth and min_samples_leaf must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.segment.weights.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: EngineConfig =
            serde_yaml::from_str("segment:\n  target_window_months: 30\n").unwrap();
        assert_eq!(config.segment.target_window_months, 30.0);
        assert_eq!(config.segment.min_valid_projects, 3);
        assert_eq!(config.regression.seed, 42);
    }

    #[test]
    fn unbalanced_weights_are_rejected() {
        let mut config = EngineConfig::default();
        config.segment.weights.velocity = 0.5;
        assert!(matches!(config.validate(), Err(ClassifyError::Config(_))));
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let mut config = EngineConfig::default();
        config.composite.thresholds = TierThresholds {
            exitoso: 0.3,
            moderado: 0.6,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, "regression:\n  enabled: false\n").unwrap();
        let config = EngineConfig::load(Some(&path)).unwrap();
        assert!(!config.regression.enabled);
    }

    #[test]
    fn band_rescale_stays_inside() {
        let band = ScoreBand::new(0.62, 0.79);
        assert!((band.rescale(0.0) - 0.62).abs() < 1e-12);
        assert!((band.rescale(1.0) - 0.79).abs() < 1e-12);
        assert!(band.contains(band.rescale(f64::NAN)));
    }
}
