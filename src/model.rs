use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{TierBands, TierThresholds};

// ── Tiers ───────────────────────────────────────────────────────────────────

/// Three-level performance classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    Exitoso,
    Moderado,
    Mejorable,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Exitoso, Tier::Moderado, Tier::Mejorable];

    pub fn label(&self) -> &'static str {
        match self {
            Tier::Exitoso => "Exitoso",
            Tier::Moderado => "Moderado",
            Tier::Mejorable => "Mejorable",
        }
    }

    pub fn parse(label: &str) -> Option<Tier> {
        match label.trim() {
            "Exitoso" => Some(Tier::Exitoso),
            "Moderado" => Some(Tier::Moderado),
            "Mejorable" => Some(Tier::Mejorable),
            _ => None,
        }
    }

    pub fn from_score(score: f64, thresholds: &TierThresholds) -> Tier {
        if score >= thresholds.exitoso {
            Tier::Exitoso
        } else if score >= thresholds.moderado {
            Tier::Moderado
        } else {
            Tier::Mejorable
        }
    }

    pub fn band(&self, bands: &TierBands) -> crate::config::ScoreBand {
        match self {
            Tier::Exitoso => bands.exitoso,
            Tier::Moderado => bands.moderado,
            Tier::Mejorable => bands.mejorable,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Sales pattern ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SalesPattern {
    Accelerated,
    Constant,
    Decelerated,
    NoData,
}

impl SalesPattern {
    pub fn label(&self) -> &'static str {
        match self {
            SalesPattern::Accelerated => "Acelerado",
            SalesPattern::Constant => "Constante",
            SalesPattern::Decelerated => "Desacelerado",
            SalesPattern::NoData => "Sin datos",
        }
    }

    pub fn parse(label: &str) -> Option<SalesPattern> {
        match label.trim() {
            "Acelerado" => Some(SalesPattern::Accelerated),
            "Constante" => Some(SalesPattern::Constant),
            "Desacelerado" => Some(SalesPattern::Decelerated),
            "Sin datos" => Some(SalesPattern::NoData),
            _ => None,
        }
    }
}

impl fmt::Display for SalesPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Classification result ───────────────────────────────────────────────────

/// Which link of the fallback chain produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClassificationMethod {
    Segment,
    Global,
    Heuristic,
    Default,
}

impl ClassificationMethod {
    pub fn label(&self) -> &'static str {
        match self {
            ClassificationMethod::Segment => "segmento",
            ClassificationMethod::Global => "global",
            ClassificationMethod::Heuristic => "heuristica",
            ClassificationMethod::Default => "por_defecto",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub tier: Tier,
    pub score: f64,
    pub method: ClassificationMethod,
}

impl ClassificationResult {
    /// Neutral verdict used when nothing else applies.
    pub fn neutral(method: ClassificationMethod) -> Self {
        Self {
            tier: Tier::Moderado,
            score: 0.5,
            method,
        }
    }
}

// ── Segments ────────────────────────────────────────────────────────────────

/// Comparison group of a project: zone × stratum × VIS type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Key(String),
    Unsegmented,
}

impl Segment {
    pub const UNSEGMENTED_LABEL: &'static str = "Sin_Segmento";

    /// Build a segment from its components; any missing part yields `Unsegmented`.
    pub fn from_parts<'a, I>(parts: I) -> Segment
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut key = Vec::new();
        for part in parts {
            match part.map(str::trim) {
                Some(p) if !is_missing_text(p) => key.push(p.to_string()),
                _ => return Segment::Unsegmented,
            }
        }
        if key.is_empty() {
            Segment::Unsegmented
        } else {
            Segment::Key(key.join("|"))
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Segment::Key(k) => k,
            Segment::Unsegmented => Self::UNSEGMENTED_LABEL,
        }
    }

    pub fn is_segmented(&self) -> bool {
        matches!(self, Segment::Key(_))
    }
}

/// Values that spreadsheet and dataframe exports use for "nothing here".
pub fn is_missing_text(value: &str) -> bool {
    let v = value.trim();
    v.is_empty()
        || v.eq_ignore_ascii_case("nan")
        || v.eq_ignore_ascii_case("none")
        || v.eq_ignore_ascii_case("null")
        || v.eq_ignore_ascii_case("n/a")
}

// ── Per-project records ─────────────────────────────────────────────────────

/// Sales-performance metrics derived for one project.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SalesMetrics {
    /// Units per month, never negative.
    pub velocity: f64,
    /// Undefined when there is no positive velocity.
    pub months_to_sellout: Option<f64>,
    pub months_since_launch: f64,
    /// Always set by [`crate::metrics::compute`] (missing counts read as 0).
    /// `None` only on records built by hand without inventory data.
    pub units_sold: Option<f64>,
    pub available: Option<f64>,
    pub total_units: Option<f64>,
}

impl SalesMetrics {
    pub fn has_valid_sellout(&self, max_months: f64) -> bool {
        matches!(self.months_to_sellout, Some(m) if m > 0.0 && m <= max_months)
    }

    /// Projects with unknown inventory count as still selling.
    pub fn is_active(&self) -> bool {
        self.available.map_or(true, |a| a > 0.0)
    }
}

/// Everything the classifiers need to know about one project row.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRecord {
    pub segment: Segment,
    pub metrics: SalesMetrics,
    /// Percent of units sold, `None` when it cannot be computed.
    pub penetration: Option<f64>,
    pub price_per_m2: Option<f64>,
    pub avg_area: Option<f64>,
    pub bedrooms: Option<f64>,
    pub bathrooms: Option<f64>,
    pub parking: Option<f64>,
    /// `None` when the source has no amenities column at all.
    pub amenity_count: Option<f64>,
}

impl ProjectRecord {
    pub fn new(segment: Segment, metrics: SalesMetrics) -> Self {
        Self {
            segment,
            metrics,
            penetration: None,
            price_per_m2: None,
            avg_area: None,
            bedrooms: None,
            bathrooms: None,
            parking: None,
            amenity_count: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_from_score_uses_thresholds() {
        let t = TierThresholds::default();
        assert_eq!(Tier::from_score(0.67, &t), Tier::Exitoso);
        assert_eq!(Tier::from_score(0.66, &t), Tier::Moderado);
        assert_eq!(Tier::from_score(0.33, &t), Tier::Moderado);
        assert_eq!(Tier::from_score(0.1, &t), Tier::Mejorable);
    }

    #[test]
    fn segment_with_missing_part_is_unsegmented() {
        let seg = Segment::from_parts([Some("Norte"), None, Some("VIS")]);
        assert_eq!(seg, Segment::Unsegmented);
        let seg = Segment::from_parts([Some("Norte"), Some("nan"), Some("VIS")]);
        assert_eq!(seg, Segment::Unsegmented);
    }

    #[test]
    fn segment_key_joins_parts() {
        let seg = Segment::from_parts([Some(" Norte "), Some("4"), Some("No VIS")]);
        assert_eq!(seg.label(), "Norte|4|No VIS");
        assert!(seg.is_segmented());
    }

    #[test]
    fn labels_round_trip() {
        for tier in Tier::ALL {
            assert_eq!(Tier::parse(tier.label()), Some(tier));
        }
        assert_eq!(SalesPattern::parse("Sin datos"), Some(SalesPattern::NoData));
        assert_eq!(Tier::parse("Excelente"), None);
    }

    #[test]
    fn unknown_inventory_counts_as_active() {
        let metrics = SalesMetrics::default();
        assert!(metrics.is_active());
        let sold_out = SalesMetrics {
            available: Some(0.0),
            ..SalesMetrics::default()
        };
        assert!(!sold_out.is_active());
    }
}
