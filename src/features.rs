use polars::prelude::*;
use tracing::{info, warn};

use crate::detect::{Field, SchemaMap};
use crate::error::Result;
use crate::frame;
use crate::model::SalesMetrics;
use crate::schema::features as cols;

/// Neutral percentile for projects without a price or a group.
pub const NEUTRAL_PERCENTILE: f64 = 50.0;

/// Engineered values the scorers read back, one per project row.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProjectFeatures {
    pub price_per_m2: Option<f64>,
    pub avg_price: Option<f64>,
    pub avg_area: Option<f64>,
    pub penetration: Option<f64>,
    pub price_pct_zone: Option<f64>,
    pub historical_velocity: Option<f64>,
    pub amenity_count: Option<f64>,
}

// ── Buckets ─────────────────────────────────────────────────────────────────

/// Right-closed bins `(edge[i-1], edge[i]]`, open below the first edge.
fn bucket(value: Option<f64>, edges: &[f64], labels: &[&'static str]) -> Option<&'static str> {
    let v = value?;
    if v <= 0.0 {
        return None;
    }
    edges
        .iter()
        .position(|edge| v <= *edge)
        .map(|i| labels[i])
        .or_else(|| labels.last().copied())
}

pub fn size_bucket(total_units: Option<f64>) -> Option<&'static str> {
    bucket(
        total_units,
        &[50.0, 100.0, 200.0],
        &["Pequeño", "Mediano", "Grande", "Muy Grande"],
    )
}

pub fn age_bucket(months_since_launch: f64) -> Option<&'static str> {
    bucket(
        Some(months_since_launch),
        &[6.0, 12.0, 24.0, 36.0],
        &["Muy Nuevo", "Nuevo", "Mediano", "Antiguo", "Muy Antiguo"],
    )
}

pub fn area_bucket(avg_area: Option<f64>) -> Option<&'static str> {
    bucket(
        avg_area,
        &[60.0, 80.0, 100.0, 120.0],
        &["Muy Pequeña", "Pequeña", "Mediana", "Grande", "Muy Grande"],
    )
}

// ── Ratios ──────────────────────────────────────────────────────────────────

/// Percent of units sold; undefined when nothing was ever on sale. A
/// missing available count reads as 0.
pub fn penetration(units_sold: Option<f64>, available: Option<f64>) -> Option<f64> {
    let sold = units_sold?;
    let available = available.unwrap_or(0.0).max(0.0);
    let total = sold + available;
    (total > 0.0).then(|| (sold / total * 100.0).clamp(0.0, 100.0))
}

pub fn sold_available_ratio(units_sold: Option<f64>, available: Option<f64>) -> f64 {
    match (units_sold, available) {
        (Some(sold), Some(avail)) if avail > 0.0 => (sold / avail).clamp(0.0, 10.0),
        _ => 0.0,
    }
}

pub fn historical_velocity(units_sold: Option<f64>, months_since_launch: f64) -> Option<f64> {
    units_sold.map(|sold| (sold / months_since_launch.max(0.1)).clamp(0.0, 100.0))
}

pub fn count_amenities(text: &str) -> usize {
    text.split(',').filter(|s| !s.trim().is_empty()).count()
}

fn positive(v: Option<f64>) -> Option<f64> {
    v.filter(|x| *x > 0.0)
}

// ── Price position ──────────────────────────────────────────────────────────

/// Percentile rank (0-100, ties averaged) of each value within its group.
/// Rows with a missing value or group get `None`.
pub fn percentile_within(values: &[Option<f64>], groups: &[Option<String>]) -> Result<Vec<Option<f64>>> {
    const VALUE: &str = "valor";
    const GROUP: &str = "grupo";
    const PCT: &str = "percentil";

    let ranked = DataFrame::new(vec![frame::float_column(VALUE, values), frame::text_column(GROUP, groups)])?
        .lazy()
        .select([when(col(GROUP).is_not_null())
            .then(
                col(VALUE)
                    .rank(
                        RankOptions {
                            method: RankMethod::Average,
                            descending: false,
                        },
                        None,
                    )
                    .over([col(GROUP)])
                    .cast(DataType::Float64)
                    / col(VALUE).count().over([col(GROUP)]).cast(DataType::Float64)
                    * lit(100.0),
            )
            .otherwise(lit(NULL))
            .alias(PCT)])
        .collect()?;
    frame::numeric_values(&ranked, PCT)
}

// ── Stage ───────────────────────────────────────────────────────────────────

/// Add engineered feature columns. Features whose source data is missing
/// are skipped; on any failure the table is left exactly as it was.
pub fn annotate(df: &mut DataFrame, sources: &SchemaMap, metrics: &[SalesMetrics]) -> Vec<ProjectFeatures> {
    match build(df, sources, metrics) {
        Ok((next, features)) => {
            *df = next;
            features
        }
        Err(e) => {
            warn!("feature engineering failed, continuing without features: {}", e);
            vec![ProjectFeatures::default(); df.height()]
        }
    }
}

fn build(
    df: &DataFrame,
    sources: &SchemaMap,
    metrics: &[SalesMetrics],
) -> Result<(DataFrame, Vec<ProjectFeatures>)> {
    let n = df.height();
    let mut next = df.clone();

    let avg_area = prefer(
        frame::optional_numeric(df, sources.get(Field::AvgArea))?,
        frame::optional_numeric(df, sources.get(Field::UnitArea))?,
    );
    let avg_price = prefer(
        frame::optional_numeric(df, sources.get(Field::AvgPrice))?,
        frame::optional_numeric(df, sources.get(Field::UnitPrice))?,
    );
    let direct_pm2 = frame::optional_numeric(df, sources.get(Field::PricePerM2))?;
    let price_per_m2: Vec<Option<f64>> = (0..n)
        .map(|i| {
            positive(direct_pm2[i]).or_else(|| match (positive(avg_price[i]), positive(avg_area[i])) {
                (Some(p), Some(a)) => Some(p / a),
                _ => None,
            })
        })
        .collect();
    let has_price = price_per_m2.iter().any(Option::is_some);

    let zone = frame::optional_strings(df, sources.get(Field::Zone))?;
    let stratum = frame::optional_strings(df, sources.get(Field::Stratum))?;

    // ── Price position ──────────────────────────────────────────────────────
    let mut pct_zone = vec![None; n];
    if has_price && sources.has(Field::Zone) {
        pct_zone = percentile_within(&price_per_m2, &zone)?;
        let filled: Vec<f64> = pct_zone.iter().map(|v| v.unwrap_or(NEUTRAL_PERCENTILE)).collect();
        frame::upsert(&mut next, Column::new(cols::PRICE_PCT_ZONE.into(), filled))?;
    }
    if has_price && sources.has(Field::Stratum) {
        let pct: Vec<f64> = percentile_within(&price_per_m2, &stratum)?
            .into_iter()
            .map(|v| v.unwrap_or(NEUTRAL_PERCENTILE))
            .collect();
        frame::upsert(&mut next, Column::new(cols::PRICE_PCT_STRATUM.into(), pct))?;
    }

    // ── Size ────────────────────────────────────────────────────────────────
    let total: Vec<Option<f64>> = metrics.iter().map(|m| m.total_units).collect();
    if total.iter().any(Option::is_some) {
        let buckets: Vec<Option<&str>> = total.iter().map(|t| size_bucket(*t)).collect();
        frame::upsert(&mut next, frame::text_column(cols::SIZE_BUCKET, &buckets))?;
        let log_size: Vec<Option<f64>> = total.iter().map(|t| t.map(|v| v.max(0.0).ln_1p())).collect();
        frame::upsert(&mut next, frame::float_column(cols::LOG_SIZE, &log_size))?;
    }

    // ── Sales progress ──────────────────────────────────────────────────────
    let has_inventory = sources.has(Field::AvailableUnits);
    let penetration: Vec<Option<f64>> = metrics
        .iter()
        .map(|m| if has_inventory { penetration(m.units_sold, m.available) } else { None })
        .collect();
    if has_inventory {
        frame::upsert(&mut next, frame::float_column(cols::PENETRATION, &penetration))?;
        let ratio: Vec<f64> = metrics
            .iter()
            .map(|m| sold_available_ratio(m.units_sold, m.available))
            .collect();
        frame::upsert(&mut next, Column::new(cols::SOLD_AVAILABLE_RATIO.into(), ratio))?;
    }

    // ── Age ─────────────────────────────────────────────────────────────────
    let historical: Vec<Option<f64>> = metrics
        .iter()
        .map(|m| historical_velocity(m.units_sold, m.months_since_launch))
        .collect();
    if sources.has(Field::LaunchDate) {
        let ages: Vec<Option<&str>> = metrics.iter().map(|m| age_bucket(m.months_since_launch)).collect();
        frame::upsert(&mut next, frame::text_column(cols::AGE_BUCKET, &ages))?;
        if has_inventory {
            frame::upsert(&mut next, frame::float_column(cols::HISTORICAL_VELOCITY, &historical))?;
        }
    }

    // ── Area and density ────────────────────────────────────────────────────
    if avg_area.iter().any(Option::is_some) {
        let areas: Vec<Option<&str>> = avg_area.iter().map(|a| area_bucket(*a)).collect();
        frame::upsert(&mut next, frame::text_column(cols::AREA_BUCKET, &areas))?;
        if has_price {
            let density: Vec<f64> = (0..n)
                .map(|i| match (price_per_m2[i], positive(avg_area[i])) {
                    (Some(p), Some(a)) => p * a,
                    _ => 0.0,
                })
                .collect();
            frame::upsert(&mut next, Column::new(cols::PRICE_AREA_DENSITY.into(), density))?;
        }
    }

    if sources.has(Field::Zone) && sources.has(Field::Stratum) {
        let combined: Vec<Option<String>> = zone
            .iter()
            .zip(&stratum)
            .map(|(z, s)| match (z, s) {
                (Some(z), Some(s)) => Some(format!("{z}_{s}")),
                _ => None,
            })
            .collect();
        frame::upsert(&mut next, frame::text_column(cols::ZONE_STRATUM, &combined))?;
    }

    // ── Amenities ───────────────────────────────────────────────────────────
    let amenity_count: Vec<Option<f64>> = match sources.get(Field::Amenities) {
        Some(column) if df.schema().contains(column) => {
            let text = frame::string_values(df, column)?;
            let counts: Vec<Option<f64>> = text
                .iter()
                .map(|t| Some(t.as_deref().map_or(0, count_amenities) as f64))
                .collect();
            frame::upsert(&mut next, frame::float_column(cols::AMENITY_COUNT, &counts))?;
            counts
        }
        _ => vec![None; n],
    };

    let features = (0..n)
        .map(|i| ProjectFeatures {
            price_per_m2: price_per_m2[i],
            avg_price: avg_price[i],
            avg_area: avg_area[i],
            penetration: penetration[i],
            price_pct_zone: pct_zone[i],
            historical_velocity: historical[i],
            amenity_count: amenity_count[i],
        })
        .collect();

    info!("Engineered {} feature columns", next.width() - df.width());
    Ok((next, features))
}

fn prefer(primary: Vec<Option<f64>>, fallback: Vec<Option<f64>>) -> Vec<Option<f64>> {
    primary
        .into_iter()
        .zip(fallback)
        .map(|(p, f)| positive(p).or(positive(f)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_are_right_closed() {
        assert_eq!(size_bucket(Some(50.0)), Some("Pequeño"));
        assert_eq!(size_bucket(Some(50.5)), Some("Mediano"));
        assert_eq!(size_bucket(Some(250.0)), Some("Muy Grande"));
        assert_eq!(size_bucket(Some(0.0)), None);
        assert_eq!(size_bucket(None), None);
        assert_eq!(age_bucket(6.0), Some("Muy Nuevo"));
        assert_eq!(age_bucket(40.0), Some("Muy Antiguo"));
        assert_eq!(area_bucket(Some(75.0)), Some("Pequeña"));
    }

    #[test]
    fn penetration_guards_empty_inventory() {
        assert_eq!(penetration(Some(30.0), Some(70.0)), Some(30.0));
        assert_eq!(penetration(Some(0.0), Some(0.0)), None);
        assert_eq!(penetration(None, Some(10.0)), None);
        assert_eq!(penetration(Some(0.0), Some(10.0)), Some(0.0));
        assert_eq!(penetration(Some(30.0), None), Some(100.0));
    }

    #[test]
    fn ratios_are_clamped() {
        assert_eq!(sold_available_ratio(Some(500.0), Some(1.0)), 10.0);
        assert_eq!(sold_available_ratio(Some(5.0), Some(0.0)), 0.0);
        assert_eq!(historical_velocity(Some(50.0), 0.0), Some(100.0));
        assert_eq!(historical_velocity(Some(50.0), 10.0), Some(5.0));
    }

    #[test]
    fn amenities_are_counted_by_comma() {
        assert_eq!(count_amenities("piscina, gimnasio,, bbq "), 3);
        assert_eq!(count_amenities(""), 0);
    }

    #[test]
    fn percentiles_average_ties_within_groups() {
        let values = [Some(10.0), Some(20.0), Some(20.0), Some(5.0), None, Some(7.0)];
        let groups: Vec<Option<String>> = ["a", "a", "a", "b", "b", ""]
            .iter()
            .map(|g| (!g.is_empty()).then(|| g.to_string()))
            .collect();
        let pct = percentile_within(&values, &groups).unwrap();
        assert!((pct[0].unwrap() - 100.0 / 3.0).abs() < 1e-9);
        assert!((pct[1].unwrap() - 250.0 / 3.0).abs() < 1e-9);
        assert_eq!(pct[1], pct[2]);
        assert_eq!(pct[3], Some(100.0));
        assert_eq!(pct[4], None);
        assert_eq!(pct[5], None);
    }

    #[test]
    fn annotate_adds_percentiles_and_keeps_rows() {
        let mut df = df!(
            "Zona" => ["Norte", "Norte", "Sur"],
            "Precio m2 promedio" => ["5000", "7000", ""],
            "Otros" => ["piscina, bbq", "", "gimnasio"],
        )
        .unwrap();
        let headers = df.get_column_names_str();
        let sources = crate::detect::detect(&headers, &Field::PROJECT_FIELDS);
        let metrics = vec![SalesMetrics::default(); 3];
        let features = annotate(&mut df, &sources, &metrics);

        assert_eq!(df.height(), 3);
        let pct = frame::numeric_values(&df, cols::PRICE_PCT_ZONE).unwrap();
        assert_eq!(pct, vec![Some(50.0), Some(100.0), Some(50.0)]);
        assert_eq!(features[0].amenity_count, Some(2.0));
        assert_eq!(features[1].amenity_count, Some(0.0));
        assert!(features[2].price_per_m2.is_none());
    }
}
