use std::collections::HashSet;

use polars::prelude::*;
use tracing::{info, warn};

use crate::config::TierThresholds;
use crate::detect::{Field, SchemaMap};
use crate::error::{ClassifyError, Result};
use crate::frame;
use crate::model::{SalesPattern, Tier};
use crate::schema::{labels, metrics, output};

/// Final table plus what the assembler had to fix on the way.
#[derive(Debug, Clone)]
pub struct AssembledTable {
    pub frame: DataFrame,
    pub forced_tiers: usize,
    pub dropped_duplicates: Vec<String>,
}

fn non_negative(values: Vec<Option<f64>>) -> Vec<f64> {
    values
        .into_iter()
        .map(|v| v.map_or(0.0, |x| x.max(0.0)))
        .collect()
}

fn counts(values: Vec<Option<f64>>) -> Vec<i64> {
    values
        .into_iter()
        .map(|v| v.map_or(0, |x| x.max(0.0).round() as i64))
        .collect()
}

/// Numeric strata stay Int64; any textual value ("Rural", "Estrato 4")
/// keeps the whole column as text.
fn stratum_column(values: Vec<Option<String>>) -> Column {
    let parsed: Vec<Option<f64>> = values.iter().map(|v| v.as_deref().and_then(frame::to_num)).collect();
    let all_numeric = values.iter().zip(&parsed).all(|(raw, num)| raw.is_none() || num.is_some());
    if all_numeric {
        Column::new(output::STRATUM.into(), counts(parsed))
    } else {
        Column::new(output::STRATUM.into(), text_or(values, labels::NOT_AVAILABLE))
    }
}

fn text_or(values: Vec<Option<String>>, default: &str) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.unwrap_or_else(|| default.to_string()))
        .collect()
}

/// Seller codes exported from spreadsheets often come back as `123.0`.
pub fn clean_seller(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.strip_suffix(".0") {
        Some(code) if !code.is_empty() && code.chars().all(|c| c.is_ascii_digit()) => code.to_string(),
        _ => trimmed.to_string(),
    }
}

fn first_present(df: &DataFrame, candidates: &[Option<&str>]) -> Result<Vec<Option<f64>>> {
    let mut merged = vec![None; df.height()];
    for candidate in candidates {
        let values = frame::optional_numeric(df, *candidate)?;
        for (slot, v) in merged.iter_mut().zip(values) {
            if slot.is_none() {
                *slot = v.filter(|x| *x > 0.0);
            }
        }
    }
    Ok(merged)
}

/// Overlay the canonical output schema onto the classified table, enforce
/// its types and defaults, and drop duplicated columns.
///
/// Fails only on an empty table. Row count is preserved.
pub fn assemble(
    mut df: DataFrame,
    sources: &SchemaMap,
    project_key: Option<&str>,
    composite_thresholds: &TierThresholds,
) -> Result<AssembledTable> {
    let n = df.height();
    if n == 0 {
        return Err(ClassifyError::Structural("nothing to assemble: table is empty".into()));
    }

    // ── Identity ────────────────────────────────────────────────────────────
    let code_source = sources.get(Field::Code).or(project_key);
    let codes: Vec<String> = frame::optional_strings(&df, code_source)?
        .into_iter()
        .enumerate()
        .map(|(i, v)| v.unwrap_or_else(|| format!("SIN_CODIGO_{}", i + 1)))
        .collect();
    let names: Vec<String> = frame::optional_strings(&df, sources.get(Field::Name))?
        .into_iter()
        .zip(&codes)
        .map(|(name, code)| name.unwrap_or_else(|| code.clone()))
        .collect();

    // ── Classification ──────────────────────────────────────────────────────
    let raw_tiers = frame::optional_strings(&df, Some(output::TIER))?;
    let raw_scores = frame::optional_numeric(&df, Some(output::SCORE))?;
    let mut forced_tiers = 0;
    let mut tiers = Vec::with_capacity(n);
    let mut scores = Vec::with_capacity(n);
    for (tier, score) in raw_tiers.iter().zip(&raw_scores) {
        match tier.as_deref().and_then(Tier::parse) {
            Some(t) => {
                tiers.push(t.label().to_string());
                scores.push(score.map_or(0.5, |s| s.clamp(0.0, 1.0)));
            }
            None => {
                forced_tiers += 1;
                tiers.push(Tier::Moderado.label().to_string());
                scores.push(0.5);
            }
        }
    }
    if forced_tiers > 0 {
        warn!("{} rows carried an invalid tier and were set to Moderado", forced_tiers);
    }
    let methods = text_or(
        frame::optional_strings(&df, Some(output::METHOD))?,
        crate::model::ClassificationMethod::Default.label(),
    );

    let composite: Vec<f64> = frame::optional_numeric(&df, Some(output::COMPOSITE_SCORE))?
        .into_iter()
        .map(|v| v.map_or(0.5, |x| x.clamp(0.0, 1.0)))
        .collect();
    let composite_tiers: Vec<String> = frame::optional_strings(&df, Some(output::COMPOSITE_TIER))?
        .into_iter()
        .zip(&composite)
        .map(|(label, score)| {
            label.unwrap_or_else(|| {
                let tier = Tier::from_score(*score, composite_thresholds);
                format!("{}{}", tier.label(), labels::COMPOSITE_SUFFIX)
            })
        })
        .collect();

    // ── Location ────────────────────────────────────────────────────────────
    let zone = text_or(frame::optional_strings(&df, sources.get(Field::Zone))?, labels::NOT_AVAILABLE);
    let neighborhood = text_or(
        frame::optional_strings(&df, sources.get(Field::Neighborhood))?,
        labels::NOT_AVAILABLE,
    );
    let stratum = stratum_column(frame::optional_strings(&df, sources.get(Field::Stratum))?);
    let coordinates = text_or(frame::optional_strings(&df, sources.get(Field::Coordinates))?, "");
    let vis = text_or(frame::optional_strings(&df, sources.get(Field::VisType))?, labels::NOT_AVAILABLE);
    let seller: Vec<String> = frame::optional_strings(&df, sources.get(Field::Seller))?
        .into_iter()
        .map(|v| v.map_or_else(|| labels::NOT_AVAILABLE.to_string(), |s| clean_seller(&s)))
        .collect();

    // ── Commercial ──────────────────────────────────────────────────────────
    let avg_price = non_negative(first_present(
        &df,
        &[sources.get(Field::AvgPrice), sources.get(Field::UnitPrice)],
    )?);
    let avg_area = non_negative(first_present(
        &df,
        &[sources.get(Field::AvgArea), sources.get(Field::UnitArea)],
    )?);
    let velocity = non_negative(frame::optional_numeric(&df, Some(metrics::VELOCITY))?);
    let sold = counts(frame::optional_numeric(&df, Some(metrics::UNITS_SOLD))?);
    let available = counts(frame::optional_numeric(&df, sources.get(Field::AvailableUnits))?);
    let sellout: Vec<Option<f64>> = frame::optional_numeric(&df, Some(metrics::MONTHS_TO_SELLOUT))?
        .into_iter()
        .map(|v| v.map(|x| x.clamp(0.0, 120.0)))
        .collect();
    let since = non_negative(frame::optional_numeric(&df, Some(metrics::MONTHS_SINCE_LAUNCH))?);
    let patterns: Vec<String> = frame::optional_strings(&df, Some(output::PATTERN))?
        .into_iter()
        .map(|v| {
            v.and_then(|p| SalesPattern::parse(&p))
                .unwrap_or(SalesPattern::NoData)
                .label()
                .to_string()
        })
        .collect();

    let canonical: Vec<Column> = vec![
        Column::new(output::CODE.into(), codes),
        Column::new(output::NAME.into(), names),
        Column::new(output::TIER.into(), tiers),
        Column::new(output::SCORE.into(), scores),
        Column::new(output::METHOD.into(), methods),
        Column::new(output::COMPOSITE_SCORE.into(), composite),
        Column::new(output::COMPOSITE_TIER.into(), composite_tiers),
        Column::new(output::ZONE.into(), zone),
        Column::new(output::NEIGHBORHOOD.into(), neighborhood),
        stratum,
        Column::new(output::AVG_PRICE.into(), avg_price),
        Column::new(output::AVG_AREA.into(), avg_area),
        Column::new(output::VELOCITY.into(), velocity),
        Column::new(output::UNITS_SOLD.into(), sold),
        Column::new(output::UNITS_AVAILABLE.into(), available),
        Column::new(output::PATTERN.into(), patterns),
        frame::float_column(output::MONTHS_TO_SELLOUT, &sellout),
        Column::new(output::MONTHS_SINCE_LAUNCH.into(), since),
        Column::new(output::COORDINATES.into(), coordinates),
        Column::new(output::VIS_TYPE.into(), vis),
        Column::new(output::SELLER.into(), seller),
    ];
    for column in canonical {
        frame::upsert(&mut df, column)?;
    }

    let (frame, dropped_duplicates) = drop_duplicate_columns(&df)?;
    if !dropped_duplicates.is_empty() {
        info!("Dropped duplicate columns: {}", dropped_duplicates.join(", "));
    }

    Ok(AssembledTable {
        frame,
        forced_tiers,
        dropped_duplicates,
    })
}

fn same_content(a: &Column, b: &Column) -> bool {
    a.dtype() == b.dtype()
        && a.len() == b.len()
        && a.as_materialized_series()
            .equals_missing(b.as_materialized_series())
}

/// Remove columns whose content duplicates another column.
///
/// Only a non-canonical column that duplicates a canonical one is dropped.
/// Two non-canonical columns with equal content are both kept (a 2-unit
/// project has `_median == _mean`). Canonical columns come first in the
/// result.
pub fn drop_duplicate_columns(df: &DataFrame) -> Result<(DataFrame, Vec<String>)> {
    let names: Vec<String> = df.get_column_names_str().iter().map(|s| s.to_string()).collect();
    let mut dropped: HashSet<usize> = HashSet::new();

    for i in 0..names.len() {
        if dropped.contains(&i) {
            continue;
        }
        for j in (i + 1)..names.len() {
            if dropped.contains(&j) {
                continue;
            }
            if !same_content(df.column(&names[i])?, df.column(&names[j])?) {
                continue;
            }
            let loser = match (output::is_canonical(&names[i]), output::is_canonical(&names[j])) {
                (true, true) => continue,
                (true, false) => j,
                (false, true) => i,
                (false, false) => continue,
            };
            dropped.insert(loser);
            if loser == i {
                break;
            }
        }
    }

    let canonical_first = output::ALL
        .iter()
        .filter_map(|c| names.iter().position(|n| n == c))
        .filter(|i| !dropped.contains(i));
    let rest = (0..names.len()).filter(|i| !output::is_canonical(&names[*i]) && !dropped.contains(i));
    let keep: Vec<&str> = canonical_first.chain(rest).map(|i| names[i].as_str()).collect();

    let mut removed: Vec<usize> = dropped.into_iter().collect();
    removed.sort_unstable();
    let removed = removed.into_iter().map(|i| names[i].clone()).collect();

    Ok((df.select(keep)?, removed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seller_codes_lose_float_suffix() {
        assert_eq!(clean_seller("1234.0"), "1234");
        assert_eq!(clean_seller(" Constructora ABC "), "Constructora ABC");
        assert_eq!(clean_seller("2.05"), "2.05");
    }

    #[test]
    fn duplicate_seller_column_is_dropped() {
        let df = df!(
            "Constructor" => ["Alfa", "Beta"],
            "Vende" => ["Alfa", "Beta"],
            "Notas" => ["x", "y"],
        )
        .unwrap();
        let (out, dropped) = drop_duplicate_columns(&df).unwrap();
        assert_eq!(dropped, vec!["Constructor".to_string()]);
        assert_eq!(out.get_column_names_str(), vec!["Vende", "Notas"]);
    }

    #[test]
    fn equal_aggregate_columns_are_both_kept() {
        let df = df!(
            "Precio_median" => [100.0f64, 200.0],
            "Precio_mean" => [100.0f64, 200.0],
            "Banos_std" => [0.0f64, 0.0],
            "Garajes_std" => [0.0f64, 0.0],
        )
        .unwrap();
        let (out, dropped) = drop_duplicate_columns(&df).unwrap();
        assert!(dropped.is_empty());
        assert_eq!(out.width(), 4);
    }

    #[test]
    fn textual_stratum_is_kept() {
        let df = df!(
            "Cod proyecto" => ["P1", "P2", "P3"],
            "Estrato" => ["Estrato 4", "Rural", ""],
        )
        .unwrap();
        let mut sources = SchemaMap::default();
        sources.insert(Field::Stratum, "Estrato");
        let assembled = assemble(df, &sources, Some("Cod proyecto"), &TierThresholds::default()).unwrap();
        let column = assembled.frame.column(output::STRATUM).unwrap();
        assert_eq!(column.dtype(), &DataType::String);
        let strata = column.as_materialized_series().str().unwrap().clone();
        assert_eq!(strata.get(0), Some("Estrato 4"));
        assert_eq!(strata.get(1), Some("Rural"));
        assert_eq!(strata.get(2), Some("N/A"));
    }

    #[test]
    fn numeric_stratum_is_int() {
        let df = df!(
            "Cod proyecto" => ["P1", "P2"],
            "Estrato" => ["4", "3.0"],
        )
        .unwrap();
        let mut sources = SchemaMap::default();
        sources.insert(Field::Stratum, "Estrato");
        let assembled = assemble(df, &sources, Some("Cod proyecto"), &TierThresholds::default()).unwrap();
        let strata = assembled.frame.column(output::STRATUM).unwrap().as_materialized_series().i64().unwrap().clone();
        assert_eq!(strata.get(0), Some(4));
        assert_eq!(strata.get(1), Some(3));
    }

    #[test]
    fn empty_table_is_rejected() {
        let df = df!("a" => Vec::<String>::new()).unwrap();
        let result = assemble(df, &SchemaMap::default(), None, &TierThresholds::default());
        assert!(matches!(result, Err(ClassifyError::Structural(_))));
    }

    #[test]
    fn invalid_tiers_are_forced_and_defaults_applied() {
        let df = df!(
            "Cod proyecto" => ["P1", "P2"],
            output::TIER => ["Exitoso", "Excelente"],
            output::SCORE => [0.7, 0.9],
        )
        .unwrap();
        let assembled = assemble(df, &SchemaMap::default(), Some("Cod proyecto"), &TierThresholds::default())
            .unwrap();
        assert_eq!(assembled.forced_tiers, 1);
        let t = &assembled.frame;
        assert_eq!(t.height(), 2);
        let tiers = frame::string_values(t, output::TIER).unwrap();
        assert_eq!(tiers[1].as_deref(), Some("Moderado"));
        assert_eq!(frame::numeric_values(t, output::SCORE).unwrap()[1], Some(0.5));
        assert_eq!(frame::string_values(t, output::PATTERN).unwrap()[0].as_deref(), Some("Sin datos"));
        let zone = t.column(output::ZONE).unwrap().as_materialized_series().str().unwrap().get(0);
        assert_eq!(zone, Some("N/A"));
        assert_eq!(frame::string_values(t, output::CODE).unwrap()[0].as_deref(), Some("P1"));
        assert_eq!(t.get_column_names_str()[0], output::CODE);
    }
}
