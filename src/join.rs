use std::collections::BTreeMap;

use polars::prelude::*;
use tracing::{info, warn};

use crate::detect::{Field, SchemaMap};
use crate::error::{ClassifyError, Result};
use crate::frame;
use crate::schema::aggregate::{self, JOIN_KEY, ROW_INDEX};

/// Names of the per-project summary columns built from one unit column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateColumns {
    pub median: String,
    pub mean: String,
    pub std: String,
}

impl AggregateColumns {
    fn for_source(source: &str) -> Self {
        Self {
            median: format!("{source}{}", aggregate::MEDIAN_SUFFIX),
            mean: format!("{source}{}", aggregate::MEAN_SUFFIX),
            std: format!("{source}{}", aggregate::STD_SUFFIX),
        }
    }
}

/// One row per project with unit-level summaries attached.
#[derive(Debug, Clone)]
pub struct JoinedProjects {
    pub frame: DataFrame,
    pub unit_columns: BTreeMap<Field, AggregateColumns>,
    pub units_matched: usize,
    pub units_dropped: usize,
    pub duplicate_projects: usize,
}

impl JoinedProjects {
    pub fn unit_median(&self, field: Field) -> Option<&str> {
        self.unit_columns.get(&field).map(|c| c.median.as_str())
    }
}

/// `df` plus the normalized join key as [`JOIN_KEY`].
fn with_join_key(df: &DataFrame, source: &str) -> Result<DataFrame> {
    let keys = frame::key_values(df, source)?;
    let mut out = df.clone();
    out.with_column(frame::text_column(JOIN_KEY, &keys))?;
    Ok(out)
}

/// The unit columns the aggregation reads: the key, every resolved numeric
/// field parsed to Float64, and the unit-only columns carried as text or
/// numbers.
fn prepare_units(
    units: &DataFrame,
    unit_key: &str,
    numeric: &[&str],
    carried: &[&str],
) -> Result<DataFrame> {
    let keys = frame::key_values(units, unit_key)?;
    let mut columns = vec![frame::text_column(JOIN_KEY, &keys)];
    for source in numeric {
        columns.push(frame::float_column(source, &frame::numeric_values(units, source)?));
    }
    for name in carried {
        let dtype = units.column(name)?.dtype().clone();
        if dtype.is_float() || dtype.is_integer() {
            columns.push(frame::float_column(name, &frame::numeric_values(units, name)?));
        } else {
            columns.push(frame::text_column(name, &frame::string_values(units, name)?));
        }
    }
    Ok(DataFrame::new(columns)?)
}

/// Left-join units onto projects and collapse them to one row per project.
///
/// Project columns are carried unchanged ("first" row per key); every
/// resolved unit numeric column contributes median / mean / std columns;
/// remaining unit-only columns are carried as the first unit's value.
pub fn join_and_aggregate(
    units: &DataFrame,
    projects: &DataFrame,
    unit_key: &str,
    project_key: &str,
    unit_fields: &SchemaMap,
) -> Result<JoinedProjects> {
    if projects.height() == 0 {
        return Err(ClassifyError::Structural("project table is empty".into()));
    }
    if units.height() == 0 {
        return Err(ClassifyError::Structural("unit table is empty".into()));
    }

    // ── Deduplicate projects by key ─────────────────────────────────────────
    // Rows without a key are all kept; they can never match a unit.
    let deduped = with_join_key(projects, project_key)?
        .lazy()
        .with_row_index(ROW_INDEX, None)
        .filter(
            col(JOIN_KEY)
                .is_null()
                .or(col(ROW_INDEX).eq(col(ROW_INDEX).min().over([col(JOIN_KEY)]))),
        )
        .collect()?;
    let duplicate_projects = projects.height() - deduped.height();
    if duplicate_projects > 0 {
        warn!("{} duplicate project rows collapsed to their first occurrence", duplicate_projects);
    }

    // ── Match units to projects ─────────────────────────────────────────────
    let mut unit_columns = BTreeMap::new();
    let mut numeric: Vec<&str> = Vec::new();
    for (field, source) in unit_fields.iter() {
        if source == unit_key {
            continue;
        }
        unit_columns.insert(field, AggregateColumns::for_source(source));
        if !numeric.contains(&source) {
            numeric.push(source);
        }
    }
    let project_schema = projects.schema();
    let carried: Vec<&str> = units
        .get_column_names_str()
        .into_iter()
        .filter(|name| *name != unit_key && !numeric.contains(name) && !project_schema.contains(name))
        .collect();

    let known_keys = deduped.select([JOIN_KEY])?.lazy().filter(col(JOIN_KEY).is_not_null());
    // Unit order decides which value a carried column keeps.
    let matched = prepare_units(units, unit_key, &numeric, &carried)?
        .lazy()
        .with_row_index(ROW_INDEX, None)
        .join(
            known_keys,
            [col(JOIN_KEY)],
            [col(JOIN_KEY)],
            JoinArgs::new(JoinType::Inner),
        )
        .sort([ROW_INDEX], SortMultipleOptions::default())
        .collect()?;
    let units_matched = matched.height();
    let units_dropped = units.height() - units_matched;
    if units_matched == 0 {
        return Err(ClassifyError::Structural(format!(
            "no unit matched a project ('{unit_key}' vs '{project_key}')"
        )));
    }
    if units_dropped > 0 {
        warn!("{} units without a matching project were discarded", units_dropped);
    }

    // ── Per-project summaries ───────────────────────────────────────────────
    let mut summaries: Vec<Expr> = Vec::with_capacity(numeric.len() * 3 + carried.len() + 1);
    for source in &numeric {
        let names = AggregateColumns::for_source(source);
        summaries.push(col(*source).median().alias(names.median.as_str()));
        summaries.push(col(*source).mean().alias(names.mean.as_str()));
        // sample std; a single value has none
        summaries.push(
            col(*source)
                .std(1)
                .fill_nan(lit(NULL))
                .alias(names.std.as_str()),
        );
    }
    summaries.push(len().alias(aggregate::UNIT_COUNT));
    for name in &carried {
        summaries.push(col(*name).first());
    }
    let per_project = matched.lazy().group_by([col(JOIN_KEY)]).agg(summaries);

    let out = deduped
        .lazy()
        .join(
            per_project,
            [col(JOIN_KEY)],
            [col(JOIN_KEY)],
            JoinArgs::new(JoinType::Left),
        )
        .with_column(
            col(aggregate::UNIT_COUNT)
                .fill_null(lit(0))
                .cast(DataType::Int64),
        )
        .sort([ROW_INDEX], SortMultipleOptions::default())
        .collect()?
        .drop(ROW_INDEX)?
        .drop(JOIN_KEY)?;

    info!(
        "Joined {} units onto {} projects ({} dropped)",
        units_matched,
        out.height(),
        units_dropped
    );

    Ok(JoinedProjects {
        frame: out,
        unit_columns,
        units_matched,
        units_dropped,
        duplicate_projects,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::detect;

    fn units() -> DataFrame {
        df!(
            "Codigo de proyecto" => ["P1", "P1", "P1", "P2", "P9"],
            "Precio" => ["100", "200", "300", "50", "999"],
            "Alcobas" => ["2", "3", "3", "1", "4"],
            "Torre" => ["A", "B", "C", "D", "E"],
        )
        .unwrap()
    }

    fn projects() -> DataFrame {
        df!(
            "Cod proyecto" => ["P1", "P2", "P3", "P1"],
            "Zona" => ["Norte", "Sur", "Norte", "Duplicada"],
        )
        .unwrap()
    }

    fn join() -> JoinedProjects {
        let u = units();
        let headers = u.get_column_names_str();
        let fields = detect(&headers, &Field::UNIT_FIELDS);
        join_and_aggregate(&u, &projects(), "Codigo de proyecto", "Cod proyecto", &fields).unwrap()
    }

    #[test]
    fn keeps_every_project_once() {
        let joined = join();
        assert_eq!(joined.frame.height(), 3);
        assert_eq!(joined.duplicate_projects, 1);
        let zones = frame::string_values(&joined.frame, "Zona").unwrap();
        assert_eq!(zones[0].as_deref(), Some("Norte"));
    }

    #[test]
    fn unmatched_units_are_dropped_and_counted() {
        let joined = join();
        assert_eq!(joined.units_dropped, 1);
        assert_eq!(joined.units_matched, 4);
        let counts = frame::numeric_values(&joined.frame, aggregate::UNIT_COUNT).unwrap();
        assert_eq!(counts, vec![Some(3.0), Some(1.0), Some(0.0)]);
    }

    #[test]
    fn unit_numbers_are_summarized() {
        let joined = join();
        let median = joined.unit_median(Field::UnitPrice).unwrap();
        let values = frame::numeric_values(&joined.frame, median).unwrap();
        assert_eq!(values, vec![Some(200.0), Some(50.0), None]);
        let std = frame::numeric_values(&joined.frame, "Precio_std").unwrap();
        assert!((std[0].unwrap() - 100.0).abs() < 1e-9);
        assert_eq!(std[1], None);
    }

    #[test]
    fn unit_only_columns_take_first_value() {
        let joined = join();
        let towers = frame::string_values(&joined.frame, "Torre").unwrap();
        assert_eq!(towers, vec![Some("A".to_string()), Some("D".to_string()), None]);
    }

    #[test]
    fn keyless_projects_are_kept_without_units() {
        let u = df!("Codigo de proyecto" => ["P1", ""], "Precio" => ["10", "20"]).unwrap();
        let p = df!("Cod proyecto" => ["P1", "", "nan"], "Zona" => ["A", "B", "C"]).unwrap();
        let headers = u.get_column_names_str();
        let fields = detect(&headers, &Field::UNIT_FIELDS);
        let joined = join_and_aggregate(&u, &p, "Codigo de proyecto", "Cod proyecto", &fields).unwrap();
        assert_eq!(joined.frame.height(), 3);
        assert_eq!(joined.duplicate_projects, 0);
        assert_eq!(joined.units_dropped, 1);
        let counts = frame::numeric_values(&joined.frame, aggregate::UNIT_COUNT).unwrap();
        assert_eq!(counts, vec![Some(1.0), Some(0.0), Some(0.0)]);
        assert!(!joined.frame.schema().contains(JOIN_KEY));
        assert!(!joined.frame.schema().contains(ROW_INDEX));
    }

    #[test]
    fn no_matching_units_is_structural() {
        let u = df!("Codigo de proyecto" => ["X"], "Precio" => ["1"]).unwrap();
        let err = join_and_aggregate(&u, &projects(), "Codigo de proyecto", "Cod proyecto", &SchemaMap::default())
            .unwrap_err();
        assert!(matches!(err, ClassifyError::Structural(_)));
    }
}
