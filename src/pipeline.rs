//! The classification run: join → metrics → anomalies → features →
//! composite / regression diagnostics → sales pattern → tier chain →
//! output assembly → cohort profile.

use std::collections::BTreeMap;

use chrono::{Local, NaiveDate};
use polars::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::anomaly;
use crate::assemble;
use crate::classifier;
use crate::cohort::{self, CohortProfile};
use crate::composite;
use crate::config::EngineConfig;
use crate::detect::{self, Field, SchemaMap};
use crate::error::{ClassifyError, Result};
use crate::features::{self, ProjectFeatures};
use crate::frame;
use crate::join;
use crate::metrics;
use crate::model::{ClassificationResult, ProjectRecord, SalesMetrics, SalesPattern, Segment, Tier};
use crate::pattern;
use crate::regression::{self, RegressionReport};
use crate::schema::{classification, output};

/// Counters describing what a run did to its input.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub units_matched: usize,
    pub units_dropped: usize,
    pub duplicate_projects: usize,
    pub projects: usize,
    pub anomalies: usize,
    pub tier_counts: BTreeMap<String, usize>,
    pub method_counts: BTreeMap<String, usize>,
    /// Projects the chain could not place plus invalid tiers fixed at assembly.
    pub forced_corrections: usize,
    pub dropped_duplicates: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ClassificationRun {
    /// One row per project: canonical columns first, then every preserved column.
    pub table: DataFrame,
    pub summary: RunSummary,
    pub regression: Option<RegressionReport>,
    pub cohort: CohortProfile,
    /// Source column of each logical field. Columns dropped as duplicates
    /// during assembly are no longer in `table`.
    pub sources: SchemaMap,
}

#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    as_of: Option<NaiveDate>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config, as_of: None }
    }

    /// Fix the reference date used for project ages. Defaults to today.
    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn classify(&self, units: &DataFrame, projects: &DataFrame) -> Result<ClassificationRun> {
        let as_of = self.as_of.unwrap_or_else(|| Local::now().date_naive());
        let max_months = self.config.segment.max_months_to_sellout;
        info!(
            "Classifying {} projects with {} units (as of {})",
            projects.height(),
            units.height(),
            as_of
        );

        // ── Schema & join ───────────────────────────────────────────────────
        let unit_headers = units.get_column_names_str();
        let project_headers = projects.get_column_names_str();
        let keys = detect::join_keys(&unit_headers, &project_headers);
        let (unit_key, project_key) = keys.resolved().ok_or_else(|| {
            ClassifyError::Structural(format!(
                "no join key between units ({:?}) and projects ({:?})",
                keys.unit, keys.project
            ))
        })?;
        info!("Join keys: units.{} = projects.{}", unit_key, project_key);

        let mut unit_fields = detect::detect(&unit_headers, &Field::UNIT_FIELDS);
        // The unit-side key column is never a measurement.
        let key_fields: Vec<Field> = unit_fields
            .iter()
            .filter(|(_, column)| *column == unit_key)
            .map(|(field, _)| field)
            .collect();
        if !key_fields.is_empty() {
            let mut kept = SchemaMap::default();
            for (field, column) in unit_fields.iter() {
                if !key_fields.contains(&field) {
                    kept.insert(field, column);
                }
            }
            unit_fields = kept;
        }
        let project_fields = detect::detect(&project_headers, &Field::PROJECT_FIELDS);
        for field in Field::PROJECT_FIELDS {
            if !project_fields.has(field) {
                warn!("Project field {} not found, related features are skipped", field);
            }
        }

        let joined = join::join_and_aggregate(units, projects, unit_key, project_key, &unit_fields)?;
        let mut sources = project_fields.clone();
        for field in Field::UNIT_FIELDS {
            if let Some(median) = joined.unit_median(field) {
                sources.insert(field, median);
            }
        }
        let mut df = joined.frame;

        // ── Derived columns ─────────────────────────────────────────────────
        let sales = metrics::annotate(&mut df, &sources, as_of, max_months)?;
        let flags = anomaly::annotate(&mut df, &sales, max_months)?;
        let engineered = features::annotate(&mut df, &sources, &sales);
        composite::annotate(&mut df, &sales, &engineered, &self.config.composite)?;
        let regression = regression::diagnose(
            &df,
            &sources,
            &sales,
            &flags,
            max_months,
            &self.config.regression,
        )?;

        // ── Classification ──────────────────────────────────────────────────
        let records = project_records(&df, &sources, &sales, &engineered)?;
        let patterns = pattern::classify_all(&records);
        let outcome = classifier::classify(&records, &patterns, &self.config);
        write_classification(&mut df, &records, &patterns, &outcome.results)?;

        // ── Output ──────────────────────────────────────────────────────────
        let assembled = assemble::assemble(
            df,
            &sources,
            Some(project_key),
            &self.config.composite.thresholds,
        )?;
        let table = assembled.frame;
        let cohort = cohort::profile(&table, &sources)?;

        let mut tier_counts: BTreeMap<String, usize> = Tier::ALL
            .iter()
            .map(|t| (t.label().to_string(), 0))
            .collect();
        for label in frame::string_values(&table, output::TIER)?.into_iter().flatten() {
            *tier_counts.entry(label).or_default() += 1;
        }
        let method_counts = outcome
            .method_counts
            .iter()
            .map(|(m, c)| (m.label().to_string(), *c))
            .collect();

        let summary = RunSummary {
            units_matched: joined.units_matched,
            units_dropped: joined.units_dropped,
            duplicate_projects: joined.duplicate_projects,
            projects: table.height(),
            anomalies: flags.iter().filter(|f| **f).count(),
            tier_counts,
            method_counts,
            forced_corrections: outcome.forced_corrections + assembled.forced_tiers,
            dropped_duplicates: assembled.dropped_duplicates,
        };
        info!(
            "Run complete: {} projects, tiers {:?}, {} anomalies",
            summary.projects, summary.tier_counts, summary.anomalies
        );

        Ok(ClassificationRun {
            table,
            summary,
            regression,
            cohort,
            sources,
        })
    }
}

/// Classify with the default configuration and today's date.
pub fn classify(units: &DataFrame, projects: &DataFrame) -> Result<ClassificationRun> {
    Engine::default().classify(units, projects)
}

fn project_records(
    df: &DataFrame,
    sources: &SchemaMap,
    sales: &[SalesMetrics],
    engineered: &[ProjectFeatures],
) -> Result<Vec<ProjectRecord>> {
    let zone = frame::optional_strings(df, sources.get(Field::Zone))?;
    let stratum = match sources.get(Field::Stratum) {
        Some(column) => frame::key_values(df, column)?,
        None => vec![None; df.height()],
    };
    let vis = frame::optional_strings(df, sources.get(Field::VisType))?;
    let bedrooms = frame::optional_numeric(df, sources.get(Field::Bedrooms))?;
    let bathrooms = frame::optional_numeric(df, sources.get(Field::Bathrooms))?;
    let parking = frame::optional_numeric(df, sources.get(Field::Parking))?;

    Ok((0..df.height())
        .map(|i| {
            let segment = Segment::from_parts([
                zone[i].as_deref(),
                stratum[i].as_deref(),
                vis[i].as_deref(),
            ]);
            let f = &engineered[i];
            ProjectRecord {
                penetration: f.penetration,
                price_per_m2: f.price_per_m2,
                avg_area: f.avg_area,
                bedrooms: bedrooms[i],
                bathrooms: bathrooms[i],
                parking: parking[i],
                amenity_count: f.amenity_count,
                ..ProjectRecord::new(segment, sales[i])
            }
        })
        .collect())
}

fn write_classification(
    df: &mut DataFrame,
    records: &[ProjectRecord],
    patterns: &[SalesPattern],
    results: &[ClassificationResult],
) -> Result<()> {
    let tiers: Vec<&str> = results.iter().map(|r| r.tier.label()).collect();
    let scores: Vec<f64> = results.iter().map(|r| r.score).collect();
    let methods: Vec<&str> = results.iter().map(|r| r.method.label()).collect();
    let labels: Vec<&str> = patterns.iter().map(|p| p.label()).collect();
    let segments: Vec<&str> = records.iter().map(|r| r.segment.label()).collect();

    frame::upsert(df, Column::new(output::TIER.into(), tiers))?;
    frame::upsert(df, Column::new(output::SCORE.into(), scores))?;
    frame::upsert(df, Column::new(output::METHOD.into(), methods))?;
    frame::upsert(df, Column::new(output::PATTERN.into(), labels))?;
    frame::upsert(df, Column::new(classification::SEGMENT.into(), segments))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn missing_join_key_is_structural() {
        let units = df!("precio" => ["100"]).unwrap();
        let projects = df!("zona" => ["Norte"]).unwrap();
        let err = Engine::default().with_as_of(as_of()).classify(&units, &projects);
        assert!(matches!(err, Err(ClassifyError::Structural(_))));
    }

    #[test]
    fn unmatched_units_are_structural() {
        let units = df!("Codigo Proyecto" => ["9"], "Precio" => ["100"]).unwrap();
        let projects = df!("Cod Proyecto" => ["1"], "Zona" => ["Norte"]).unwrap();
        let err = Engine::default().with_as_of(as_of()).classify(&units, &projects);
        assert!(matches!(err, Err(ClassifyError::Structural(_))));
    }

    #[test]
    fn single_project_gets_one_row() {
        let units = df!(
            "Codigo Proyecto" => ["1", "1"],
            "Precio" => ["200000000", "220000000"],
            "Area" => ["60", "70"],
        )
        .unwrap();
        let projects = df!(
            "Cod Proyecto" => ["1"],
            "Proyecto" => ["Torre Uno"],
            "Unidades Disponibles" => ["10"],
            "Unidades Totales Proyecto" => ["40"],
            "Ventas Promedio Mes Unidades" => ["3"],
        )
        .unwrap();
        let run = Engine::default().with_as_of(as_of()).classify(&units, &projects).unwrap();
        assert_eq!(run.table.height(), 1);
        assert_eq!(run.summary.units_matched, 2);
        assert_eq!(run.summary.projects, 1);
        assert_eq!(run.summary.tier_counts.values().sum::<usize>(), 1);
    }

    #[test]
    fn available_count_alone_reaches_the_penetration_rule() {
        let units = df!("Codigo Proyecto" => ["1"], "Precio" => ["150000000"]).unwrap();
        let projects = df!(
            "Cod Proyecto" => ["1"],
            "Unidades Disponibles" => ["10"],
        )
        .unwrap();
        let run = Engine::default().with_as_of(as_of()).classify(&units, &projects).unwrap();
        let tiers = frame::string_values(&run.table, output::TIER).unwrap();
        let methods = frame::string_values(&run.table, output::METHOD).unwrap();
        let scores = frame::numeric_values(&run.table, output::SCORE).unwrap();
        assert_eq!(tiers[0].as_deref(), Some("Mejorable"));
        assert_eq!(methods[0].as_deref(), Some("heuristica"));
        assert!((scores[0].unwrap() - 0.30).abs() < 1e-12);
        let sold = frame::numeric_values(&run.table, output::UNITS_SOLD).unwrap();
        assert_eq!(sold[0], Some(0.0));
    }
}
