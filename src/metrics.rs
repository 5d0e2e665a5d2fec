use chrono::NaiveDate;
use polars::prelude::*;
use tracing::info;

use crate::detect::{Field, SchemaMap};
use crate::error::Result;
use crate::frame;
use crate::model::SalesMetrics;
use crate::schema::metrics as cols;

pub const DAYS_PER_MONTH: f64 = 30.4375;

/// Per-row inputs to the metric formulas, already parsed.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricInputs {
    pub sales_per_month: Option<f64>,
    pub available: Option<f64>,
    pub total_units: Option<f64>,
    pub launch_date: Option<NaiveDate>,
}

pub fn months_between(from: NaiveDate, to: NaiveDate) -> f64 {
    let days = (to - from).num_days() as f64;
    (days / DAYS_PER_MONTH).max(0.0)
}

/// Derive the sales metrics of one project.
pub fn compute(inputs: &MetricInputs, as_of: NaiveDate, max_months: f64) -> SalesMetrics {
    let months_since_launch = inputs
        .launch_date
        .map(|d| months_between(d, as_of))
        .unwrap_or(0.0);

    let total = inputs.total_units.unwrap_or(0.0);
    let available = inputs.available.unwrap_or(0.0);
    let units_sold = Some((total - available).max(0.0));

    let mut velocity = inputs.sales_per_month.map(|v| v.max(0.0)).unwrap_or(0.0);
    // sold-out projects no longer report a current rate; use the historical one
    if velocity <= 0.0 && inputs.available == Some(0.0) && months_since_launch > 0.0 {
        if let Some(sold) = units_sold.filter(|s| *s > 0.0) {
            velocity = sold / months_since_launch;
        }
    }
    if !velocity.is_finite() {
        velocity = 0.0;
    }

    let months_to_sellout = match inputs.available {
        Some(available) if velocity > 0.0 => {
            let months = available.max(0.0) / velocity;
            months.is_finite().then(|| months.min(max_months))
        }
        _ => None,
    };

    SalesMetrics {
        velocity,
        months_to_sellout,
        months_since_launch,
        units_sold,
        available: inputs.available.map(|a| a.max(0.0)),
        total_units: inputs.total_units,
    }
}

/// Compute metrics for every row and write them as columns.
pub fn annotate(
    df: &mut DataFrame,
    fields: &SchemaMap,
    as_of: NaiveDate,
    max_months: f64,
) -> Result<Vec<SalesMetrics>> {
    let sales = frame::optional_numeric(df, fields.get(Field::SalesPerMonth))?;
    let available = frame::optional_numeric(df, fields.get(Field::AvailableUnits))?;
    let total = frame::optional_numeric(df, fields.get(Field::TotalUnits))?;
    let launch = frame::date_values(df, fields.get(Field::LaunchDate))?;

    let metrics: Vec<SalesMetrics> = (0..df.height())
        .map(|i| {
            let inputs = MetricInputs {
                sales_per_month: sales[i],
                available: available[i],
                total_units: total[i],
                launch_date: launch[i],
            };
            compute(&inputs, as_of, max_months)
        })
        .collect();

    let velocity: Vec<f64> = metrics.iter().map(|m| m.velocity).collect();
    let sellout: Vec<Option<f64>> = metrics.iter().map(|m| m.months_to_sellout).collect();
    let since: Vec<f64> = metrics.iter().map(|m| m.months_since_launch).collect();
    let total_time: Vec<f64> = metrics
        .iter()
        .map(|m| m.months_since_launch + m.months_to_sellout.unwrap_or(0.0))
        .collect();
    let sold: Vec<f64> = metrics.iter().map(|m| m.units_sold.unwrap_or(0.0)).collect();

    frame::upsert(df, Column::new(cols::VELOCITY.into(), velocity))?;
    frame::upsert(df, frame::float_column(cols::MONTHS_TO_SELLOUT, &sellout))?;
    frame::upsert(df, Column::new(cols::MONTHS_SINCE_LAUNCH.into(), since))?;
    frame::upsert(df, Column::new(cols::TOTAL_TIME_ESTIMATE.into(), total_time))?;
    frame::upsert(df, Column::new(cols::UNITS_SOLD.into(), sold))?;

    let defined = metrics.iter().filter(|m| m.months_to_sellout.is_some()).count();
    info!(
        "Sales metrics computed for {} projects ({} with a sell-out projection)",
        metrics.len(),
        defined
    );
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn sellout_is_available_over_velocity() {
        let inputs = MetricInputs {
            sales_per_month: Some(5.0),
            available: Some(40.0),
            total_units: Some(100.0),
            launch_date: None,
        };
        let m = compute(&inputs, date(2025, 1, 1), 120.0);
        assert_eq!(m.velocity, 5.0);
        assert_eq!(m.months_to_sellout, Some(8.0));
        assert_eq!(m.units_sold, Some(60.0));
        assert_eq!(m.months_since_launch, 0.0);
    }

    #[test]
    fn zero_velocity_leaves_sellout_undefined() {
        let inputs = MetricInputs {
            sales_per_month: Some(-3.0),
            available: Some(40.0),
            ..MetricInputs::default()
        };
        let m = compute(&inputs, date(2025, 1, 1), 120.0);
        assert_eq!(m.velocity, 0.0);
        assert_eq!(m.months_to_sellout, None);
        assert_eq!(m.units_sold, Some(0.0));
    }

    #[test]
    fn missing_inventory_counts_read_as_zero() {
        let only_total = MetricInputs {
            total_units: Some(80.0),
            ..MetricInputs::default()
        };
        let m = compute(&only_total, date(2025, 1, 1), 120.0);
        assert_eq!(m.units_sold, Some(80.0));
        assert_eq!(m.available, None);
        assert!(m.is_active());

        let nothing = compute(&MetricInputs::default(), date(2025, 1, 1), 120.0);
        assert_eq!(nothing.units_sold, Some(0.0));
    }

    #[test]
    fn sellout_is_capped() {
        let inputs = MetricInputs {
            sales_per_month: Some(0.1),
            available: Some(500.0),
            ..MetricInputs::default()
        };
        let m = compute(&inputs, date(2025, 1, 1), 120.0);
        assert_eq!(m.months_to_sellout, Some(120.0));
    }

    #[test]
    fn sold_out_project_uses_historical_rate() {
        let as_of = date(2025, 1, 1);
        let launch = as_of - chrono::Duration::days(304);
        let inputs = MetricInputs {
            sales_per_month: None,
            available: Some(0.0),
            total_units: Some(50.0),
            launch_date: Some(launch),
        };
        let m = compute(&inputs, as_of, 120.0);
        assert!((m.months_since_launch - 304.0 / DAYS_PER_MONTH).abs() < 1e-9);
        assert!(m.velocity > 4.9 && m.velocity < 5.1);
        assert_eq!(m.months_to_sellout, Some(0.0));
        assert!(!m.is_active());
    }

    #[test]
    fn future_launch_dates_clamp_to_zero() {
        assert_eq!(months_between(date(2026, 1, 1), date(2025, 1, 1)), 0.0);
    }

    #[test]
    fn annotate_writes_metric_columns() {
        let mut df = df!(
            "Unidades disponibles" => ["10", "0"],
            "Ventas mes unidades" => ["2", ""],
            "Total unidades proyecto" => ["30", "20"],
        )
        .unwrap();
        let headers = df.get_column_names_str();
        let fields = crate::detect::detect(&headers, &Field::PROJECT_FIELDS);
        let metrics = annotate(&mut df, &fields, date(2025, 1, 1), 120.0).unwrap();
        assert_eq!(metrics[0].months_to_sellout, Some(5.0));
        let sold = frame::numeric_values(&df, cols::UNITS_SOLD).unwrap();
        assert_eq!(sold, vec![Some(20.0), Some(20.0)]);
        let sellout = frame::numeric_values(&df, cols::MONTHS_TO_SELLOUT).unwrap();
        assert_eq!(sellout, vec![Some(5.0), None]);
    }
}
