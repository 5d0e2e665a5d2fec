use polars::prelude::*;
use tracing::info;

use crate::error::Result;
use crate::frame;
use crate::model::SalesMetrics;
use crate::schema::anomaly as cols;

/// Suspect-data reasons. Flags are advisory: they only keep rows out of
/// regression training.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyReason {
    NonPositiveSellout,
    SelloutTooLong,
    StalledWithStock,
    VelocityTooHigh,
    NegativeSold,
    InventoryMismatch,
    MissingData,
}

impl AnomalyReason {
    pub fn label(&self) -> &'static str {
        match self {
            AnomalyReason::NonPositiveSellout => "meses_para_agotar <= 0",
            AnomalyReason::SelloutTooLong => "meses_para_agotar > maximo",
            AnomalyReason::StalledWithStock => "velocidad <= 0 con unidades disponibles",
            AnomalyReason::VelocityTooHigh => "velocidad > 100",
            AnomalyReason::NegativeSold => "unidades_vendidas < 0",
            AnomalyReason::InventoryMismatch => "vendidas + disponibles > total",
            AnomalyReason::MissingData => "datos faltantes",
        }
    }
}

const MAX_VELOCITY: f64 = 100.0;
const INVENTORY_SLACK: f64 = 1.1;

pub fn reasons(metrics: &SalesMetrics, max_months: f64) -> Vec<AnomalyReason> {
    let mut out = Vec::new();
    match metrics.months_to_sellout {
        None => {
            out.push(AnomalyReason::NonPositiveSellout);
            out.push(AnomalyReason::MissingData);
        }
        Some(m) if m <= 0.0 => out.push(AnomalyReason::NonPositiveSellout),
        Some(m) if m > max_months => out.push(AnomalyReason::SelloutTooLong),
        Some(_) => {}
    }
    let available = metrics.available.unwrap_or(0.0);
    if metrics.velocity <= 0.0 && available > 0.0 {
        out.push(AnomalyReason::StalledWithStock);
    }
    if metrics.velocity > MAX_VELOCITY {
        out.push(AnomalyReason::VelocityTooHigh);
    }
    if let Some(sold) = metrics.units_sold {
        if sold < 0.0 {
            out.push(AnomalyReason::NegativeSold);
        }
        if let Some(total) = metrics.total_units {
            if sold + available > total * INVENTORY_SLACK {
                out.push(AnomalyReason::InventoryMismatch);
            }
        }
    }
    out
}

/// Flag every row and write `_es_anomalia` / `_razon_anomalia`.
/// Returns one flag per row.
pub fn annotate(df: &mut DataFrame, metrics: &[SalesMetrics], max_months: f64) -> Result<Vec<bool>> {
    let found: Vec<Vec<AnomalyReason>> = metrics.iter().map(|m| reasons(m, max_months)).collect();
    let flags: Vec<bool> = found.iter().map(|r| !r.is_empty()).collect();
    let text: Vec<Option<String>> = found
        .iter()
        .map(|r| {
            (!r.is_empty()).then(|| r.iter().map(|x| x.label()).collect::<Vec<_>>().join("; "))
        })
        .collect();

    frame::upsert(df, Column::new(cols::IS_ANOMALY.into(), flags.clone()))?;
    frame::upsert(df, frame::text_column(cols::REASON, &text))?;

    let flagged = flags.iter().filter(|f| **f).count();
    info!("{} of {} projects flagged as anomalous", flagged, flags.len());
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy() -> SalesMetrics {
        SalesMetrics {
            velocity: 5.0,
            months_to_sellout: Some(8.0),
            months_since_launch: 12.0,
            units_sold: Some(60.0),
            available: Some(40.0),
            total_units: Some(100.0),
        }
    }

    #[test]
    fn healthy_project_is_not_flagged() {
        assert!(reasons(&healthy(), 120.0).is_empty());
    }

    #[test]
    fn missing_sellout_is_flagged_twice() {
        let m = SalesMetrics {
            velocity: 0.0,
            months_to_sellout: None,
            ..healthy()
        };
        let r = reasons(&m, 120.0);
        assert!(r.contains(&AnomalyReason::MissingData));
        assert!(r.contains(&AnomalyReason::NonPositiveSellout));
        assert!(r.contains(&AnomalyReason::StalledWithStock));
    }

    #[test]
    fn inventory_mismatch_uses_ten_percent_slack() {
        let m = SalesMetrics {
            total_units: Some(90.0),
            ..healthy()
        };
        assert!(reasons(&m, 120.0).contains(&AnomalyReason::InventoryMismatch));
        let m = SalesMetrics {
            total_units: Some(95.0),
            ..healthy()
        };
        assert!(!reasons(&m, 120.0).contains(&AnomalyReason::InventoryMismatch));
    }

    #[test]
    fn annotate_keeps_every_row() {
        let mut df = df!("id" => ["a", "b"]).unwrap();
        let metrics = [healthy(), SalesMetrics::default()];
        let flags = annotate(&mut df, &metrics, 120.0).unwrap();
        assert_eq!(flags, vec![false, true]);
        assert_eq!(df.height(), 2);
        let text = frame::string_values(&df, cols::REASON).unwrap();
        assert!(text[0].is_none());
        assert!(text[1].as_deref().unwrap().contains("datos faltantes"));
    }
}
