use std::collections::{BTreeMap, HashMap};

use polars::prelude::*;
use serde::Serialize;

use crate::detect::{Field, SchemaMap};
use crate::error::Result;
use crate::frame;
use crate::model::Tier;
use crate::schema::{features, output};
use crate::stats;

const TOP_LABELS: usize = 5;
const TOP_LIFT: usize = 15;
const TOP_AMENITIES: usize = 20;
const TOP_SELLERS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distribution {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub q25: f64,
    pub q75: f64,
}

impl Distribution {
    pub fn of(values: &[f64]) -> Option<Distribution> {
        let ca = Float64Chunked::from_slice("valores".into(), values);
        let quantile = |q: f64| ca.quantile(q, QuantileMethod::Linear).ok().flatten();
        Some(Distribution {
            count: values.len(),
            mean: ca.mean()?,
            median: ca.median()?,
            min: ca.min()?,
            max: ca.max()?,
            q25: quantile(0.25)?,
            q75: quantile(0.75)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmenityLift {
    pub amenity: String,
    pub cohort_count: usize,
    pub overall_count: usize,
    pub cohort_pct: f64,
    pub overall_pct: f64,
    pub lift: f64,
}

/// What the successful (Exitoso) projects have in common.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct CohortProfile {
    pub cohort_size: usize,
    pub total_projects: usize,
    pub features: BTreeMap<String, Distribution>,
    pub modal_zone: Option<String>,
    pub modal_pattern: Option<String>,
    pub modal_stratum: Option<String>,
    pub zones: Vec<LabelCount>,
    pub patterns: Vec<LabelCount>,
    pub strata: Vec<LabelCount>,
    pub amenity_lift: Vec<AmenityLift>,
    pub top_amenities: Vec<LabelCount>,
}

/// Which values of a feature count as informative.
#[derive(Clone, Copy)]
enum Valid {
    Positive,
    NonNegative,
}

fn tier_mask(table: &DataFrame, tier: Tier) -> Result<Vec<bool>> {
    Ok(frame::optional_strings(table, Some(output::TIER))?
        .into_iter()
        .map(|t| t.as_deref().and_then(Tier::parse) == Some(tier))
        .collect())
}

fn ranked_counts<'a, I: IntoIterator<Item = &'a str>>(values: I) -> Vec<LabelCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for v in values {
        *counts.entry(v).or_default() += 1;
    }
    let mut ranked: Vec<LabelCount> = counts
        .into_iter()
        .map(|(label, count)| LabelCount {
            label: label.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    ranked
}

/// Comma-separated amenity entries, lower-cased and trimmed.
pub fn split_amenities(text: &str) -> Vec<String> {
    text.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn profile(table: &DataFrame, sources: &SchemaMap) -> Result<CohortProfile> {
    let mask = tier_mask(table, Tier::Exitoso)?;
    let cohort_size = mask.iter().filter(|m| **m).count();
    let mut profile = CohortProfile {
        cohort_size,
        total_projects: table.height(),
        ..CohortProfile::default()
    };
    if cohort_size == 0 {
        return Ok(profile);
    }

    // ── Numeric features ────────────────────────────────────────────────────
    let numeric: Vec<(Option<&str>, Valid)> = vec![
        (Some(output::VELOCITY), Valid::Positive),
        (Some(output::MONTHS_TO_SELLOUT), Valid::Positive),
        (Some(features::PENETRATION), Valid::NonNegative),
        (Some(output::AVG_PRICE), Valid::Positive),
        (Some(output::AVG_AREA), Valid::Positive),
        (sources.get(Field::PricePerM2), Valid::Positive),
        (sources.get(Field::TotalUnits), Valid::Positive),
        (Some(output::MONTHS_SINCE_LAUNCH), Valid::NonNegative),
        (Some(output::COMPOSITE_SCORE), Valid::NonNegative),
        (Some(features::PRICE_PCT_ZONE), Valid::NonNegative),
        (sources.get(Field::Bedrooms), Valid::Positive),
        (sources.get(Field::Bathrooms), Valid::Positive),
        (sources.get(Field::Parking), Valid::Positive),
    ];
    let schema = table.schema();
    for (column, valid) in numeric {
        let Some(column) = column.filter(|c| schema.contains(c)) else {
            continue;
        };
        let values: Vec<f64> = frame::numeric_values(table, column)?
            .into_iter()
            .zip(&mask)
            .filter(|(_, m)| **m)
            .filter_map(|(v, _)| v)
            .filter(|v| match valid {
                Valid::Positive => *v > 0.0,
                Valid::NonNegative => *v >= 0.0,
            })
            .collect();
        if let Some(d) = Distribution::of(&values) {
            profile.features.insert(column.to_string(), d);
        }
    }

    // ── Categorical modes ───────────────────────────────────────────────────
    let categorical = |column: &str| -> Result<Vec<LabelCount>> {
        let values = frame::optional_strings(table, Some(column))?;
        Ok(ranked_counts(
            values
                .iter()
                .zip(&mask)
                .filter(|(_, m)| **m)
                .filter_map(|(v, _)| v.as_deref()),
        ))
    };
    profile.zones = categorical(output::ZONE)?;
    profile.patterns = categorical(output::PATTERN)?;
    profile.strata = categorical(output::STRATUM)?
        .into_iter()
        // 0 is the numeric fill for an unknown stratum; "N/A" never reaches here.
        .filter(|s| s.label != "0")
        .collect();
    profile.modal_zone = profile.zones.first().map(|l| l.label.clone());
    profile.modal_pattern = profile.patterns.first().map(|l| l.label.clone());
    profile.modal_stratum = profile.strata.first().map(|l| l.label.clone());
    profile.zones.truncate(TOP_LABELS);
    profile.patterns.truncate(TOP_LABELS);
    profile.strata.truncate(TOP_LABELS);

    // ── Amenities ───────────────────────────────────────────────────────────
    if let Some(column) = sources.get(Field::Amenities).filter(|c| schema.contains(c)) {
        let lists: Vec<Vec<String>> = frame::string_values(table, column)?
            .into_iter()
            .map(|v| v.as_deref().map(split_amenities).unwrap_or_default())
            .collect();
        let overall = ranked_counts(lists.iter().flatten().map(String::as_str));
        let cohort: HashMap<String, usize> = ranked_counts(
            lists
                .iter()
                .zip(&mask)
                .filter(|(_, m)| **m)
                .flat_map(|(l, _)| l.iter().map(String::as_str)),
        )
        .into_iter()
        .map(|l| (l.label, l.count))
        .collect();

        let n_total = table.height() as f64;
        let n_cohort = cohort_size as f64;
        let mut lift: Vec<AmenityLift> = overall
            .iter()
            .filter_map(|o| {
                let in_cohort = *cohort.get(&o.label)?;
                let cohort_pct = in_cohort as f64 / n_cohort * 100.0;
                let overall_pct = o.count as f64 / n_total * 100.0;
                Some(AmenityLift {
                    amenity: o.label.clone(),
                    cohort_count: in_cohort,
                    overall_count: o.count,
                    cohort_pct,
                    overall_pct,
                    lift: cohort_pct / overall_pct,
                })
            })
            .collect();
        lift.sort_by(|a, b| {
            b.lift
                .total_cmp(&a.lift)
                .then_with(|| b.cohort_count.cmp(&a.cohort_count))
                .then_with(|| a.amenity.cmp(&b.amenity))
        });
        lift.truncate(TOP_LIFT);
        profile.amenity_lift = lift;
        profile.top_amenities = overall.into_iter().take(TOP_AMENITIES).collect();
    }

    Ok(profile)
}

// ── Seller ranking ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusFilter {
    All,
    /// Projects with units still available.
    Active,
    /// Sold-out projects.
    Inactive,
}

impl StatusFilter {
    pub fn parse(value: &str) -> Option<StatusFilter> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" | "todos" => Some(StatusFilter::All),
            "active" | "activos" => Some(StatusFilter::Active),
            "inactive" | "inactivos" => Some(StatusFilter::Inactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SellerStanding {
    pub seller: String,
    pub display_name: String,
    pub projects: usize,
    pub exitosos: usize,
    pub moderados: usize,
    pub mejorables: usize,
    pub mean_score: f64,
    pub pct_exitosos: f64,
    pub ranking_score: f64,
}

fn display_seller(seller: &str) -> String {
    if !seller.is_empty() && seller.chars().all(|c| c.is_ascii_digit()) {
        format!("Vendedor #{seller}")
    } else {
        seller.to_string()
    }
}

/// Top sellers by number of Exitoso projects, then by
/// `0.6 × mean score + 0.4 × share Exitoso`.
pub fn seller_ranking(table: &DataFrame, filter: StatusFilter) -> Result<Vec<SellerStanding>> {
    let sellers = frame::optional_strings(table, Some(output::SELLER))?;
    let tiers = frame::optional_strings(table, Some(output::TIER))?;
    let scores = frame::optional_numeric(table, Some(output::SCORE))?;
    let available = frame::optional_numeric(table, Some(output::UNITS_AVAILABLE))?;

    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, seller) in sellers.iter().enumerate() {
        let Some(seller) = seller.as_deref() else {
            continue;
        };
        let stock = available[i].unwrap_or(0.0);
        let keep = match filter {
            StatusFilter::All => true,
            StatusFilter::Active => stock > 0.0,
            StatusFilter::Inactive => stock <= 0.0,
        };
        if keep {
            groups.entry(seller).or_default().push(i);
        }
    }

    let mut standings: Vec<SellerStanding> = groups
        .into_iter()
        .map(|(seller, rows)| {
            let count = |tier: Tier| {
                rows.iter()
                    .filter(|&&i| tiers[i].as_deref().and_then(Tier::parse) == Some(tier))
                    .count()
            };
            let exitosos = count(Tier::Exitoso);
            let row_scores: Vec<f64> = rows.iter().map(|&i| scores[i].unwrap_or(0.5)).collect();
            let mean_score = stats::mean(&row_scores).unwrap_or(0.0);
            let pct_exitosos = exitosos as f64 / rows.len() as f64 * 100.0;
            SellerStanding {
                seller: seller.to_string(),
                display_name: display_seller(seller),
                projects: rows.len(),
                exitosos,
                moderados: count(Tier::Moderado),
                mejorables: count(Tier::Mejorable),
                mean_score,
                pct_exitosos,
                ranking_score: 0.6 * mean_score + 0.4 * pct_exitosos / 100.0,
            }
        })
        .collect();

    standings.sort_by(|a, b| {
        b.exitosos
            .cmp(&a.exitosos)
            .then_with(|| b.ranking_score.total_cmp(&a.ranking_score))
            .then_with(|| a.seller.cmp(&b.seller))
    });
    standings.truncate(TOP_SELLERS);
    Ok(standings)
}
