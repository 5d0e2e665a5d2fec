//! Classify real-estate projects from a unit CSV and a project CSV.
//!
//! Usage:
//!   realty-classify --units unidades.csv --projects proyectos.csv --out clasificacion.csv
//!
//! Log level follows RUST_LOG (default: info).

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use realty_tiers::cohort::{self, StatusFilter};
use realty_tiers::{io, validate, Engine, EngineConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "realty-classify")]
#[command(about = "Segment-relative tier classification of real-estate projects")]
struct Args {
    /// Unit-level CSV (one row per unit)
    #[arg(long)]
    units: PathBuf,

    /// Project-level CSV (one row per project)
    #[arg(long)]
    projects: PathBuf,

    /// Output table (.csv or .parquet)
    #[arg(long)]
    out: PathBuf,

    /// YAML engine configuration; built-in defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Reference date for project ages (YYYY-MM-DD); today when omitted
    #[arg(long)]
    as_of: Option<NaiveDate>,

    /// Write the Exitoso cohort profile and run summary as JSON
    #[arg(long)]
    cohort_json: Option<PathBuf>,

    /// Check the output table and fail on contract violations
    #[arg(long, default_value = "false")]
    validate: bool,

    /// Seller ranking to include in the JSON report: all, active or inactive
    #[arg(long, default_value = "all")]
    sellers: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = EngineConfig::load(args.config.as_deref())
        .with_context(|| "loading engine configuration")?;
    let mut engine = Engine::new(config);
    if let Some(date) = args.as_of {
        engine = engine.with_as_of(date);
    }

    info!("Reading units from {:?}", args.units);
    let units = io::read_csv_as_strings(&args.units)
        .with_context(|| format!("reading {}", args.units.display()))?;
    info!("Reading projects from {:?}", args.projects);
    let projects = io::read_csv_as_strings(&args.projects)
        .with_context(|| format!("reading {}", args.projects.display()))?;

    let run = engine.classify(&units, &projects)?;
    let mut table = run.table.clone();
    io::write_table(&mut table, &args.out)
        .with_context(|| format!("writing {}", args.out.display()))?;
    info!("Wrote {} projects to {:?}", table.height(), args.out);

    if let Some(path) = &args.cohort_json {
        let Some(filter) = StatusFilter::parse(&args.sellers) else {
            bail!("unknown seller filter '{}'", args.sellers);
        };
        let report = serde_json::json!({
            "summary": run.summary,
            "cohort": run.cohort,
            "regression": run.regression,
            "sellers": cohort::seller_ranking(&run.table, filter)?,
        });
        std::fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Wrote cohort report to {:?}", path);
    }

    if args.validate {
        let report = validate::check(&run.table)?;
        if !report.is_valid() {
            for e in &report.errors {
                warn!("{}", e);
            }
            bail!("output table failed validation with {} errors", report.errors.len());
        }
    }

    Ok(())
}
