pub mod anomaly;
pub mod assemble;
pub mod classifier;
pub mod cohort;
pub mod composite;
pub mod config;
pub mod detect;
pub mod error;
pub mod features;
mod forest;
pub mod frame;
pub mod io;
pub mod join;
pub mod metrics;
pub mod model;
pub mod pattern;
pub mod pipeline;
pub mod regression;
pub mod schema;
pub mod stats;
pub mod validate;

#[cfg(feature = "python")]
mod python;

pub use config::EngineConfig;
pub use error::{ClassifyError, Result};
pub use model::{ClassificationMethod, ClassificationResult, SalesPattern, Segment, Tier};
pub use pipeline::{classify, ClassificationRun, Engine, RunSummary};

#[cfg(feature = "python")]
mod py_module {
    use pyo3::prelude::*;
    use pyo3::types::PyModule;

    use crate::model::{SalesPattern, Tier};
    use crate::python::Classifier;
    use crate::schema;

    /// Export schema constants as Python submodules
    fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
        let output = PyModule::new(m.py(), "output")?;
        output.add("CODE", schema::output::CODE)?;
        output.add("NAME", schema::output::NAME)?;
        output.add("TIER", schema::output::TIER)?;
        output.add("SCORE", schema::output::SCORE)?;
        output.add("METHOD", schema::output::METHOD)?;
        output.add("COMPOSITE_SCORE", schema::output::COMPOSITE_SCORE)?;
        output.add("COMPOSITE_TIER", schema::output::COMPOSITE_TIER)?;
        output.add("PATTERN", schema::output::PATTERN)?;
        output.add("SELLER", schema::output::SELLER)?;
        output.add("ALL", schema::output::ALL.to_vec())?;
        m.add_submodule(&output)?;

        let tiers = PyModule::new(m.py(), "tiers")?;
        for tier in Tier::ALL {
            tiers.add(tier.label().to_uppercase(), tier.label())?;
        }
        m.add_submodule(&tiers)?;

        let patterns = PyModule::new(m.py(), "patterns")?;
        patterns.add("ACCELERATED", SalesPattern::Accelerated.label())?;
        patterns.add("CONSTANT", SalesPattern::Constant.label())?;
        patterns.add("DECELERATED", SalesPattern::Decelerated.label())?;
        patterns.add("NO_DATA", SalesPattern::NoData.label())?;
        m.add_submodule(&patterns)?;

        Ok(())
    }

    #[pymodule]
    fn realty_tiers(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_class::<Classifier>()?;
        add_schema_exports(m)?;
        Ok(())
    }
}
