use std::path::Path;

use pyo3::prelude::*;
use pyo3::types::PyModule;
use pyo3_polars::PyDataFrame;

use polars::prelude::*;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::loader::{load_surveillance, SourceOptions};
use crate::pipeline::preprocess;
use crate::schema;
use crate::serving::OutbreakService;
use crate::training::run_training;

fn load_config(config_path: Option<&str>) -> Result<PipelineConfig> {
    match config_path {
        Some(path) => PipelineConfig::from_toml_file(Path::new(path)),
        None => Ok(PipelineConfig::default()),
    }
}

/// Load and preprocess the configured dataset; returns the encoded table.
#[pyfunction]
#[pyo3(signature = (config_path=None))]
fn preprocess_dataset(config_path: Option<&str>) -> PyResult<PyDataFrame> {
    let config = load_config(config_path)?;
    let raw = load_surveillance(&config.dataset_file, &SourceOptions::from(&config))?;
    let processed = preprocess(raw, &config)?;
    Ok(PyDataFrame(processed.frame))
}

/// Train and persist the model. Returns (accuracy, meets_target, report).
#[pyfunction]
#[pyo3(signature = (config_path=None))]
fn train(config_path: Option<&str>) -> PyResult<(f64, bool, String)> {
    let config = load_config(config_path)?;
    let outcome = run_training(&config)?;
    Ok((
        outcome.report.accuracy,
        outcome.report.meets_reliability_target(),
        outcome.report.to_string(),
    ))
}

#[pyclass(name = "OutbreakService", unsendable)]
pub struct PyOutbreakService {
    inner: OutbreakService,
}

#[pymethods]
impl PyOutbreakService {
    /// Raises RuntimeError("... Run training first.") when artifacts are missing.
    #[new]
    #[pyo3(signature = (config_path=None))]
    fn new(config_path: Option<&str>) -> PyResult<Self> {
        let config = load_config(config_path)?;
        Ok(Self {
            inner: OutbreakService::open(config)?,
        })
    }

    fn department_options(&self) -> PyResult<Vec<String>> {
        Ok(self.inner.department_options()?.to_vec())
    }

    fn default_department(&self) -> Option<String> {
        self.inner.default_department().map(str::to_string)
    }

    /// Columns: ano, semana, week_start (ISO date string), casos.
    fn weekly_cases(&mut self, department: &str) -> PyResult<PyDataFrame> {
        let series = self.inner.weekly_cases(department)?;
        let years: Vec<i32> = series.iter().map(|w| w.year).collect();
        let weeks: Vec<i32> = series.iter().map(|w| w.week).collect();
        let starts: Vec<Option<String>> = series
            .iter()
            .map(|w| w.week_start.map(|d| d.to_string()))
            .collect();
        let cases: Vec<i64> = series.iter().map(|w| w.cases).collect();

        let df = DataFrame::new(vec![
            Column::new(schema::raw::ANO.into(), &years),
            Column::new(schema::raw::SEMANA.into(), &weeks),
            Column::new("week_start".into(), &starts),
            Column::new(schema::derived::CASOS.into(), &cases),
        ])
        .map_err(crate::error::OutbreakError::from)?;
        Ok(PyDataFrame(df))
    }

    /// Returns (year, week, outbreak, confidence).
    fn predict_latest(&mut self, department: &str) -> PyResult<(i32, i32, bool, f64)> {
        let p = self.inner.predict_latest(department)?;
        Ok((p.year, p.week, p.outbreak, p.confidence()))
    }

    fn invalidate(&mut self) {
        self.inner.invalidate();
    }
}

/// Export column-name constants as Python submodules.
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let raw = PyModule::new(m.py(), "raw")?;
    for name in schema::raw::ALL {
        raw.add(name.to_uppercase(), name)?;
    }
    m.add_submodule(&raw)?;

    let derived = PyModule::new(m.py(), "derived")?;
    derived.add("CASOS", schema::derived::CASOS)?;
    derived.add("BROTE", schema::derived::BROTE)?;
    derived.add("CASOS_LAG1", schema::derived::CASOS_LAG1)?;
    derived.add("CASOS_DIFF", schema::derived::CASOS_DIFF)?;
    m.add_submodule(&derived)?;

    let model = PyModule::new(m.py(), "model")?;
    model.add("FEATURES", schema::model::FEATURES.to_vec())?;
    model.add("CATEGORICAL", schema::model::CATEGORICAL.to_vec())?;
    m.add_submodule(&model)?;

    Ok(())
}

/// Module name must match `[lib] name`.
#[pymodule]
fn outbreak_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let _ = env_logger::try_init();
    m.add_class::<PyOutbreakService>()?;
    m.add_function(wrap_pyfunction!(preprocess_dataset, m)?)?;
    m.add_function(wrap_pyfunction!(train, m)?)?;
    add_schema_exports(m)?;
    Ok(())
}
