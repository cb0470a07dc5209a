use chrono::{Datelike, NaiveDate, TimeDelta};
use polars::prelude::*;

use crate::aggregation::{weekly_cases, weekly_points};
use crate::artifacts::{load_artifacts, Artifacts};
use crate::cache::ProcessedTableCache;
use crate::config::PipelineConfig;
use crate::error::{OutbreakError, Result};
use crate::loader::{parse_surveillance, read_source, SourceOptions};
use crate::pipeline::prepare_features;
use crate::predictor::{FeatureMatrix, Predictor};
use crate::schema::raw;

/// Confirmed cases of one department in one epidemiological week.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklyCount {
    pub year: i32,
    pub week: i32,
    /// Monday of the week, weeks counted from the first Monday of the year.
    pub week_start: Option<NaiveDate>,
    pub cases: i64,
}

/// Outbreak prediction for a department's most recent observed row.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestPrediction {
    pub department: String,
    pub year: i32,
    pub week: i32,
    pub outbreak: bool,
    /// `[P(normal), P(outbreak)]`
    pub probabilities: [f64; 2],
}

impl LatestPrediction {
    /// Probability of the predicted class.
    pub fn confidence(&self) -> f64 {
        self.probabilities[usize::from(self.outbreak)]
    }
}

/// Monday starting week `week` of `year`; week 1 begins on the first Monday.
pub fn week_start(year: i32, week: i32) -> Option<NaiveDate> {
    let jan1 = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let to_first_monday = (7 - i64::from(jan1.weekday().num_days_from_monday())) % 7;
    let days = to_first_monday + 7 * (i64::from(week) - 1);
    jan1.checked_add_signed(TimeDelta::try_days(days)?)
}

/// Read side of the system: persisted model and encoders plus a memoized
/// feature table of the configured dataset.
#[derive(Debug)]
pub struct OutbreakService {
    config: PipelineConfig,
    artifacts: Artifacts,
    cache: ProcessedTableCache,
}

impl OutbreakService {
    /// Validate the config and load the trained artifacts. Missing files
    /// give `ArtifactsMissing`.
    pub fn open(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let artifacts = load_artifacts(&config)?;
        Ok(Self::new(config, artifacts))
    }

    pub fn new(config: PipelineConfig, artifacts: Artifacts) -> Self {
        Self {
            config,
            artifacts,
            cache: ProcessedTableCache::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Department names known to the model, in code order.
    pub fn department_options(&self) -> Result<&[String]> {
        self.artifacts
            .encoders
            .get(raw::DEPARTAMENTO)
            .map(|m| m.classes())
            .ok_or_else(|| OutbreakError::UnknownCategoryField(raw::DEPARTAMENTO.to_string()))
    }

    /// The configured default department when known, else the first option.
    pub fn default_department(&self) -> Option<&str> {
        let options = self.department_options().ok()?;
        options
            .iter()
            .find(|d| **d == self.config.default_department)
            .or_else(|| options.first())
            .map(String::as_str)
    }

    /// Unencoded feature table of the dataset, recomputed only when the
    /// file content changes.
    pub fn processed_table(&mut self) -> Result<DataFrame> {
        let bytes = read_source(&self.config.dataset_file)?;
        let config = &self.config;
        let options = SourceOptions::from(config);
        self.cache.get_or_compute(&bytes, |source| {
            prepare_features(parse_surveillance(source, &options)?, config)
        })
    }

    pub fn invalidate(&mut self) {
        self.cache.invalidate();
    }

    /// Rows of one department. No rows is `EmptyFilterResult`.
    pub fn department_rows(&mut self, department: &str) -> Result<DataFrame> {
        let rows = self
            .processed_table()?
            .lazy()
            .filter(col(raw::DEPARTAMENTO).eq(lit(department)))
            .collect()?;
        if rows.height() == 0 {
            return Err(OutbreakError::EmptyFilterResult(format!(
                "department {department}"
            )));
        }
        Ok(rows)
    }

    /// Weekly confirmed-case series of one department, oldest first.
    pub fn weekly_cases(&mut self, department: &str) -> Result<Vec<WeeklyCount>> {
        let rows = self.department_rows(department)?;
        let points = weekly_points(&weekly_cases(&rows)?)?;
        Ok(points
            .into_iter()
            .map(|p| WeeklyCount {
                year: p.year,
                week: p.week,
                week_start: week_start(p.year, p.week),
                cases: p.cases,
            })
            .collect())
    }

    /// Predict outbreak risk for the department's latest (year, week) row.
    ///
    /// The row is encoded with the persisted mappings; a value the model never
    /// saw fails this request with `UnseenCategory`.
    pub fn predict_latest(&mut self, department: &str) -> Result<LatestPrediction> {
        let mapping = self
            .artifacts
            .encoders
            .get(raw::DEPARTAMENTO)
            .ok_or_else(|| OutbreakError::UnknownCategoryField(raw::DEPARTAMENTO.to_string()))?;
        mapping.encode(department)?;

        let rows = self.department_rows(department)?;
        let latest = rows
            .sort(
                [raw::ANO, raw::SEMANA],
                SortMultipleOptions::default().with_maintain_order(true),
            )?
            .tail(Some(1));

        let year = latest.column(raw::ANO)?.i32()?.get(0);
        let week = latest.column(raw::SEMANA)?.i32()?.get(0);
        let (Some(year), Some(week)) = (year, week) else {
            return Err(OutbreakError::DataIntegrity(format!(
                "latest row of {department} has no year/week"
            )));
        };

        let encoded = self.artifacts.encoders.transform(latest)?;
        let model = &self.artifacts.model;
        let x = FeatureMatrix::from_frame(&encoded, model.feature_names())?;

        let outbreak = model.predict(&x)?.first().copied().unwrap_or(0) == 1;
        let probabilities = model
            .predict_proba(&x)?
            .first()
            .copied()
            .ok_or_else(|| OutbreakError::Model("no probability returned".into()))?;

        log::info!(
            "{department} {year}-W{week}: outbreak={outbreak} p={:.3}",
            probabilities[1]
        );
        Ok(LatestPrediction {
            department: department.to_string(),
            year,
            week,
            outbreak,
            probabilities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_start_matches_monday_based_numbering() {
        // 2024-01-01 is a Monday, so week 1 starts that day
        assert_eq!(week_start(2024, 1), NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(week_start(2024, 2), NaiveDate::from_ymd_opt(2024, 1, 8));
        // 2023-01-01 is a Sunday; first Monday is 2023-01-02
        assert_eq!(week_start(2023, 1), NaiveDate::from_ymd_opt(2023, 1, 2));
        assert_eq!(week_start(2023, 0), NaiveDate::from_ymd_opt(2022, 12, 26));
    }

    #[test]
    fn open_rejects_invalid_config_before_touching_artifacts() {
        let config = PipelineConfig {
            separator: 'é',
            models_dir: "/nonexistent/models".into(),
            ..PipelineConfig::default()
        };
        let err = OutbreakService::open(config).unwrap_err();
        assert!(matches!(err, OutbreakError::InvalidConfig(_)));
    }

    #[test]
    fn confidence_is_probability_of_predicted_class() {
        let mut p = LatestPrediction {
            department: "LIMA".into(),
            year: 2023,
            week: 10,
            outbreak: true,
            probabilities: [0.3, 0.7],
        };
        assert_eq!(p.confidence(), 0.7);
        p.outbreak = false;
        assert_eq!(p.confidence(), 0.3);
    }
}
