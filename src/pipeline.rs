use polars::prelude::DataFrame;

use crate::aggregation::flag_confirmed_cases;
use crate::cleaning::clean;
use crate::config::PipelineConfig;
use crate::encoding::CategoryEncoders;
use crate::error::{OutbreakError, Result};
use crate::features::build_features;
use crate::labeling::{label_outbreaks, OutbreakRule};

impl From<&PipelineConfig> for OutbreakRule {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            window: config.rolling_window,
            factor: config.outbreak_factor,
        }
    }
}

/// Output of [`preprocess`].
#[derive(Debug)]
pub struct ProcessedData {
    /// Feature table with categorical fields replaced by codes.
    pub frame: DataFrame,
    pub encoders: CategoryEncoders,
    /// Configured categorical fields that were absent.
    pub skipped: Vec<OutbreakError>,
}

/// Clean, flag confirmed cases, label outbreaks and derive lag features.
///
/// Categorical fields stay as text; the result is a pure function of `raw`.
pub fn prepare_features(raw: DataFrame, config: &PipelineConfig) -> Result<DataFrame> {
    let df = clean(raw)?;
    let df = flag_confirmed_cases(df, &config.confirmed_code)?;
    let df = label_outbreaks(df, &OutbreakRule::from(config))?;
    build_features(df)
}

/// Full preprocessing: [`prepare_features`] then fit-and-apply the encoders.
pub fn preprocess(raw: DataFrame, config: &PipelineConfig) -> Result<ProcessedData> {
    let df = prepare_features(raw, config)?;
    log::info!("Encoding categorical features");
    let encoded = CategoryEncoders::fit_transform(df, &config.categorical_features)?;
    Ok(ProcessedData {
        frame: encoded.frame,
        encoders: encoded.encoders,
        skipped: encoded.skipped,
    })
}
