//! Dengue outbreak labelling, feature engineering and risk prediction over
//! weekly epidemiological surveillance records.
//!
//! Stages run in order, each taking ownership of the table from the last:
//! [`loader`] → [`cleaning`] → [`aggregation`] → [`labeling`] →
//! [`features`] → [`encoding`] → [`predictor`].

pub mod aggregation;
pub mod artifacts;
pub mod cache;
pub mod cleaning;
pub mod config;
pub mod encoding;
pub mod error;
pub mod features;
pub mod labeling;
pub mod loader;
pub mod pipeline;
pub mod predictor;
pub mod schema;
pub mod serving;
pub mod training;

#[cfg(feature = "python")]
mod python;

pub use config::PipelineConfig;
pub use error::{OutbreakError, Result};
pub use pipeline::{prepare_features, preprocess, ProcessedData};
pub use predictor::{BaggedTreeClassifier, FeatureMatrix, Predictor};
pub use serving::OutbreakService;
