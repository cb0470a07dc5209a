use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OutbreakError, Result};
use crate::schema::{derived, diagnosis, model, raw};

/// Text encoding of the surveillance source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    #[serde(alias = "utf-8")]
    Utf8,
    /// ISO-8859-1, the usual encoding of government open-data exports.
    #[serde(alias = "latin-1", alias = "iso-8859-1")]
    Latin1,
}

/// Classifier hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    pub n_trees: u16,
    pub seed: u64,
    pub max_depth: Option<u16>,
    /// Worker threads for training. `None` uses every available core.
    pub n_jobs: Option<usize>,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            seed: 42,
            max_depth: None,
            n_jobs: None,
        }
    }
}

/// Pipeline, training and serving settings.
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub dataset_file: PathBuf,
    pub models_dir: PathBuf,
    pub model_file: String,
    pub encoder_file: String,

    pub encoding: TextEncoding,
    pub separator: char,
    pub relevant_columns: Vec<String>,

    pub confirmed_code: String,
    pub rolling_window: usize,
    pub outbreak_factor: f64,

    pub categorical_features: Vec<String>,
    pub model_features: Vec<String>,
    pub target_variable: String,
    /// Departments of interest. Informational: training uses every department.
    pub target_departments: Vec<String>,

    pub model: ModelParams,
    pub test_size: f64,
    /// Off by default so the test split stays the most recent weeks.
    pub shuffle_data: bool,
    pub reliability_target: f64,

    pub default_department: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset_file: PathBuf::from("data/datos_abiertos_vigilancia_dengue_2000_2023.csv"),
            models_dir: PathBuf::from("models"),
            model_file: "dengue_model.json".to_string(),
            encoder_file: "label_encoders.json".to_string(),
            encoding: TextEncoding::Latin1,
            separator: ',',
            relevant_columns: to_strings(&raw::ALL),
            confirmed_code: diagnosis::CONFIRMED.to_string(),
            rolling_window: 4,
            outbreak_factor: 1.2,
            categorical_features: to_strings(&model::CATEGORICAL),
            model_features: to_strings(&model::FEATURES),
            target_variable: derived::BROTE.to_string(),
            target_departments: to_strings(&["PIURA", "ICA", "LA LIBERTAD", "LIMA", "LORETO"]),
            model: ModelParams::default(),
            test_size: 0.2,
            shuffle_data: false,
            reliability_target: 0.85,
            default_department: "LIMA".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a TOML config file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => OutbreakError::SourceNotFound(path.to_path_buf()),
            _ => OutbreakError::Io(e),
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rolling_window == 0 {
            return Err(OutbreakError::InvalidConfig(
                "rolling_window must be at least 1".into(),
            ));
        }
        if !(self.outbreak_factor > 0.0) {
            return Err(OutbreakError::InvalidConfig(format!(
                "outbreak_factor must be positive, got {}",
                self.outbreak_factor
            )));
        }
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(OutbreakError::InvalidConfig(format!(
                "test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        if self.model.n_trees == 0 {
            return Err(OutbreakError::InvalidConfig("n_trees must be at least 1".into()));
        }
        if self.model_features.is_empty() {
            return Err(OutbreakError::InvalidConfig("model_features is empty".into()));
        }
        if !self.separator.is_ascii() {
            return Err(OutbreakError::InvalidConfig(format!(
                "separator must be a single ASCII character, got '{}'",
                self.separator
            )));
        }
        Ok(())
    }

    pub fn separator_byte(&self) -> u8 {
        self.separator as u8
    }

    pub fn model_path(&self) -> PathBuf {
        self.models_dir.join(&self.model_file)
    }

    pub fn encoder_path(&self) -> PathBuf {
        self.models_dir.join(&self.encoder_file)
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}
