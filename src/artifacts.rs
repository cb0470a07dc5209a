use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::encoding::CategoryEncoders;
use crate::error::{OutbreakError, Result};
use crate::predictor::BaggedTreeClassifier;

/// Everything serving needs from a training run.
#[derive(Debug)]
pub struct Artifacts {
    pub model: BaggedTreeClassifier,
    pub encoders: CategoryEncoders,
}

/// Write the model and encoders as JSON under the configured models directory.
pub fn save_artifacts(config: &PipelineConfig, artifacts: &Artifacts) -> Result<()> {
    std::fs::create_dir_all(&config.models_dir)?;

    let model_path = config.model_path();
    write_json(&model_path, &artifacts.model)?;
    log::info!("Model saved to {}", model_path.display());

    let encoder_path = config.encoder_path();
    write_json(&encoder_path, &artifacts.encoders)?;
    log::info!("Encoders saved to {}", encoder_path.display());
    Ok(())
}

/// Read both artifacts. A missing file is `ArtifactsMissing`, never a panic.
pub fn load_artifacts(config: &PipelineConfig) -> Result<Artifacts> {
    let model = read_json(&config.model_path())?;
    let encoders = read_json(&config.encoder_path())?;
    log::info!("Model and encoders loaded from {}", config.models_dir.display());
    Ok(Artifacts { model, encoders })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(writer, value)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => OutbreakError::ArtifactsMissing(path.to_path_buf()),
        _ => OutbreakError::Io(e),
    })?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}
