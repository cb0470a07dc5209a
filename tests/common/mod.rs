#![allow(dead_code)]

use std::path::Path;

use outbreak_core::config::{ModelParams, PipelineConfig};

pub const HEADER: &str = "departamento,provincia,distrito,ano,semana,tipo_dx,sexo,edad,tipo_edad,notas";

/// Encode text as ISO-8859-1; every char used here is below U+0100.
pub fn latin1(text: &str) -> Vec<u8> {
    text.chars().map(|c| c as u8).collect()
}

/// One CSV line per case record.
pub fn record(
    department: &str,
    district: &str,
    year: i32,
    week: i32,
    dx: &str,
    age: &str,
) -> String {
    format!("{department},{department},{district},{year},{week},{dx},M,{age},A,-")
}

/// Three departments, twenty weeks of 2022, with periodic spikes.
pub fn synthetic_csv() -> String {
    let departments = [("lima", "Breña"), ("Ica", "Parcona"), ("PIURA ", "Castilla")];
    let mut lines = vec![HEADER.to_string()];
    for (d, (department, district)) in departments.iter().enumerate() {
        for week in 1..=20 {
            let spike = if week % 6 == 0 { 6 } else { 0 };
            let cases = (week * 7 + d as i32 * 3) % 5 + spike;
            for i in 0..cases {
                lines.push(record(department, district, 2022, week, "C", &(i * 7 % 80).to_string()));
            }
            lines.push(record(department, district, 2022, week, "P", "33"));
        }
    }
    // dropped by cleaning
    lines.push(record("", "X", 2022, 3, "C", "20"));
    lines.push(record("LIMA", "ATE", 2022, 3, "C", "desconocido"));
    lines.join("\n") + "\n"
}

pub fn config_for(dir: &Path, dataset: &Path) -> PipelineConfig {
    PipelineConfig {
        dataset_file: dataset.to_path_buf(),
        models_dir: dir.join("models"),
        model: ModelParams {
            n_trees: 5,
            seed: 7,
            max_depth: Some(6),
            n_jobs: Some(1),
        },
        ..PipelineConfig::default()
    }
}
