use std::fmt;

use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::artifacts::{save_artifacts, Artifacts};
use crate::config::{ModelParams, PipelineConfig};
use crate::error::{OutbreakError, Result};
use crate::loader::{load_surveillance, SourceOptions};
use crate::pipeline::preprocess;
use crate::predictor::{BaggedTreeClassifier, FeatureMatrix, Predictor};

/// Feature matrix and target (`brote` by default) of a processed table.
///
/// Uses the configured features that exist in the table, in configured order.
pub fn features_and_target(
    df: &DataFrame,
    config: &PipelineConfig,
) -> Result<(FeatureMatrix, Vec<i32>)> {
    let schema = df.schema();
    let (available, missing): (Vec<&String>, Vec<&String>) = config
        .model_features
        .iter()
        .partition(|f| schema.contains(f.as_str()));
    for feature in &missing {
        log::warn!("Model feature '{feature}' not in table, leaving it out");
    }
    if available.is_empty() {
        return Err(OutbreakError::SchemaMismatch(
            config.model_features.join(", "),
        ));
    }
    log::info!("Selected features: {available:?}");

    let x = FeatureMatrix::from_frame(df, &available)?;
    let target = config.target_variable.as_str();
    let y = df
        .column(target)
        .map_err(|_| OutbreakError::SchemaMismatch(target.to_string()))?
        .cast(&DataType::Int32)?
        .i32()?
        .into_iter()
        .map(|v| v.unwrap_or(0))
        .collect();
    Ok((x, y))
}

/// Train/test partition.
#[derive(Debug, Clone)]
pub struct Split {
    pub x_train: FeatureMatrix,
    pub x_test: FeatureMatrix,
    pub y_train: Vec<i32>,
    pub y_test: Vec<i32>,
}

/// Hold out `test_size` of the rows, rounded up.
///
/// Without a shuffle seed the test set is the tail of the table, which after
/// feature building is the most recent weeks.
pub fn split_data(
    x: &FeatureMatrix,
    y: &[i32],
    test_size: f64,
    shuffle_seed: Option<u64>,
) -> Result<Split> {
    let n = x.n_rows();
    let n_test = (test_size * n as f64).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(OutbreakError::DataIntegrity(format!(
            "cannot split {n} rows with test_size {test_size}"
        )));
    }
    let n_train = n - n_test;

    let mut order: Vec<usize> = (0..n).collect();
    if let Some(seed) = shuffle_seed {
        order.shuffle(&mut StdRng::seed_from_u64(seed));
    }
    let (train, test) = order.split_at(n_train);
    log::info!("Split data: {n_train} train rows, {n_test} test rows");

    Ok(Split {
        x_train: x.take(train),
        x_test: x.take(test),
        y_train: train.iter().map(|&i| y[i]).collect(),
        y_test: test.iter().map(|&i| y[i]).collect(),
    })
}

pub fn train_model(x: &FeatureMatrix, y: &[i32], params: &ModelParams) -> Result<BaggedTreeClassifier> {
    log::info!("Training bagged tree classifier ({} trees)", params.n_trees);
    let mut model = BaggedTreeClassifier::new(params.clone());
    model.fit(x, y)?;
    Ok(model)
}

/// Precision, recall and F1 for one class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Hold-out evaluation of a binary classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    pub accuracy: f64,
    /// `confusion[actual][predicted]`
    pub confusion: [[usize; 2]; 2],
    pub classes: [ClassMetrics; 2],
    pub reliability_target: f64,
}

impl EvaluationReport {
    pub fn from_predictions(actual: &[i32], predicted: &[i32], reliability_target: f64) -> Self {
        let mut confusion = [[0usize; 2]; 2];
        for (&a, &p) in actual.iter().zip(predicted) {
            confusion[usize::from(a == 1)][usize::from(p == 1)] += 1;
        }
        let total = actual.len();
        let correct = confusion[0][0] + confusion[1][1];
        let accuracy = if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        };

        let class = |k: usize| {
            let tp = confusion[k][k];
            let predicted_k = confusion[0][k] + confusion[1][k];
            let support = confusion[k][0] + confusion[k][1];
            let precision = ratio(tp, predicted_k);
            let recall = ratio(tp, support);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            ClassMetrics {
                precision,
                recall,
                f1,
                support,
            }
        };

        Self {
            accuracy,
            confusion,
            classes: [class(0), class(1)],
            reliability_target,
        }
    }

    pub fn meets_reliability_target(&self) -> bool {
        self.accuracy >= self.reliability_target
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Accuracy: {:.4}", self.accuracy)?;
        writeln!(f, "Confusion matrix:")?;
        for row in &self.confusion {
            writeln!(f, "  [{:>6} {:>6}]", row[0], row[1])?;
        }
        writeln!(f, "{:>8} {:>9} {:>9} {:>9} {:>9}", "", "precision", "recall", "f1-score", "support")?;
        for (k, m) in self.classes.iter().enumerate() {
            writeln!(
                f,
                "{k:>8} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                m.precision, m.recall, m.f1, m.support
            )?;
        }
        Ok(())
    }
}

pub fn evaluate<P: Predictor + ?Sized>(
    model: &P,
    x: &FeatureMatrix,
    y: &[i32],
    reliability_target: f64,
) -> Result<EvaluationReport> {
    let predicted = model.predict(x)?;
    let report = EvaluationReport::from_predictions(y, &predicted, reliability_target);
    log::info!("Evaluation:\n{report}");
    if report.meets_reliability_target() {
        log::info!(
            "Reliability target met: accuracy {:.4} >= {:.2}",
            report.accuracy,
            reliability_target
        );
    } else {
        log::warn!(
            "Reliability target NOT met: accuracy {:.4} < {:.2}",
            report.accuracy,
            reliability_target
        );
    }
    Ok(report)
}

/// Outcome of a full training run.
#[derive(Debug)]
pub struct TrainingOutcome {
    pub report: EvaluationReport,
    pub n_train: usize,
    pub n_test: usize,
}

/// Load, preprocess, split, fit, evaluate, and persist model and encoders.
pub fn run_training(config: &PipelineConfig) -> Result<TrainingOutcome> {
    config.validate()?;
    let raw = load_surveillance(&config.dataset_file, &SourceOptions::from(config))?;
    let processed = preprocess(raw, config)?;

    let (x, y) = features_and_target(&processed.frame, config)?;
    let shuffle_seed = config.shuffle_data.then_some(config.model.seed);
    let split = split_data(&x, &y, config.test_size, shuffle_seed)?;

    let model = train_model(&split.x_train, &split.y_train, &config.model)?;
    let report = evaluate(&model, &split.x_test, &split.y_test, config.reliability_target)?;

    let artifacts = Artifacts {
        model,
        encoders: processed.encoders,
    };
    save_artifacts(config, &artifacts)?;

    Ok(TrainingOutcome {
        report,
        n_train: split.x_train.n_rows(),
        n_test: split.x_test.n_rows(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(n: usize) -> (FeatureMatrix, Vec<i32>) {
        let rows: Vec<Vec<f64>> = (0..n).map(|i| vec![i as f64]).collect();
        let y = (0..n).map(|i| (i % 2) as i32).collect();
        (FeatureMatrix::from_rows(vec!["semana".into()], &rows).unwrap(), y)
    }

    #[test]
    fn unshuffled_split_keeps_temporal_order() {
        let (x, y) = matrix(10);
        let split = split_data(&x, &y, 0.2, None).unwrap();
        assert_eq!(split.x_train.n_rows(), 8);
        assert_eq!(split.x_test.n_rows(), 2);
        assert_eq!(split.x_test.row(0), &[8.0]);
        assert_eq!(split.x_test.row(1), &[9.0]);
        assert_eq!(split.y_test, vec![0, 1]);
    }

    #[test]
    fn test_size_rounds_up() {
        let (x, y) = matrix(11);
        let split = split_data(&x, &y, 0.2, None).unwrap();
        assert_eq!(split.x_test.n_rows(), 3);
    }

    #[test]
    fn shuffled_split_is_seeded() {
        let (x, y) = matrix(50);
        let a = split_data(&x, &y, 0.2, Some(7)).unwrap();
        let b = split_data(&x, &y, 0.2, Some(7)).unwrap();
        assert_eq!(a.x_test, b.x_test);
        assert_eq!(a.y_train.len() + a.y_test.len(), 50);
    }

    #[test]
    fn split_of_one_row_is_rejected() {
        let (x, y) = matrix(1);
        assert!(split_data(&x, &y, 0.2, None).is_err());
    }

    #[test]
    fn report_counts_and_metrics() {
        let actual = [0, 0, 0, 1, 1];
        let predicted = [0, 0, 1, 1, 0];
        let report = EvaluationReport::from_predictions(&actual, &predicted, 0.85);
        assert_eq!(report.confusion, [[2, 1], [1, 1]]);
        assert!((report.accuracy - 0.6).abs() < 1e-12);
        assert!(!report.meets_reliability_target());
        assert!((report.classes[0].precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((report.classes[1].recall - 0.5).abs() < 1e-12);
        assert_eq!(report.classes[1].support, 2);
        assert!(report.to_string().contains("Accuracy: 0.6000"));
    }

    #[test]
    fn no_positive_predictions_gives_zero_precision() {
        let report = EvaluationReport::from_predictions(&[1, 0], &[0, 0], 0.5);
        assert_eq!(report.classes[1].precision, 0.0);
        assert_eq!(report.classes[1].f1, 0.0);
        assert!(report.meets_reliability_target());
    }

    #[test]
    fn target_comes_from_brote_column() {
        let df = df!(
            "edad" => &[10i64, 20, 30],
            "semana" => &[1i32, 2, 3],
            "brote" => &[0i32, 1, 0]
        )
        .unwrap();
        let config = PipelineConfig::default();
        let (x, y) = features_and_target(&df, &config).unwrap();
        assert_eq!(x.names(), ["edad", "semana"]);
        assert_eq!(y, vec![0, 1, 0]);
    }
}
