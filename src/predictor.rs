use std::fmt;

use chrono::{DateTime, Utc};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_classifier::{
    DecisionTreeClassifier, DecisionTreeClassifierParameters, SplitCriterion,
};

use crate::config::ModelParams;
use crate::error::{OutbreakError, Result};

/// Row-major `f64` feature matrix with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    names: Vec<String>,
    n_rows: usize,
    data: Vec<f64>,
}

impl FeatureMatrix {
    /// Select `features` from the frame, in the given order, as `Float64`.
    ///
    /// A missing feature is `SchemaMismatch`; a null value is `DataIntegrity`.
    pub fn from_frame<S: AsRef<str>>(df: &DataFrame, features: &[S]) -> Result<Self> {
        let n_rows = df.height();
        let mut columns: Vec<Vec<f64>> = Vec::with_capacity(features.len());
        for feature in features {
            let name = feature.as_ref();
            let column = df
                .column(name)
                .map_err(|_| OutbreakError::SchemaMismatch(name.to_string()))?
                .cast(&DataType::Float64)?;
            let values = column
                .f64()?
                .into_iter()
                .enumerate()
                .map(|(i, v)| {
                    v.ok_or_else(|| {
                        OutbreakError::DataIntegrity(format!("null '{name}' at row {i}"))
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            columns.push(values);
        }

        let mut data = Vec::with_capacity(n_rows * columns.len());
        for i in 0..n_rows {
            data.extend(columns.iter().map(|c| c[i]));
        }

        Ok(Self {
            names: features.iter().map(|f| f.as_ref().to_string()).collect(),
            n_rows,
            data,
        })
    }

    pub fn from_rows(names: Vec<String>, rows: &[Vec<f64>]) -> Result<Self> {
        let mut data = Vec::with_capacity(rows.len() * names.len());
        for (i, row) in rows.iter().enumerate() {
            if row.len() != names.len() {
                return Err(OutbreakError::DataIntegrity(format!(
                    "row {i} has {} values, expected {}",
                    row.len(),
                    names.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            names,
            n_rows: rows.len(),
            data,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    pub fn row(&self, i: usize) -> &[f64] {
        let w = self.n_cols();
        &self.data[i * w..(i + 1) * w]
    }

    /// New matrix holding the given rows, in the given order.
    pub fn take(&self, rows: &[usize]) -> Self {
        let mut data = Vec::with_capacity(rows.len() * self.n_cols());
        for &i in rows {
            data.extend_from_slice(self.row(i));
        }
        Self {
            names: self.names.clone(),
            n_rows: rows.len(),
            data,
        }
    }

    fn dense(&self) -> DenseMatrix<f64> {
        DenseMatrix::new(self.n_rows, self.n_cols(), self.data.clone(), false)
    }
}

/// Binary classifier contract used by training and serving.
///
/// Predictions and probabilities are only defined for matrices whose feature
/// names and order match the ones used at fit time.
pub trait Predictor: Send + Sync {
    fn fit(&mut self, x: &FeatureMatrix, y: &[i32]) -> Result<()>;

    /// Class label (0 or 1) per row.
    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<i32>>;

    /// `[P(class = 0), P(class = 1)]` per row.
    fn predict_proba(&self, x: &FeatureMatrix) -> Result<Vec<[f64; 2]>>;

    /// Feature order fixed at fit time. Empty before fitting.
    fn feature_names(&self) -> &[String];

    fn is_fitted(&self) -> bool;
}

type Tree = DecisionTreeClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>>;

#[derive(Serialize, Deserialize)]
enum Member {
    Tree(Tree),
    /// Bootstrap sample held a single class.
    Constant(i32),
}

impl Member {
    fn predict(&self, x: &FeatureMatrix, dense: &DenseMatrix<f64>) -> Result<Vec<i32>> {
        match self {
            Self::Tree(tree) => tree
                .predict(dense)
                .map_err(|e| OutbreakError::Model(format!("tree prediction failed: {e}"))),
            Self::Constant(class) => Ok(vec![*class; x.n_rows()]),
        }
    }
}

/// Random-forest style ensemble: Gini decision trees, each fitted on a seeded
/// bootstrap sample. P(1) is the share of trees voting 1.
#[derive(Serialize, Deserialize)]
pub struct BaggedTreeClassifier {
    params: ModelParams,
    feature_names: Vec<String>,
    members: Vec<Member>,
    trained_at: Option<DateTime<Utc>>,
    n_training_samples: usize,
}

impl fmt::Debug for BaggedTreeClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaggedTreeClassifier")
            .field("params", &self.params)
            .field("feature_names", &self.feature_names)
            .field("n_members", &self.members.len())
            .field("trained_at", &self.trained_at)
            .finish()
    }
}

impl BaggedTreeClassifier {
    pub fn new(params: ModelParams) -> Self {
        Self {
            params,
            feature_names: Vec::new(),
            members: Vec::new(),
            trained_at: None,
            n_training_samples: 0,
        }
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    pub fn trained_at(&self) -> Option<DateTime<Utc>> {
        self.trained_at
    }

    pub fn n_training_samples(&self) -> usize {
        self.n_training_samples
    }

    fn check_features(&self, x: &FeatureMatrix) -> Result<()> {
        if !self.is_fitted() {
            return Err(OutbreakError::Model("model is not trained".into()));
        }
        if x.names() != self.feature_names.as_slice() {
            return Err(OutbreakError::FeatureMismatch {
                expected: self.feature_names.clone(),
                found: x.names().to_vec(),
            });
        }
        Ok(())
    }

    /// Share of members voting 1, per row.
    fn positive_share(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        self.check_features(x)?;
        let dense = x.dense();
        let mut votes = vec![0usize; x.n_rows()];
        for member in &self.members {
            for (v, class) in votes.iter_mut().zip(member.predict(x, &dense)?) {
                if class == 1 {
                    *v += 1;
                }
            }
        }
        let n = self.members.len() as f64;
        Ok(votes.into_iter().map(|v| v as f64 / n).collect())
    }
}

fn fit_member(x: &FeatureMatrix, y: &[i32], seed: u64, max_depth: Option<u16>) -> Result<Member> {
    let n = x.n_rows();
    let mut rng = StdRng::seed_from_u64(seed);
    let sample: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
    let labels: Vec<i32> = sample.iter().map(|&i| y[i]).collect();

    if labels.iter().all(|&c| c == labels[0]) {
        return Ok(Member::Constant(labels[0]));
    }

    let mut params = DecisionTreeClassifierParameters::default().with_criterion(SplitCriterion::Gini);
    if let Some(depth) = max_depth {
        params = params.with_max_depth(depth);
    }
    let tree = Tree::fit(&x.take(&sample).dense(), &labels, params)
        .map_err(|e| OutbreakError::Model(format!("failed to fit tree: {e}")))?;
    Ok(Member::Tree(tree))
}

impl Predictor for BaggedTreeClassifier {
    fn fit(&mut self, x: &FeatureMatrix, y: &[i32]) -> Result<()> {
        if x.n_rows() == 0 {
            return Err(OutbreakError::Model("cannot fit on an empty matrix".into()));
        }
        if x.n_rows() != y.len() {
            return Err(OutbreakError::Model(format!(
                "{} feature rows but {} targets",
                x.n_rows(),
                y.len()
            )));
        }
        if let Some(bad) = y.iter().find(|&&c| c != 0 && c != 1) {
            return Err(OutbreakError::Model(format!("target must be 0 or 1, got {bad}")));
        }

        let seeds: Vec<u64> = (0..u64::from(self.params.n_trees))
            .map(|i| self.params.seed.wrapping_add(i))
            .collect();
        let max_depth = self.params.max_depth;
        let grow = || {
            seeds
                .par_iter()
                .map(|&seed| fit_member(x, y, seed, max_depth))
                .collect::<Result<Vec<Member>>>()
        };

        let members = match self.params.n_jobs {
            Some(threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| OutbreakError::Model(format!("thread pool: {e}")))?
                .install(grow)?,
            None => grow()?,
        };

        log::info!(
            "Fitted {} trees on {} rows x {} features",
            members.len(),
            x.n_rows(),
            x.n_cols()
        );
        self.members = members;
        self.feature_names = x.names().to_vec();
        self.trained_at = Some(Utc::now());
        self.n_training_samples = x.n_rows();
        Ok(())
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<i32>> {
        Ok(self
            .positive_share(x)?
            .into_iter()
            .map(|p| i32::from(p > 0.5))
            .collect())
    }

    fn predict_proba(&self, x: &FeatureMatrix) -> Result<Vec<[f64; 2]>> {
        Ok(self
            .positive_share(x)?
            .into_iter()
            .map(|p| [1.0 - p, p])
            .collect())
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn is_fitted(&self) -> bool {
        !self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["casos_lag1".to_string(), "edad".to_string()]
    }

    /// Label is 1 exactly when the first feature is large.
    fn separable(n: usize) -> (FeatureMatrix, Vec<i32>) {
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| vec![(i % 10) as f64, (i % 7) as f64])
            .collect();
        let y = rows.iter().map(|r| i32::from(r[0] >= 5.0)).collect();
        (FeatureMatrix::from_rows(names(), &rows).unwrap(), y)
    }

    fn params(n_trees: u16) -> ModelParams {
        ModelParams {
            n_trees,
            seed: 42,
            max_depth: None,
            n_jobs: Some(2),
        }
    }

    #[test]
    fn matrix_follows_requested_column_order() {
        let df = df!(
            "edad" => &[30i64, 40],
            "casos_lag1" => &[1i32, 0]
        )
        .unwrap();
        let x = FeatureMatrix::from_frame(&df, &names()).unwrap();
        assert_eq!(x.row(0), &[1.0, 30.0]);
        assert_eq!(x.row(1), &[0.0, 40.0]);
    }

    #[test]
    fn missing_feature_is_schema_mismatch() {
        let df = df!("edad" => &[30i64]).unwrap();
        let err = FeatureMatrix::from_frame(&df, &names()).unwrap_err();
        assert!(matches!(err, OutbreakError::SchemaMismatch(c) if c == "casos_lag1"));
    }

    #[test]
    fn learns_a_separable_rule() {
        let (x, y) = separable(200);
        let mut model = BaggedTreeClassifier::new(params(15));
        model.fit(&x, &y).unwrap();
        let predicted = model.predict(&x).unwrap();
        let correct = predicted.iter().zip(&y).filter(|(p, t)| p == t).count();
        assert!(correct as f64 / y.len() as f64 > 0.95);

        for [p0, p1] in model.predict_proba(&x).unwrap() {
            assert!((p0 + p1 - 1.0).abs() < 1e-12);
            assert!((0.0..=1.0).contains(&p1));
        }
    }

    #[test]
    fn same_seed_same_model() {
        let (x, y) = separable(120);
        let mut a = BaggedTreeClassifier::new(params(8));
        let mut b = BaggedTreeClassifier::new(params(8));
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn single_class_target_predicts_that_class() {
        let (x, _) = separable(30);
        let y = vec![0; 30];
        let mut model = BaggedTreeClassifier::new(params(4));
        model.fit(&x, &y).unwrap();
        assert!(model.predict(&x).unwrap().iter().all(|&c| c == 0));
        assert_eq!(model.predict_proba(&x).unwrap()[0], [1.0, 0.0]);
    }

    #[test]
    fn rejects_reordered_features() {
        let (x, y) = separable(50);
        let mut model = BaggedTreeClassifier::new(params(3));
        model.fit(&x, &y).unwrap();

        let swapped = FeatureMatrix::from_rows(
            vec!["edad".to_string(), "casos_lag1".to_string()],
            &[vec![1.0, 2.0]],
        )
        .unwrap();
        assert!(matches!(
            model.predict(&swapped),
            Err(OutbreakError::FeatureMismatch { .. })
        ));
    }

    #[test]
    fn unfitted_model_refuses_to_predict() {
        let (x, _) = separable(5);
        let model = BaggedTreeClassifier::new(params(3));
        assert!(!model.is_fitted());
        assert!(matches!(model.predict(&x), Err(OutbreakError::Model(_))));
    }

    #[test]
    fn survives_json_round_trip() {
        let (x, y) = separable(80);
        let mut model = BaggedTreeClassifier::new(params(5));
        model.fit(&x, &y).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        let restored: BaggedTreeClassifier = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.feature_names(), model.feature_names());
        assert_eq!(restored.predict(&x).unwrap(), model.predict(&x).unwrap());
    }
}
