//! Predictive maintenance: error-rate regression from instance metrics
//!
//! Trains a random forest on an 80/20 shuffled split, reports 5-fold
//! cross-validated MSE on the training split plus test MSE and R².

mod forest;

pub use forest::{ForestParams, RandomForestRegressor};

use ndarray::{Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{GuardError, Result};
use crate::preprocess::FeatureTransform;

/// Share of rows held out for the test split
pub const TEST_FRACTION: f64 = 0.2;

/// Number of cross-validation folds on the training split
pub const CV_FOLDS: usize = 5;

/// Evaluation results recorded at training time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub train_rows: usize,
    pub test_rows: usize,
    /// Mean MSE across folds, absent when the training split is too small
    pub cv_mse: Option<f64>,
    pub test_mse: f64,
    pub r2: f64,
    pub feature_importances: Vec<f64>,
}

/// Trained regressor together with the transform its inputs need
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceModel {
    pub forest: RandomForestRegressor,
    /// Maps raw metric rows into the forest's feature space
    pub transform: Option<FeatureTransform>,
    pub report: TrainingReport,
}

impl MaintenanceModel {
    /// Predict from rows already in the model's feature space
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<f64>> {
        self.forest.predict(x)
    }

    /// Predict from cleaned raw metric rows, applying the stored transform
    pub fn predict_raw(&self, x: ArrayView2<f64>) -> Result<Vec<f64>> {
        match &self.transform {
            Some(transform) => self.forest.predict(transform.apply(x)?.view()),
            None => self.forest.predict(x),
        }
    }

    /// Number of values expected per input row by [`predict_raw`](Self::predict_raw)
    pub fn n_inputs(&self) -> usize {
        self.transform
            .as_ref()
            .map(FeatureTransform::n_inputs)
            .unwrap_or_else(|| self.forest.n_features())
    }
}

/// Train and evaluate a maintenance model
pub fn train(x: ArrayView2<f64>, y: &[f64], params: &ForestParams) -> Result<MaintenanceModel> {
    let n = x.nrows();
    if n < 2 {
        return Err(GuardError::EmptyDataset(
            "need at least two rows to split into train and test".to_string(),
        ));
    }
    if y.len() != n {
        return Err(GuardError::DimensionMismatch {
            expected: n,
            actual: y.len(),
        });
    }

    info!("Splitting data into training and testing sets");
    let (train_idx, test_idx) = train_test_split(n, TEST_FRACTION, params.seed);
    let (x_train, y_train) = take_rows(x, y, &train_idx);
    let (x_test, y_test) = take_rows(x, y, &test_idx);

    info!(rows = train_idx.len(), "Performing cross-validation");
    let cv_mse = cross_validate(x_train.view(), &y_train, params, CV_FOLDS)?;
    if let Some(cv) = cv_mse {
        info!(cv_mse = cv, "Average cross-validation MSE");
    }

    info!(trees = params.n_estimators, max_depth = ?params.max_depth, "Training random forest regressor");
    let forest = RandomForestRegressor::fit(x_train.view(), &y_train, params)?;

    let predictions = forest.predict(x_test.view())?;
    let test_mse = mean_squared_error(&y_test, &predictions);
    let r2 = r2_score(&y_test, &predictions);
    info!(mse = test_mse, r2, "Evaluated model on test split");
    for (i, importance) in forest.feature_importances().iter().enumerate() {
        info!(feature = i, importance, "Feature importance");
    }

    let report = TrainingReport {
        train_rows: train_idx.len(),
        test_rows: test_idx.len(),
        cv_mse,
        test_mse,
        r2,
        feature_importances: forest.feature_importances().to_vec(),
    };

    Ok(MaintenanceModel {
        forest,
        transform: None,
        report,
    })
}

/// Shuffled split; the test side gets `ceil(n * fraction)` rows
pub fn train_test_split(n: usize, fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = ((n as f64 * fraction).ceil() as usize).clamp(1, n.saturating_sub(1).max(1));
    let train = indices.split_off(n_test);
    (train, indices)
}

fn take_rows(x: ArrayView2<f64>, y: &[f64], rows: &[usize]) -> (Array2<f64>, Vec<f64>) {
    (x.select(Axis(0), rows), rows.iter().map(|&r| y[r]).collect())
}

/// Contiguous k-fold cross-validation, mean MSE over folds
fn cross_validate(
    x: ArrayView2<f64>,
    y: &[f64],
    params: &ForestParams,
    folds: usize,
) -> Result<Option<f64>> {
    let n = x.nrows();
    let k = folds.min(n);
    if k < 2 {
        return Ok(None);
    }

    let mut scores = Vec::with_capacity(k);
    let mut start = 0;
    for fold in 0..k {
        let size = n / k + usize::from(fold < n % k);
        let held_out: Vec<usize> = (start..start + size).collect();
        let kept: Vec<usize> = (0..n).filter(|i| *i < start || *i >= start + size).collect();
        start += size;

        let (x_fit, y_fit) = take_rows(x, y, &kept);
        let (x_val, y_val) = take_rows(x, y, &held_out);
        let model = RandomForestRegressor::fit(x_fit.view(), &y_fit, params)?;
        let predictions = model.predict(x_val.view())?;
        scores.push(mean_squared_error(&y_val, &predictions));
    }

    Ok(Some(scores.iter().sum::<f64>() / scores.len() as f64))
}

pub fn mean_squared_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / actual.len() as f64
}

/// Coefficient of determination; 1.0 for a perfect fit of a constant target
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    if ss_tot <= f64::EPSILON {
        return if ss_res <= f64::EPSILON { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_data(n: usize) -> (Array2<f64>, Vec<f64>) {
        let mut rows = Vec::new();
        let mut y = Vec::new();
        for i in 0..n {
            let a = (i % 17) as f64;
            let b = ((i * 5) % 11) as f64;
            rows.extend([a, b]);
            y.push(2.0 * a + 0.1 * b);
        }
        (Array2::from_shape_vec((n, 2), rows).unwrap(), y)
    }

    #[test]
    fn test_split_sizes() {
        let (train, test) = train_test_split(100, 0.2, 42);
        assert_eq!(test.len(), 20);
        assert_eq!(train.len(), 80);

        let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
        all.sort();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_is_seeded() {
        assert_eq!(train_test_split(50, 0.2, 42), train_test_split(50, 0.2, 42));
    }

    #[test]
    fn test_train_reports_metrics() {
        let (x, y) = linear_data(120);
        let params = ForestParams {
            n_estimators: 20,
            max_depth: Some(10),
            ..Default::default()
        };
        let model = train(x.view(), &y, &params).unwrap();

        assert_eq!(model.report.train_rows, 96);
        assert_eq!(model.report.test_rows, 24);
        assert!(model.report.cv_mse.is_some());
        assert!(model.report.r2 > 0.8, "r2 was {}", model.report.r2);
        assert_eq!(model.n_inputs(), 2);
    }

    #[test]
    fn test_metrics() {
        assert_eq!(mean_squared_error(&[1.0, 2.0], &[1.0, 4.0]), 2.0);
        assert_eq!(r2_score(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 1.0);
        assert_eq!(r2_score(&[2.0, 2.0], &[2.0, 2.0]), 1.0);
    }

    #[test]
    fn test_too_few_rows() {
        let (x, y) = linear_data(1);
        assert!(matches!(
            train(x.view(), &y, &ForestParams::default()),
            Err(GuardError::EmptyDataset(_))
        ));
    }
}
