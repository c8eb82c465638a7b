//! Feature scaling and the fitted transform applied before model inference

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::pca::Pca;
use crate::error::{GuardError, Result};

/// Scales each column to [0, 1] using the range seen during fitting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: Array1<f64>,
    max: Array1<f64>,
}

impl MinMaxScaler {
    pub fn fit(x: ArrayView2<f64>) -> Self {
        let min = x.fold_axis(Axis(0), f64::INFINITY, |acc, v| acc.min(*v));
        let max = x.fold_axis(Axis(0), f64::NEG_INFINITY, |acc, v| acc.max(*v));
        Self { min, max }
    }

    pub fn n_features(&self) -> usize {
        self.min.len()
    }

    /// Columns with a zero range map to 0.0
    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features() {
            return Err(GuardError::DimensionMismatch {
                expected: self.n_features(),
                actual: x.ncols(),
            });
        }
        let mut out = x.to_owned();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let range = self.max[j] - self.min[j];
            let min = self.min[j];
            column.mapv_inplace(|v| if range > f64::EPSILON { (v - min) / range } else { 0.0 });
        }
        Ok(out)
    }
}

/// Scaling, feature selection and optional PCA fitted on training data
///
/// Maps rows of cleaned raw features (in `input_columns` order) into the
/// matrix the maintenance model was trained on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureTransform {
    pub input_columns: Vec<String>,
    pub scaler: MinMaxScaler,
    /// Indices into `input_columns` kept by feature selection
    pub selected: Vec<usize>,
    pub pca: Option<Pca>,
}

impl FeatureTransform {
    pub fn n_inputs(&self) -> usize {
        self.input_columns.len()
    }

    pub fn selected_columns(&self) -> Vec<String> {
        self.selected
            .iter()
            .map(|&i| self.input_columns[i].clone())
            .collect()
    }

    pub fn apply(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let scaled = self.scaler.transform(x)?;
        let selected = scaled.select(Axis(1), &self.selected);
        match &self.pca {
            Some(pca) => pca.transform(selected.view()),
            None => Ok(selected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_min_max_scaling() {
        let x = array![[0.0, 10.0, 5.0], [5.0, 20.0, 5.0], [10.0, 30.0, 5.0]];
        let scaler = MinMaxScaler::fit(x.view());
        let scaled = scaler.transform(x.view()).unwrap();

        assert_eq!(scaled.column(0).to_vec(), vec![0.0, 0.5, 1.0]);
        assert_eq!(scaled.column(1).to_vec(), vec![0.0, 0.5, 1.0]);
        assert_eq!(scaled.column(2).to_vec(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_transform_applies_selection() {
        let x = array![[0.0, 10.0], [10.0, 20.0]];
        let transform = FeatureTransform {
            input_columns: vec!["a".into(), "b".into()],
            scaler: MinMaxScaler::fit(x.view()),
            selected: vec![1],
            pca: None,
        };

        let out = transform.apply(array![[5.0, 15.0]].view()).unwrap();
        assert_eq!(out.dim(), (1, 1));
        assert!((out[[0, 0]] - 0.5).abs() < 1e-12);
        assert_eq!(transform.selected_columns(), vec!["b".to_string()]);
    }

    #[test]
    fn test_transform_rejects_wrong_width() {
        let x = array![[0.0, 10.0], [10.0, 20.0]];
        let scaler = MinMaxScaler::fit(x.view());
        let err = scaler.transform(array![[1.0]].view()).unwrap_err();
        assert!(matches!(err, GuardError::DimensionMismatch { expected: 2, actual: 1 }));
    }
}
