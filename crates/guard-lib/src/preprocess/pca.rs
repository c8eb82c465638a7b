//! Principal component analysis by power iteration with deflation

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{GuardError, Result};

const MAX_ITERATIONS: usize = 1000;
const CONVERGENCE_TOLERANCE: f64 = 1e-10;

/// Fitted projection onto the leading principal components
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pca {
    mean: Array1<f64>,
    /// One component per row
    components: Array2<f64>,
    explained_variance: Vec<f64>,
    explained_variance_ratio: Vec<f64>,
}

impl Pca {
    /// Fit `n_components` components (capped at the column count)
    pub fn fit(x: ArrayView2<f64>, n_components: usize) -> Result<Self> {
        let (n_rows, n_cols) = x.dim();
        if n_rows < 2 || n_cols == 0 {
            return Err(GuardError::EmptyDataset(
                "PCA needs at least two rows and one column".to_string(),
            ));
        }
        let k = n_components.clamp(1, n_cols);

        let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_cols));
        let centered = &x - &mean;
        let mut covariance = centered.t().dot(&centered) / (n_rows as f64 - 1.0);
        let total_variance: f64 = covariance.diag().sum();

        let mut components = Array2::zeros((k, n_cols));
        let mut explained_variance = Vec::with_capacity(k);

        for c in 0..k {
            let (eigenvalue, eigenvector) = dominant_eigenpair(&covariance);
            explained_variance.push(eigenvalue.max(0.0));
            components.row_mut(c).assign(&eigenvector);

            // Deflate so the next iteration finds the following component
            let outer = outer_product(&eigenvector);
            covariance = covariance - outer * eigenvalue;
        }

        let explained_variance_ratio = explained_variance
            .iter()
            .map(|v| {
                if total_variance > f64::EPSILON {
                    v / total_variance
                } else {
                    0.0
                }
            })
            .collect();

        Ok(Self {
            mean,
            components,
            explained_variance,
            explained_variance_ratio,
        })
    }

    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.components.ncols()
    }

    pub fn explained_variance(&self) -> &[f64] {
        &self.explained_variance
    }

    pub fn explained_variance_ratio(&self) -> &[f64] {
        &self.explained_variance_ratio
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features() {
            return Err(GuardError::DimensionMismatch {
                expected: self.n_features(),
                actual: x.ncols(),
            });
        }
        let centered = &x - &self.mean;
        Ok(centered.dot(&self.components.t()))
    }
}

fn outer_product(v: &Array1<f64>) -> Array2<f64> {
    let column = v.view().insert_axis(Axis(1));
    let row = v.view().insert_axis(Axis(0));
    column.dot(&row)
}

/// Largest eigenvalue and unit eigenvector of a symmetric matrix
fn dominant_eigenpair(matrix: &Array2<f64>) -> (f64, Array1<f64>) {
    let n = matrix.nrows();

    // Start from the column with the largest norm so the start vector is not
    // orthogonal to the dominant direction
    let start = (0..n)
        .max_by(|&a, &b| {
            let na = matrix.column(a).dot(&matrix.column(a));
            let nb = matrix.column(b).dot(&matrix.column(b));
            na.partial_cmp(&nb).unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(0);
    let mut vector = matrix.column(start).to_owned();
    let norm = vector.dot(&vector).sqrt();
    if norm <= f64::EPSILON {
        let mut unit = Array1::zeros(n);
        unit[start] = 1.0;
        return (0.0, unit);
    }
    vector /= norm;

    for _ in 0..MAX_ITERATIONS {
        let next = matrix.dot(&vector);
        let next_norm = next.dot(&next).sqrt();
        if next_norm <= f64::EPSILON {
            break;
        }
        let next = next / next_norm;
        let delta = (&next - &vector).mapv(f64::abs).sum();
        vector = next;
        if delta < CONVERGENCE_TOLERANCE {
            break;
        }
    }

    let eigenvalue = vector.dot(&matrix.dot(&vector));
    (eigenvalue, vector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_first_component_follows_dominant_direction() {
        // Points along y = x with small noise on the orthogonal axis
        let mut rows = Vec::new();
        for i in 0..50 {
            let t = i as f64;
            let noise = if i % 2 == 0 { 0.1 } else { -0.1 };
            rows.extend([t + noise, t - noise]);
        }
        let x = Array2::from_shape_vec((50, 2), rows).unwrap();
        let pca = Pca::fit(x.view(), 1).unwrap();

        let component = pca.components.row(0);
        assert!((component[0].abs() - component[1].abs()).abs() < 1e-3);
        assert!(pca.explained_variance_ratio()[0] > 0.99);
    }

    #[test]
    fn test_transform_shape_and_cap() {
        let x = array![[1.0, 2.0, 3.0], [2.0, 1.0, 0.0], [4.0, 4.0, 1.0], [0.0, 3.0, 2.0]];
        let pca = Pca::fit(x.view(), 5).unwrap();
        assert_eq!(pca.n_components(), 3);

        let projected = pca.transform(x.view()).unwrap();
        assert_eq!(projected.dim(), (4, 3));
    }

    #[test]
    fn test_transform_rejects_wrong_width() {
        let x = array![[1.0, 2.0], [2.0, 1.0], [3.0, 5.0]];
        let pca = Pca::fit(x.view(), 1).unwrap();
        let wrong = array![[1.0, 2.0, 3.0]];
        assert!(pca.transform(wrong.view()).is_err());
    }
}
