//! K-means clustering with k-means++ seeding

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GuardError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeansParams {
    /// Independent seedings; the run with the lowest inertia is kept
    pub n_init: usize,
    pub max_iter: usize,
    /// Convergence tolerance relative to the mean feature variance
    pub tol: f64,
    pub seed: u64,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            n_init: 10,
            max_iter: 300,
            tol: 1e-4,
            seed: 42,
        }
    }
}

/// Fitted centroids
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeans {
    centroids: Array2<f64>,
    inertia: f64,
    iterations: usize,
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

impl KMeans {
    pub fn fit(x: ArrayView2<f64>, k: usize, params: &KMeansParams) -> Result<Self> {
        let n = x.nrows();
        if k == 0 || n < k {
            return Err(GuardError::EmptyDataset(format!(
                "k-means needs at least {k} samples, got {n}"
            )));
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let variance_mean = x.var_axis(Axis(0), 0.0).mean().unwrap_or(0.0);
        let tolerance = params.tol * variance_mean;

        let mut best: Option<Self> = None;
        for _ in 0..params.n_init.max(1) {
            let run = Self::lloyd(x, k, params.max_iter, tolerance, &mut rng);
            if best.as_ref().map(|b| run.inertia < b.inertia).unwrap_or(true) {
                best = Some(run);
            }
        }
        let best = best.ok_or_else(|| GuardError::EmptyDataset("no k-means run completed".to_string()))?;
        debug!(k, iterations = best.iterations, inertia = best.inertia, "K-means converged");
        Ok(best)
    }

    /// One k-means++ seeding followed by Lloyd iterations
    fn lloyd(
        x: ArrayView2<f64>,
        k: usize,
        max_iter: usize,
        tolerance: f64,
        rng: &mut StdRng,
    ) -> Self {
        let (n, d) = x.dim();
        let mut centroids = init_plus_plus(x, k, rng);
        let mut labels = vec![0usize; n];
        let mut iterations = 0;
        for iteration in 0..max_iter.max(1) {
            iterations = iteration + 1;
            for (i, row) in x.rows().into_iter().enumerate() {
                labels[i] = nearest(&centroids, row).0;
            }

            let mut sums = Array2::<f64>::zeros((k, d));
            let mut counts = vec![0usize; k];
            for (i, row) in x.rows().into_iter().enumerate() {
                let mut target = sums.row_mut(labels[i]);
                target += &row;
                counts[labels[i]] += 1;
            }

            let mut shift = 0.0;
            for c in 0..k {
                // Empty clusters keep their previous centroid
                if counts[c] == 0 {
                    continue;
                }
                let updated = sums.row(c).mapv(|v| v / counts[c] as f64);
                shift += squared_distance(centroids.row(c), updated.view());
                centroids.row_mut(c).assign(&updated);
            }

            if shift <= tolerance {
                break;
            }
        }

        let inertia = x
            .rows()
            .into_iter()
            .map(|row| nearest(&centroids, row).1)
            .sum();

        Self {
            centroids,
            inertia,
            iterations,
        }
    }

    pub fn n_clusters(&self) -> usize {
        self.centroids.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.centroids.ncols()
    }

    /// Sum of squared distances of training rows to their centroid
    pub fn inertia(&self) -> f64 {
        self.inertia
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<usize>> {
        if x.ncols() != self.n_features() {
            return Err(GuardError::DimensionMismatch {
                expected: self.n_features(),
                actual: x.ncols(),
            });
        }
        Ok(x.rows()
            .into_iter()
            .map(|row| nearest(&self.centroids, row).0)
            .collect())
    }
}

/// Index of and squared distance to the closest centroid
fn nearest(centroids: &Array2<f64>, row: ArrayView1<f64>) -> (usize, f64) {
    centroids
        .rows()
        .into_iter()
        .enumerate()
        .map(|(c, centroid)| (c, squared_distance(centroid, row)))
        .fold((0, f64::INFINITY), |best, candidate| {
            if candidate.1 < best.1 {
                candidate
            } else {
                best
            }
        })
}

/// First centroid uniformly at random, the rest with probability
/// proportional to squared distance from the closest chosen centroid
fn init_plus_plus(x: ArrayView2<f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let (n, d) = x.dim();
    let mut centroids = Array2::zeros((k, d));
    centroids.row_mut(0).assign(&x.row(rng.gen_range(0..n)));

    let mut distances: Vec<f64> = x
        .rows()
        .into_iter()
        .map(|row| squared_distance(row, centroids.row(0)))
        .collect();

    for c in 1..k {
        let total: f64 = distances.iter().sum();
        let chosen = if total <= f64::EPSILON {
            rng.gen_range(0..n)
        } else {
            let mut target = rng.gen_range(0.0..total);
            let mut chosen = n - 1;
            for (i, dist) in distances.iter().enumerate() {
                if target < *dist {
                    chosen = i;
                    break;
                }
                target -= dist;
            }
            chosen
        };
        centroids.row_mut(c).assign(&x.row(chosen));

        for (i, row) in x.rows().into_iter().enumerate() {
            let dist = squared_distance(row, centroids.row(c));
            if dist < distances[i] {
                distances[i] = dist;
            }
        }
    }
    centroids
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_separates_obvious_groups() {
        let x = array![
            [0.0, 0.0],
            [0.1, 0.0],
            [0.0, 0.1],
            [10.0, 10.0],
            [10.1, 10.0],
            [10.0, 10.1]
        ];
        let model = KMeans::fit(x.view(), 2, &KMeansParams::default()).unwrap();
        let labels = model.predict(x.view()).unwrap();

        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[4], labels[5]);
        assert_ne!(labels[0], labels[3]);
        assert!(model.inertia() < 0.1);
    }

    #[test]
    fn test_fewer_samples_than_clusters() {
        let x = array![[1.0], [2.0]];
        assert!(KMeans::fit(x.view(), 3, &KMeansParams::default()).is_err());
    }

    #[test]
    fn test_identical_rows_do_not_panic() {
        let x = array![[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]];
        let model = KMeans::fit(x.view(), 2, &KMeansParams::default()).unwrap();
        assert_eq!(model.predict(x.view()).unwrap().len(), 3);
    }

    #[test]
    fn test_predict_dimension_mismatch() {
        let x = array![[0.0, 1.0], [1.0, 0.0]];
        let model = KMeans::fit(x.view(), 1, &KMeansParams::default()).unwrap();
        assert!(model.predict(array![[1.0]].view()).is_err());
    }
}
