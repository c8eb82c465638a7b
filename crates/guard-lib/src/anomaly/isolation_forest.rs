//! Isolation forest outlier model
//!
//! Each tree isolates samples with random axis-aligned splits. Outliers are
//! isolated in fewer splits, so a short average path length maps to a high
//! anomaly score. The decision threshold is fitted so that `contamination`
//! of the training rows are labelled as outliers.

use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::OutlierModel;
use crate::error::{GuardError, Result};

/// Upper bound for the per-tree subsample when `max_samples` is not set
const DEFAULT_MAX_SAMPLES: usize = 256;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Training parameters for [`IsolationForest`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForestParams {
    pub n_estimators: usize,
    /// Rows drawn per tree; `None` means `min(256, n_rows)`
    pub max_samples: Option<usize>,
    /// Expected share of outliers in the training data (0.0 - 0.5)
    pub contamination: f64,
    pub seed: u64,
}

impl Default for IsolationForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: None,
            contamination: 0.05,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn grow(x: &ArrayView2<f64>, rows: Vec<usize>, max_depth: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.build(x, rows, 0, max_depth, rng);
        tree
    }

    fn build(
        &mut self,
        x: &ArrayView2<f64>,
        rows: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let index = self.nodes.len();
        self.nodes.push(Node::Leaf { size: rows.len() });

        if rows.len() <= 1 || depth >= max_depth {
            return index;
        }

        // Only features that still vary inside this node can split it
        let candidates: Vec<(usize, f64, f64)> = (0..x.ncols())
            .filter_map(|feature| {
                let (min, max) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                    let v = x[[r, feature]];
                    (lo.min(v), hi.max(v))
                });
                (max > min).then_some((feature, min, max))
            })
            .collect();

        if candidates.is_empty() {
            return index;
        }

        let (feature, min, max) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = rng.gen_range(min..max);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| x[[r, feature]] < threshold);

        let left = self.build(x, left_rows, depth + 1, max_depth, rng);
        let right = self.build(x, right_rows, depth + 1, max_depth, rng);
        self.nodes[index] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        index
    }

    fn path_length(&self, x: &ArrayView2<f64>, row: usize) -> f64 {
        let mut index = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[index] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if x[[row, *feature]] < *threshold { *left } else { *right };
                    depth += 1.0;
                }
                Node::Leaf { size } => return depth + average_path_length(*size),
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` items
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Fitted isolation forest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    n_features: usize,
    sample_size: usize,
    /// Scores strictly above this value are outliers
    threshold: f64,
    params: IsolationForestParams,
}

impl IsolationForest {
    /// Fit a forest on `x` (rows = samples)
    pub fn fit(x: ArrayView2<f64>, params: &IsolationForestParams) -> Result<Self> {
        let n_rows = x.nrows();
        if n_rows == 0 || x.ncols() == 0 {
            return Err(GuardError::EmptyDataset(
                "isolation forest needs at least one row and one column".to_string(),
            ));
        }

        let sample_size = params
            .max_samples
            .unwrap_or(DEFAULT_MAX_SAMPLES)
            .clamp(1, n_rows);
        let max_depth = (sample_size.max(2) as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(params.seed);

        let trees = (0..params.n_estimators.max(1))
            .map(|_| {
                let rows = rand::seq::index::sample(&mut rng, n_rows, sample_size).into_vec();
                IsolationTree::grow(&x, rows, max_depth, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            n_features: x.ncols(),
            sample_size,
            threshold: f64::INFINITY,
            params: params.clone(),
        };

        let scores = forest.score_samples(x)?;
        let contamination = params.contamination.clamp(0.0, 0.5);
        forest.threshold = percentile(&scores, 1.0 - contamination);

        debug!(
            trees = forest.trees.len(),
            sample_size,
            threshold = forest.threshold,
            "Isolation forest fitted"
        );
        Ok(forest)
    }

    /// Anomaly score per row in (0, 1]; higher is more anomalous
    pub fn score_samples(&self, x: ArrayView2<f64>) -> Result<Vec<f64>> {
        self.check_dimensions(&x)?;
        let normalizer = average_path_length(self.sample_size).max(f64::EPSILON);
        let n_trees = self.trees.len() as f64;

        Ok((0..x.nrows())
            .map(|row| {
                let mean_path: f64 =
                    self.trees.iter().map(|t| t.path_length(&x, row)).sum::<f64>() / n_trees;
                2f64.powf(-mean_path / normalizer)
            })
            .collect())
    }

    /// Label rows: `-1` for outliers, `1` for inliers
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<i8>> {
        Ok(self
            .outliers(x)?
            .into_iter()
            .map(|outlier| if outlier { -1 } else { 1 })
            .collect())
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn params(&self) -> &IsolationForestParams {
        &self.params
    }

    fn check_dimensions(&self, x: &ArrayView2<f64>) -> Result<()> {
        if x.ncols() != self.n_features {
            return Err(GuardError::DimensionMismatch {
                expected: self.n_features,
                actual: x.ncols(),
            });
        }
        Ok(())
    }
}

impl OutlierModel for IsolationForest {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn outliers(&self, x: ArrayView2<f64>) -> Result<Vec<bool>> {
        Ok(self
            .score_samples(x)?
            .into_iter()
            .map(|score| score > self.threshold)
            .collect())
    }
}

/// Linear-interpolated quantile, `q` in [0, 1]
fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let weight = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}
