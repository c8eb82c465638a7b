//! Random forest regressor built from bootstrapped CART trees

use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{GuardError, Result};

/// Forest hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    /// `None` grows trees until leaves are pure or too small to split
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// Candidate split found while scanning one feature
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    child_sse: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    fn fit(
        x: &ArrayView2<f64>,
        y: &[f64],
        rows: Vec<usize>,
        params: &ForestParams,
        importances: &mut [f64],
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.build(x, y, rows, 0, params, importances);
        tree
    }

    fn build(
        &mut self,
        x: &ArrayView2<f64>,
        y: &[f64],
        rows: Vec<usize>,
        depth: usize,
        params: &ForestParams,
        importances: &mut [f64],
    ) -> usize {
        let index = self.nodes.len();
        let (sum, sum_sq) = rows
            .iter()
            .fold((0.0, 0.0), |(s, sq), &r| (s + y[r], sq + y[r] * y[r]));
        let n = rows.len() as f64;
        let value = if rows.is_empty() { 0.0 } else { sum / n };
        self.nodes.push(TreeNode::Leaf { value });

        let depth_reached = params.max_depth.map(|d| depth >= d).unwrap_or(false);
        let parent_sse = sum_sq - sum * sum / n.max(1.0);
        if rows.len() < params.min_samples_split.max(2) || depth_reached || parent_sse <= 1e-12 {
            return index;
        }

        let Some(best) = best_split(x, y, &rows) else {
            return index;
        };

        importances[best.feature] += (parent_sse - best.child_sse).max(0.0);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| x[[r, best.feature]] <= best.threshold);

        let left = self.build(x, y, left_rows, depth + 1, params, importances);
        let right = self.build(x, y, right_rows, depth + 1, params, importances);
        self.nodes[index] = TreeNode::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        index
    }

    fn predict_row(&self, x: &ArrayView2<f64>, row: usize) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if x[[row, *feature]] <= *threshold { *left } else { *right };
                }
                TreeNode::Leaf { value } => return *value,
            }
        }
    }
}

/// Lowest summed squared error split over all features
fn best_split(x: &ArrayView2<f64>, y: &[f64], rows: &[usize]) -> Option<SplitCandidate> {
    let n = rows.len();
    let mut best: Option<SplitCandidate> = None;
    let mut sorted = rows.to_vec();

    for feature in 0..x.ncols() {
        sorted.sort_by(|&a, &b| {
            x[[a, feature]]
                .partial_cmp(&x[[b, feature]])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let (total, total_sq) = sorted
            .iter()
            .fold((0.0, 0.0), |(s, sq), &r| (s + y[r], sq + y[r] * y[r]));
        let mut left_sum = 0.0;
        let mut left_sq = 0.0;

        for i in 0..n - 1 {
            let r = sorted[i];
            left_sum += y[r];
            left_sq += y[r] * y[r];

            let current = x[[r, feature]];
            let next = x[[sorted[i + 1], feature]];
            if next <= current {
                continue;
            }

            let left_n = (i + 1) as f64;
            let right_n = (n - i - 1) as f64;
            let right_sum = total - left_sum;
            let right_sq = total_sq - left_sq;
            let child_sse = (left_sq - left_sum * left_sum / left_n)
                + (right_sq - right_sum * right_sum / right_n);

            if best.as_ref().map(|b| child_sse < b.child_sse).unwrap_or(true) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (current + next) / 2.0,
                    child_sse,
                });
            }
        }
    }
    best
}

/// Bagged ensemble of regression trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    trees: Vec<RegressionTree>,
    n_features: usize,
    feature_importances: Vec<f64>,
    params: ForestParams,
}

impl RandomForestRegressor {
    pub fn fit(x: ArrayView2<f64>, y: &[f64], params: &ForestParams) -> Result<Self> {
        let n_rows = x.nrows();
        if n_rows == 0 || x.ncols() == 0 {
            return Err(GuardError::EmptyDataset(
                "random forest needs at least one row and one column".to_string(),
            ));
        }
        if y.len() != n_rows {
            return Err(GuardError::DimensionMismatch {
                expected: n_rows,
                actual: y.len(),
            });
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut importances = vec![0.0; x.ncols()];
        let mut trees = Vec::with_capacity(params.n_estimators);

        for _ in 0..params.n_estimators.max(1) {
            let rows: Vec<usize> = (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect();
            let mut tree_importances = vec![0.0; x.ncols()];
            trees.push(RegressionTree::fit(&x, y, rows, params, &mut tree_importances));

            let total: f64 = tree_importances.iter().sum();
            if total > 0.0 {
                for (acc, v) in importances.iter_mut().zip(&tree_importances) {
                    *acc += v / total;
                }
            }
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }

        Ok(Self {
            trees,
            n_features: x.ncols(),
            feature_importances: importances,
            params: params.clone(),
        })
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<f64>> {
        if x.ncols() != self.n_features {
            return Err(GuardError::DimensionMismatch {
                expected: self.n_features,
                actual: x.ncols(),
            });
        }
        let n_trees = self.trees.len() as f64;
        Ok((0..x.nrows())
            .map(|row| self.trees.iter().map(|t| t.predict_row(&x, row)).sum::<f64>() / n_trees)
            .collect())
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Impurity-based importances, summing to 1.0 when any split was made
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }
}
