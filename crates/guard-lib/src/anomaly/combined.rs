//! Combined anomaly decision
//!
//! A row is anomalous when the outlier model flags it OR the CPU deviation
//! rule flags its CPU column.

use ndarray::ArrayView2;
use serde::Serialize;

use super::{CpuDeviationRule, OutlierModel};
use crate::error::{GuardError, Result};

/// Column holding CPU utilization (percent) in every feature matrix
pub const CPU_COLUMN: usize = 0;

/// Per-row breakdown of both signals and their combination
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyReport {
    pub model_flags: Vec<bool>,
    pub rule_flags: Vec<bool>,
    pub combined: Vec<bool>,
}

impl AnomalyReport {
    pub fn total_rows(&self) -> usize {
        self.combined.len()
    }

    pub fn model_count(&self) -> usize {
        self.model_flags.iter().filter(|f| **f).count()
    }

    pub fn rule_count(&self) -> usize {
        self.rule_flags.iter().filter(|f| **f).count()
    }

    pub fn combined_count(&self) -> usize {
        self.combined.iter().filter(|f| **f).count()
    }

    /// Indices of rows flagged by either signal
    pub fn flagged_rows(&self) -> Vec<usize> {
        self.combined
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.then_some(i))
            .collect()
    }
}

/// Outlier model plus CPU rule, evaluated together
pub struct CombinedDetector<M: OutlierModel> {
    model: M,
    rule: CpuDeviationRule,
}

impl<M: OutlierModel> CombinedDetector<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            rule: CpuDeviationRule::default(),
        }
    }

    pub fn with_rule(mut self, rule: CpuDeviationRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn rule(&self) -> &CpuDeviationRule {
        &self.rule
    }

    /// Boolean anomaly flag per row
    pub fn flag(&self, x: ArrayView2<f64>) -> Result<Vec<bool>> {
        Ok(self.evaluate(x)?.combined)
    }

    /// Evaluate both signals and keep the per-signal breakdown
    pub fn evaluate(&self, x: ArrayView2<f64>) -> Result<AnomalyReport> {
        let expected = self.model.n_features();
        if x.ncols() != expected {
            return Err(GuardError::DimensionMismatch {
                expected,
                actual: x.ncols(),
            });
        }

        let model_flags = self.model.outliers(x)?;
        if model_flags.len() != x.nrows() {
            return Err(GuardError::DimensionMismatch {
                expected: x.nrows(),
                actual: model_flags.len(),
            });
        }

        let rule_flags = self.rule.evaluate(x.column(CPU_COLUMN).iter().copied());
        let combined = model_flags
            .iter()
            .zip(&rule_flags)
            .map(|(m, r)| *m || *r)
            .collect();

        Ok(AnomalyReport {
            model_flags,
            rule_flags,
            combined,
        })
    }
}
