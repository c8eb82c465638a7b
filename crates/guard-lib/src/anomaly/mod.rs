//! Anomaly detection for instance metrics
//!
//! Two independent signals are combined per sample:
//! - A learned outlier label from an isolation forest
//! - A fixed CPU deviation rule around a 50% midpoint

mod combined;
mod isolation_forest;
mod rule;

pub use combined::{AnomalyReport, CombinedDetector, CPU_COLUMN};
pub use isolation_forest::{average_path_length, IsolationForest, IsolationForestParams};
pub use rule::CpuDeviationRule;

use crate::error::Result;
use ndarray::ArrayView2;

/// Trait for fitted outlier models
pub trait OutlierModel: Send + Sync {
    /// Number of columns the model was fitted on
    fn n_features(&self) -> usize;

    /// Per-row outlier label, `true` for outliers
    fn outliers(&self, x: ArrayView2<f64>) -> Result<Vec<bool>>;
}

impl<M: OutlierModel + ?Sized> OutlierModel for &M {
    fn n_features(&self) -> usize {
        (**self).n_features()
    }

    fn outliers(&self, x: ArrayView2<f64>) -> Result<Vec<bool>> {
        (**self).outliers(x)
    }
}
