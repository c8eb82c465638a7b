//! Metrics table loading and cleaning
//!
//! Turns a CSV metrics export into model-ready matrices:
//! - Mean imputation of missing cells
//! - Removal of constant columns and z-score outlier rows
//! - Min-max scaling, mutual-information feature selection, optional PCA

mod pca;
mod scaler;
pub mod stats;

pub use pca::Pca;
pub use scaler::{FeatureTransform, MinMaxScaler};

use std::io::Read;
use std::path::Path;

use ndarray::{Array2, Axis};
use tracing::{debug, info, warn};

use crate::error::{GuardError, Result};
use crate::models::{columns, MetricSample};

/// Configuration for [`prepare`]
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Column predicted by the maintenance model
    pub target_column: String,
    /// Columns excluded from the feature matrix
    pub drop_columns: Vec<String>,
    /// Rows with any |z| above this are removed
    pub outlier_z_threshold: f64,
    /// Features at or below this mutual information with the target are dropped
    pub mutual_info_threshold: f64,
    pub mutual_info_bins: usize,
    /// Reduce the model matrix to this many principal components
    pub n_components: Option<usize>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            target_column: columns::ERROR_RATE_PERCENTAGE.to_string(),
            drop_columns: vec![
                columns::TIMESTAMP.to_string(),
                columns::ERROR_RATE_PERCENTAGE.to_string(),
            ],
            outlier_z_threshold: 3.0,
            mutual_info_threshold: 0.01,
            mutual_info_bins: 10,
            n_components: None,
        }
    }
}

/// Raw metrics table as read from CSV
///
/// Numeric columns are stored column-major; `None` marks a missing cell.
#[derive(Debug, Clone)]
pub struct MetricsTable {
    pub columns: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
    pub timestamps: Vec<String>,
}

impl MetricsTable {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let timestamp_index = headers.iter().position(|h| h == columns::TIMESTAMP);

        let columns: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != timestamp_index)
            .map(|(_, h)| h.clone())
            .collect();
        let mut values: Vec<Vec<Option<f64>>> = vec![Vec::new(); columns.len()];
        let mut timestamps = Vec::new();

        for record in csv_reader.records() {
            let record = record?;
            let mut column = 0;
            for (i, cell) in record.iter().enumerate() {
                if Some(i) == timestamp_index {
                    timestamps.push(cell.to_string());
                    continue;
                }
                if column < values.len() {
                    values[column].push(parse_cell(cell));
                    column += 1;
                }
            }
            // Short rows leave trailing cells missing
            while column < values.len() {
                values[column].push(None);
                column += 1;
            }
        }

        Ok(Self {
            columns,
            values,
            timestamps,
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_reader(file)
    }

    pub fn n_rows(&self) -> usize {
        self.values.first().map(Vec::len).unwrap_or(0)
    }

    /// Table built from typed samples, in CSV column order
    pub fn from_samples(samples: &[MetricSample]) -> Self {
        let pick: [fn(&MetricSample) -> f64; 6] = [
            |s| s.cpu_utilization,
            |s| s.memory_usage_mb,
            |s| s.disk_io_mbps,
            |s| s.network_in_mbps,
            |s| s.network_out_mbps,
            |s| s.error_rate_percentage,
        ];
        Self {
            columns: [
                columns::CPU_UTILIZATION,
                columns::MEMORY_USAGE_MB,
                columns::DISK_IO_MBPS,
                columns::NETWORK_IN_MBPS,
                columns::NETWORK_OUT_MBPS,
                columns::ERROR_RATE_PERCENTAGE,
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
            values: pick
                .iter()
                .map(|f| samples.iter().map(|s| Some(f(s))).collect())
                .collect(),
            timestamps: samples.iter().map(|s| s.timestamp.clone()).collect(),
        }
    }

    /// Rows of the named columns, missing cells filled with the column mean
    ///
    /// No rows are removed, so row `i` still lines up with `timestamps[i]`.
    pub fn matrix_for(&self, names: &[String]) -> Result<Array2<f64>> {
        let mut matrix = Array2::zeros((self.n_rows(), names.len()));
        for (j, name) in names.iter().enumerate() {
            let index = self
                .column_index(name)
                .ok_or_else(|| GuardError::MissingColumn(name.clone()))?;
            let column = &self.values[index];
            let present: Vec<f64> = column.iter().flatten().copied().collect();
            let fill = stats::mean(&present);
            for (r, cell) in column.iter().enumerate() {
                matrix[[r, j]] = cell.unwrap_or(fill);
            }
        }
        Ok(matrix)
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

fn parse_cell(cell: &str) -> Option<f64> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Cleaned data ready for model fitting
#[derive(Debug, Clone)]
pub struct PreparedData {
    /// Names of the cleaned feature columns, CPU first when present
    pub feature_names: Vec<String>,
    /// Cleaned, unscaled features (rows aligned with `target`)
    pub raw: Array2<f64>,
    /// Scaled, selected and optionally projected features
    pub features: Array2<f64>,
    pub target: Vec<f64>,
    pub timestamps: Vec<String>,
    pub transform: FeatureTransform,
    pub dropped_constant: Vec<String>,
    pub removed_outliers: usize,
}

/// Load a CSV file and run the full cleaning pipeline
pub fn load_and_prepare(path: impl AsRef<Path>, config: &PreprocessConfig) -> Result<PreparedData> {
    info!(path = %path.as_ref().display(), "Loading metrics data");
    let table = MetricsTable::from_path(path)?;
    prepare(table, config)
}

/// Clean a metrics table into model-ready matrices
pub fn prepare(mut table: MetricsTable, config: &PreprocessConfig) -> Result<PreparedData> {
    let n_rows = table.n_rows();
    if n_rows == 0 {
        return Err(GuardError::EmptyDataset("metrics table has no rows".to_string()));
    }

    impute_missing(&mut table);

    let target_index = table
        .column_index(&config.target_column)
        .ok_or_else(|| GuardError::MissingColumn(config.target_column.clone()))?;
    let mut target: Vec<f64> = table.values[target_index].iter().map(|v| v.unwrap_or(0.0)).collect();

    let mut feature_indices: Vec<usize> = (0..table.columns.len())
        .filter(|&i| i != target_index && !config.drop_columns.contains(&table.columns[i]))
        .collect();
    // CPU utilization is the column the deviation rule reads
    if let Some(pos) = feature_indices
        .iter()
        .position(|&i| table.columns[i] == columns::CPU_UTILIZATION)
    {
        let cpu = feature_indices.remove(pos);
        feature_indices.insert(0, cpu);
    }

    let mut dropped_constant = Vec::new();
    let mut feature_names = Vec::new();
    let mut feature_columns: Vec<Vec<f64>> = Vec::new();
    for i in feature_indices {
        let column: Vec<f64> = table.values[i].iter().map(|v| v.unwrap_or(0.0)).collect();
        // The deviation rule needs CPU even when it never moves
        if stats::distinct_count(&column) <= 1 && table.columns[i] != columns::CPU_UTILIZATION {
            dropped_constant.push(table.columns[i].clone());
            continue;
        }
        feature_names.push(table.columns[i].clone());
        feature_columns.push(column);
    }
    if !dropped_constant.is_empty() {
        info!(columns = ?dropped_constant, "Removed constant features");
    }
    if feature_columns.is_empty() {
        return Err(GuardError::EmptyDataset("no usable feature columns".to_string()));
    }

    let keep = non_outlier_rows(&feature_columns, config.outlier_z_threshold);
    let removed_outliers = keep.iter().filter(|k| !**k).count();
    if removed_outliers > 0 {
        info!(removed = removed_outliers, "Removed outlier rows");
    }
    let retain = |values: &[f64]| -> Vec<f64> {
        values
            .iter()
            .zip(&keep)
            .filter_map(|(v, k)| k.then_some(*v))
            .collect()
    };
    let feature_columns: Vec<Vec<f64>> = feature_columns.iter().map(|c| retain(c)).collect();
    target = retain(&target);
    let timestamps: Vec<String> = if table.timestamps.len() == n_rows {
        table
            .timestamps
            .iter()
            .zip(&keep)
            .filter_map(|(t, k)| k.then(|| t.clone()))
            .collect()
    } else {
        Vec::new()
    };

    let rows = target.len();
    if rows == 0 {
        return Err(GuardError::EmptyDataset("all rows removed as outliers".to_string()));
    }
    let mut raw = Array2::zeros((rows, feature_columns.len()));
    for (j, column) in feature_columns.iter().enumerate() {
        for (r, v) in column.iter().enumerate() {
            raw[[r, j]] = *v;
        }
    }

    let scaler = MinMaxScaler::fit(raw.view());
    let scaled = scaler.transform(raw.view())?;

    let mut selected: Vec<usize> = (0..feature_names.len())
        .filter(|&j| {
            let column = scaled.column(j).to_vec();
            let mi = stats::mutual_information(&column, &target, config.mutual_info_bins);
            debug!(feature = %feature_names[j], mutual_info = mi, "Mutual information");
            mi > config.mutual_info_threshold
        })
        .collect();
    if selected.is_empty() {
        warn!("No feature passed the mutual information threshold, keeping all");
        selected = (0..feature_names.len()).collect();
    }
    let selected_matrix = scaled.select(Axis(1), &selected);

    let pca = match config.n_components {
        Some(n) if n > 0 && rows >= 2 => {
            let pca = Pca::fit(selected_matrix.view(), n)?;
            info!(
                components = pca.n_components(),
                explained_variance_ratio = ?pca.explained_variance_ratio(),
                "Reduced dimensions with PCA"
            );
            Some(pca)
        }
        _ => None,
    };

    let transform = FeatureTransform {
        input_columns: feature_names.clone(),
        scaler,
        selected,
        pca,
    };
    let features = transform.apply(raw.view())?;
    info!(
        rows,
        features = features.ncols(),
        selected = ?transform.selected_columns(),
        "Preprocessing complete"
    );

    Ok(PreparedData {
        feature_names,
        raw,
        features,
        target,
        timestamps,
        transform,
        dropped_constant,
        removed_outliers,
    })
}

fn impute_missing(table: &mut MetricsTable) {
    for (name, column) in table.columns.iter().zip(table.values.iter_mut()) {
        let present: Vec<f64> = column.iter().flatten().copied().collect();
        let missing = column.len() - present.len();
        if missing == 0 {
            continue;
        }
        let fill = stats::mean(&present);
        info!(column = %name, missing, fill, "Imputing missing values with column mean");
        for cell in column.iter_mut() {
            if cell.is_none() {
                *cell = Some(fill);
            }
        }
    }
}

/// `true` for rows whose every feature is within `threshold` standard deviations
fn non_outlier_rows(feature_columns: &[Vec<f64>], threshold: f64) -> Vec<bool> {
    let n_rows = feature_columns.first().map(Vec::len).unwrap_or(0);
    let mut keep = vec![true; n_rows];
    for column in feature_columns {
        let mean = stats::mean(column);
        let std = stats::std_dev(column);
        if std <= f64::EPSILON {
            continue;
        }
        for (r, v) in column.iter().enumerate() {
            if ((v - mean) / std).abs() > threshold {
                keep[r] = false;
            }
        }
    }
    keep
}
