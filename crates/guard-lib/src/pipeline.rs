//! Offline analytics pipeline
//!
//! Runs the stages in order and writes one artifact per stage:
//! 1. Preprocess the metrics CSV
//! 2. Fit the isolation forest and report combined anomalies
//! 3. Train the predictive maintenance regressor
//! 4. Cluster application log messages (when a log file is given)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::anomaly::{
    AnomalyReport, CombinedDetector, CpuDeviationRule, IsolationForest, IsolationForestParams,
};
use crate::artifacts::{AnomalyArtifact, ModelKind, ModelStore};
use crate::error::{GuardError, Result};
use crate::logs::{self, LogClusterer, DEFAULT_CLUSTERS};
use crate::maintenance::{self, ForestParams, TrainingReport};
use crate::models::columns;
use crate::observability::{GuardMetrics, StructuredLogger};
use crate::preprocess::{self, MetricsTable, PreprocessConfig};

/// Inputs and hyperparameters for a full training run
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub metrics_path: PathBuf,
    pub logs_path: Option<PathBuf>,
    /// Where to write the grouped log report
    pub report_path: Option<PathBuf>,
    pub preprocess: PreprocessConfig,
    pub isolation: IsolationForestParams,
    pub forest: ForestParams,
    pub clusters: usize,
}

impl TrainingConfig {
    pub fn new(metrics_path: impl Into<PathBuf>) -> Self {
        Self {
            metrics_path: metrics_path.into(),
            logs_path: None,
            report_path: None,
            preprocess: PreprocessConfig {
                n_components: Some(5),
                ..Default::default()
            },
            isolation: IsolationForestParams::default(),
            forest: ForestParams {
                max_depth: Some(10),
                ..Default::default()
            },
            clusters: DEFAULT_CLUSTERS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalySummary {
    pub rows: usize,
    pub model_flags: usize,
    pub rule_flags: usize,
    pub combined: usize,
}

impl From<&AnomalyReport> for AnomalySummary {
    fn from(report: &AnomalyReport) -> Self {
        Self {
            rows: report.total_rows(),
            model_flags: report.model_count(),
            rule_flags: report.rule_count(),
            combined: report.combined_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub rows: usize,
    pub feature_names: Vec<String>,
    pub selected_features: Vec<String>,
    pub removed_outliers: usize,
    pub anomalies: AnomalySummary,
    pub maintenance: TrainingReport,
    pub log_lines: Option<usize>,
    pub cluster_sizes: Option<Vec<usize>>,
    pub artifacts: Vec<PathBuf>,
}

/// Run every stage and save the resulting artifacts into `store`
pub fn train_all(config: &TrainingConfig, store: &ModelStore) -> Result<TrainingSummary> {
    let logger = StructuredLogger::new("opsguard-pipeline");
    let metrics = GuardMetrics::new();
    let mut artifacts = Vec::new();

    info!(stage = 1, "Preprocessing data");
    let prepared = preprocess::load_and_prepare(&config.metrics_path, &config.preprocess)?;

    info!(stage = 2, "Training anomaly detection model");
    if prepared.feature_names.first().map(String::as_str) != Some(columns::CPU_UTILIZATION) {
        return Err(GuardError::MissingColumn(columns::CPU_UTILIZATION.to_string()));
    }
    let forest = IsolationForest::fit(prepared.raw.view(), &config.isolation)?;
    let artifact = AnomalyArtifact {
        feature_names: prepared.feature_names.clone(),
        forest,
        rule: CpuDeviationRule::default(),
    };
    let report = CombinedDetector::new(&artifact.forest)
        .with_rule(artifact.rule)
        .evaluate(prepared.raw.view())?;
    let anomalies = AnomalySummary::from(&report);
    logger.log_anomalies(
        anomalies.rows,
        anomalies.model_flags,
        anomalies.rule_flags,
        anomalies.combined,
    );
    metrics.add_anomalies_flagged(anomalies.combined as u64);
    artifacts.push(save(store, &logger, ModelKind::Anomaly, &artifact)?);

    info!(stage = 3, "Training predictive maintenance model");
    let mut model = maintenance::train(prepared.features.view(), &prepared.target, &config.forest)?;
    model.transform = Some(prepared.transform.clone());
    artifacts.push(save(store, &logger, ModelKind::Maintenance, &model)?);

    let mut log_lines = None;
    let mut cluster_sizes = None;
    if let Some(logs_path) = &config.logs_path {
        info!(stage = 4, "Clustering log messages");
        let clustered = cluster_log_file(logs_path, config.clusters, config.report_path.as_deref())?;
        log_lines = Some(clustered.lines.len());
        cluster_sizes = Some(clustered.cluster_sizes());
        artifacts.push(save(store, &logger, ModelKind::LogClustering, &clustered.model)?);
    }

    Ok(TrainingSummary {
        rows: prepared.raw.nrows(),
        feature_names: prepared.feature_names,
        selected_features: prepared.transform.selected_columns(),
        removed_outliers: prepared.removed_outliers,
        anomalies,
        maintenance: model.report,
        log_lines,
        cluster_sizes,
        artifacts,
    })
}

fn save<T: Serialize>(
    store: &ModelStore,
    logger: &StructuredLogger,
    kind: ModelKind,
    model: &T,
) -> Result<PathBuf> {
    let path = store.save(kind, model)?;
    logger.log_model_saved(&kind.to_string(), &path.display().to_string());
    Ok(path)
}

/// One flagged row of a detection run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedRow {
    pub row: usize,
    pub timestamp: Option<String>,
    pub cpu_utilization: f64,
    pub model_flag: bool,
    pub rule_flag: bool,
}

#[derive(Debug, Clone)]
pub struct Detection {
    pub report: AnomalyReport,
    pub flagged: Vec<FlaggedRow>,
}

/// Apply a trained anomaly artifact to every row of `table`
pub fn detect_anomalies(table: &MetricsTable, artifact: &AnomalyArtifact) -> Result<Detection> {
    let matrix = table.matrix_for(&artifact.feature_names)?;
    let report = CombinedDetector::new(&artifact.forest)
        .with_rule(artifact.rule)
        .evaluate(matrix.view())?;

    let flagged = report
        .flagged_rows()
        .into_iter()
        .map(|row| FlaggedRow {
            row,
            timestamp: table.timestamps.get(row).cloned(),
            cpu_utilization: matrix[[row, 0]],
            model_flag: report.model_flags[row],
            rule_flag: report.rule_flags[row],
        })
        .collect();

    GuardMetrics::new().add_anomalies_flagged(report.combined_count() as u64);
    Ok(Detection { report, flagged })
}

/// Log lines with their fitted clustering
#[derive(Debug, Clone)]
pub struct ClusteredLogs {
    pub model: LogClusterer,
    pub lines: Vec<String>,
    pub labels: Vec<usize>,
}

impl ClusteredLogs {
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.model.n_clusters()];
        for label in &self.labels {
            if let Some(size) = sizes.get_mut(*label) {
                *size += 1;
            }
        }
        sizes
    }
}

/// Preprocess and cluster a log file, optionally writing the grouped report
pub fn cluster_log_file(
    path: impl AsRef<Path>,
    clusters: usize,
    report_path: Option<&Path>,
) -> Result<ClusteredLogs> {
    let lines = logs::preprocess_logs(path)?;
    let (model, labels) = LogClusterer::fit(&lines, clusters)?;
    if let Some(report_path) = report_path {
        logs::save_cluster_report(report_path, &labels, &lines)?;
    }
    Ok(ClusteredLogs {
        model,
        lines,
        labels,
    })
}
