//! Offline pipeline commands: train, detect, logs

use anyhow::{Context, Result};
use colored::Colorize;
use guard_lib::{
    artifacts::AnomalyArtifact,
    pipeline::{self, FlaggedRow, TrainingConfig},
    preprocess::MetricsTable,
    ModelKind, ModelStore,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tabled::Tabled;

use crate::output::{format_cpu, format_flag, print_info, print_json, print_success, print_table, OutputFormat};

/// Options for a full training run
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub metrics: PathBuf,
    pub logs: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub clusters: usize,
    pub estimators: usize,
    pub components: usize,
}

/// Row for the flagged samples table
#[derive(Tabled, Serialize)]
struct FlaggedRowView {
    #[tabled(rename = "Row")]
    row: usize,
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Rule")]
    rule: String,
}

impl From<&FlaggedRow> for FlaggedRowView {
    fn from(row: &FlaggedRow) -> Self {
        Self {
            row: row.row,
            timestamp: row.timestamp.clone().unwrap_or_else(|| "-".to_string()),
            cpu: format_cpu(Some(row.cpu_utilization)),
            model: format_flag(row.model_flag),
            rule: format_flag(row.rule_flag),
        }
    }
}

/// Row for the cluster summary table
#[derive(Tabled, Serialize)]
struct ClusterRow {
    #[tabled(rename = "Cluster")]
    cluster: usize,
    #[tabled(rename = "Lines")]
    lines: usize,
    #[tabled(rename = "Example")]
    example: String,
}

/// Run every pipeline stage and save the artifacts
pub fn train(options: TrainOptions, models_dir: &Path, format: OutputFormat) -> Result<()> {
    let mut config = TrainingConfig::new(&options.metrics);
    config.logs_path = options.logs;
    config.report_path = options.report;
    config.clusters = options.clusters;
    config.forest.n_estimators = options.estimators;
    config.preprocess.n_components = Some(options.components);

    let store = ModelStore::new(models_dir);
    let summary = pipeline::train_all(&config, &store)
        .with_context(|| format!("Training on {} failed", options.metrics.display()))?;

    match format {
        OutputFormat::Json => print_json(&summary),
        OutputFormat::Table => {
            println!("{}", "Training Summary".bold());
            println!("{}", "=".repeat(50));
            println!("Rows:                   {}", summary.rows);
            println!("Outlier rows removed:   {}", summary.removed_outliers);
            println!("Features:               {}", summary.feature_names.join(", "));
            println!("Selected:               {}", summary.selected_features.join(", "));
            println!();

            println!("{}", "Anomaly Detection".bold());
            println!("{}", "-".repeat(50));
            println!("Isolation forest:       {}", summary.anomalies.model_flags);
            println!("CPU rule:               {}", summary.anomalies.rule_flags);
            println!("Combined:               {}", summary.anomalies.combined.to_string().red());
            println!();

            println!("{}", "Predictive Maintenance".bold());
            println!("{}", "-".repeat(50));
            println!("Test MSE:               {:.4}", summary.maintenance.test_mse);
            if let Some(cv) = summary.maintenance.cv_mse {
                println!("Cross-validation MSE:   {:.4}", cv);
            }
            println!();

            if let Some(sizes) = &summary.cluster_sizes {
                println!("{}", "Log Clustering".bold());
                println!("{}", "-".repeat(50));
                for (cluster, size) in sizes.iter().enumerate() {
                    println!("Cluster {}:              {} lines", cluster, size);
                }
                println!();
            }

            for path in &summary.artifacts {
                print_success(&format!("Saved {}", path.display()));
            }
        }
    }

    Ok(())
}

/// Apply the saved anomaly model to a metrics CSV
pub fn detect(metrics: &Path, models_dir: &Path, format: OutputFormat) -> Result<()> {
    let store = ModelStore::new(models_dir);
    let artifact: AnomalyArtifact = store
        .load(ModelKind::Anomaly)
        .context("Anomaly model unavailable, run `opsguard train` first")?;
    let table = MetricsTable::from_path(metrics)
        .with_context(|| format!("Failed to read {}", metrics.display()))?;

    let detection = pipeline::detect_anomalies(&table, &artifact)?;
    let rows: Vec<FlaggedRowView> = detection.flagged.iter().map(FlaggedRowView::from).collect();

    match format {
        OutputFormat::Json => print_json(&detection.flagged),
        OutputFormat::Table => {
            print_table(&rows, format);
            print_info(&format!(
                "{} of {} rows flagged (model {}, rule {})",
                detection.report.combined_count(),
                detection.report.total_rows(),
                detection.report.model_count(),
                detection.report.rule_count()
            ));
        }
    }

    Ok(())
}

/// Cluster a log file, optionally saving the model and grouped report
pub fn logs(
    path: &Path,
    clusters: usize,
    report: Option<&Path>,
    save_model: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let clustered = pipeline::cluster_log_file(path, clusters, report)
        .with_context(|| format!("Failed to cluster {}", path.display()))?;

    let rows: Vec<ClusterRow> = clustered
        .cluster_sizes()
        .into_iter()
        .enumerate()
        .map(|(cluster, lines)| ClusterRow {
            cluster,
            lines,
            example: clustered
                .labels
                .iter()
                .position(|label| *label == cluster)
                .map(|i| clustered.lines[i].clone())
                .unwrap_or_default(),
        })
        .collect();
    print_table(&rows, format);

    let saved = match save_model {
        Some(models_dir) => {
            Some(ModelStore::new(models_dir).save(ModelKind::LogClustering, &clustered.model)?)
        }
        None => None,
    };
    if format == OutputFormat::Table {
        if let Some(report) = report {
            print_success(&format!("Wrote report {}", report.display()));
        }
        if let Some(saved) = saved {
            print_success(&format!("Saved {}", saved.display()));
        }
    }

    Ok(())
}
