//! Opsguard CLI
//!
//! A command-line tool for training the analytics models, running detection
//! and log clustering offline, dry-running remediation against a cloud
//! snapshot, and sending events to a running agent.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{invoke, pipeline, remediate};
use guard_lib::models::RemediationAction;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Opsguard CLI
#[derive(Parser)]
#[command(name = "opsguard")]
#[command(author, version, about = "CLI for Opsguard analytics and remediation", long_about = None)]
pub struct Cli {
    /// Agent URL (can also be set via OPSGUARD_API_URL env var)
    #[arg(long, env = "OPSGUARD_API_URL")]
    pub api_url: Option<String>,

    /// Model artifact directory (can also be set via OPSGUARD_MODELS_DIR env var)
    #[arg(long, env = "OPSGUARD_MODELS_DIR")]
    pub models_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train the anomaly, maintenance and log clustering models
    Train {
        /// Metrics CSV
        #[arg(long, default_value = "data/synthetic_metrics.csv")]
        metrics: PathBuf,

        /// Application log to cluster
        #[arg(long)]
        logs: Option<PathBuf>,

        /// Where to write the grouped log report
        #[arg(long)]
        report: Option<PathBuf>,

        /// Number of log clusters
        #[arg(long, default_value_t = 3)]
        clusters: usize,

        /// Trees in the maintenance random forest
        #[arg(long, default_value_t = 100)]
        estimators: usize,

        /// Principal components kept for the maintenance model
        #[arg(long, default_value_t = 5)]
        components: usize,
    },

    /// Flag anomalous rows of a metrics CSV with the trained model
    Detect {
        /// Metrics CSV
        metrics: PathBuf,
    },

    /// Cluster application log messages
    Logs {
        /// Log file
        path: PathBuf,

        /// Number of clusters
        #[arg(long, default_value_t = 3)]
        clusters: usize,

        /// Where to write the grouped report
        #[arg(long)]
        report: Option<PathBuf>,

        /// Save the fitted model into the models directory
        #[arg(long)]
        save: bool,
    },

    /// Run the remediation handler locally against a cloud snapshot
    Remediate {
        /// Cloud snapshot JSON
        #[arg(long)]
        snapshot: PathBuf,

        /// Event JSON file, or - for stdin
        #[arg(long)]
        event: PathBuf,

        /// Reboot the named instance instead of marking one unhealthy
        #[arg(long)]
        reboot: bool,

        /// Respect the scaling group's health check grace period
        #[arg(long)]
        respect_grace_period: bool,

        /// Refuse to act when no candidate reported CPU data
        #[arg(long)]
        require_metric_data: bool,
    },

    /// Send an event to a running agent
    #[command(subcommand)]
    Invoke(InvokeCommands),

    /// Show the agent's component health
    Status,
}

#[derive(Subcommand)]
pub enum InvokeCommands {
    /// Alarm event: mark the busiest in-service instance unhealthy
    Alarm {
        /// Event JSON file, or - for stdin
        event: PathBuf,
    },

    /// Reboot event for a named instance
    Reboot {
        /// Event JSON file, or - for stdin
        event: PathBuf,
    },

    /// Inference request against the loaded models
    Inference {
        /// Request JSON file, or - for stdin
        request: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = config::Config::load()?;
    let format = cli
        .format
        .or_else(|| {
            settings
                .default_format
                .as_deref()
                .and_then(output::OutputFormat::from_name)
        })
        .unwrap_or_default();
    let models_dir = settings.models_dir(cli.models_dir);

    // Execute command
    match cli.command {
        Commands::Train {
            metrics,
            logs,
            report,
            clusters,
            estimators,
            components,
        } => {
            let options = pipeline::TrainOptions {
                metrics,
                logs,
                report,
                clusters,
                estimators,
                components,
            };
            pipeline::train(options, &models_dir, format)?;
        }
        Commands::Detect { metrics } => {
            pipeline::detect(&metrics, &models_dir, format)?;
        }
        Commands::Logs {
            path,
            clusters,
            report,
            save,
        } => {
            let save_dir = save.then_some(models_dir.as_path());
            pipeline::logs(&path, clusters, report.as_deref(), save_dir, format)?;
        }
        Commands::Remediate {
            snapshot,
            event,
            reboot,
            respect_grace_period,
            require_metric_data,
        } => {
            let options = remediate::RemediateOptions {
                snapshot,
                event,
                action: if reboot {
                    RemediationAction::Reboot
                } else {
                    RemediationAction::MarkUnhealthy
                },
                respect_grace_period,
                require_metric_data,
            };
            remediate::run(options, format).await?;
        }
        Commands::Invoke(invoke_cmd) => {
            let client = client::ApiClient::new(&settings.api_url(cli.api_url))?;
            let (route, path) = match invoke_cmd {
                InvokeCommands::Alarm { event } => (invoke::EventRoute::Alarm, event),
                InvokeCommands::Reboot { event } => (invoke::EventRoute::Reboot, event),
                InvokeCommands::Inference { request } => (invoke::EventRoute::Inference, request),
            };
            invoke::send_event(&client, route, &path, format).await?;
        }
        Commands::Status => {
            let client = client::ApiClient::new(&settings.api_url(cli.api_url))?;
            invoke::show_status(&client, format).await?;
        }
    }

    Ok(())
}
