//! Local remediation against a cloud snapshot
//!
//! Runs the same handler the agent runs, backed by a JSON snapshot, and
//! prints the envelope plus every action that would have been issued.

use anyhow::{Context, Result};
use colored::Colorize;
use guard_lib::{
    models::RemediationAction,
    remediation::{
        CloudContext, FixtureCloud, HandlerResponse, RecordedAction, RemediationConfig,
        RemediationHandler, RemediationOutcome,
    },
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tabled::Tabled;

use super::read_json;
use crate::output::{
    color_status_code, format_cpu, print_json, print_table, print_warning, OutputFormat,
};

#[derive(Debug, Clone)]
pub struct RemediateOptions {
    pub snapshot: PathBuf,
    pub event: PathBuf,
    pub action: RemediationAction,
    pub respect_grace_period: bool,
    pub require_metric_data: bool,
}

/// Row for the recorded actions table
#[derive(Tabled, Serialize)]
struct ActionRow {
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Instances")]
    instances: String,
}

impl From<&RecordedAction> for ActionRow {
    fn from(action: &RecordedAction) -> Self {
        match action {
            RecordedAction::SetInstanceHealth(mark) => Self {
                action: format!("set_instance_health ({:?})", mark.health_status),
                instances: mark.instance_id.clone(),
            },
            RecordedAction::RebootInstances { instance_ids } => Self {
                action: "reboot_instances".to_string(),
                instances: instance_ids.join(", "),
            },
        }
    }
}

#[derive(Serialize)]
struct RemediationReport<'a> {
    response: &'a HandlerResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<&'a RemediationOutcome>,
    actions: Vec<RecordedAction>,
}

pub async fn run(options: RemediateOptions, format: OutputFormat) -> Result<()> {
    let cloud = Arc::new(
        FixtureCloud::from_path(&options.snapshot)
            .with_context(|| format!("Failed to load snapshot {}", options.snapshot.display()))?,
    );
    let event = read_json(&options.event)?;

    let config = RemediationConfig {
        respect_grace_period: options.respect_grace_period,
        require_metric_data: options.require_metric_data,
        ..Default::default()
    };
    let handler = RemediationHandler::new(CloudContext::from_shared(cloud.clone()), config);

    let result = match options.action {
        RemediationAction::MarkUnhealthy => handler.handle_alarm(&event).await,
        RemediationAction::Reboot => handler.handle_reboot(&event).await,
    };
    let response = HandlerResponse::from(&result);
    let actions = cloud.recorded_actions();

    match format {
        OutputFormat::Json => print_json(&RemediationReport {
            response: &response,
            outcome: result.as_ref().ok(),
            actions,
        }),
        OutputFormat::Table => {
            println!(
                "{} {}",
                color_status_code(response.status_code),
                response.body.bold()
            );
            if let Ok(RemediationOutcome::Remediated(decision)) = &result {
                println!("Candidates:             {}", decision.candidates);
                println!("CPU utilization:        {}", format_cpu(decision.cpu_utilization));
                if let Some(group) = &decision.group_name {
                    println!("Scaling group:          {}", group.cyan());
                }
                if !decision.metrics_complete && decision.cpu_utilization.is_some() {
                    print_warning("Some candidates reported no CPU datapoints and counted as 0%");
                }
            }
            println!();
            let rows: Vec<ActionRow> = actions.iter().map(ActionRow::from).collect();
            print_table(&rows, format);
        }
    }

    if response.status_code != 200 {
        anyhow::bail!("Remediation failed with status {}", response.status_code);
    }
    Ok(())
}
