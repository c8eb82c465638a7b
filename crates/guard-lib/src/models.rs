//! Core data models shared by the analytics and remediation pipelines

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Column names of the metrics table, in file order
pub mod columns {
    pub const TIMESTAMP: &str = "Timestamp";
    pub const CPU_UTILIZATION: &str = "CPU_Utilization";
    pub const MEMORY_USAGE_MB: &str = "Memory_Usage_MB";
    pub const DISK_IO_MBPS: &str = "Disk_IO_MBps";
    pub const NETWORK_IN_MBPS: &str = "Network_In_Mbps";
    pub const NETWORK_OUT_MBPS: &str = "Network_Out_Mbps";
    pub const ERROR_RATE_PERCENTAGE: &str = "Error_Rate_Percentage";
}

/// One row of the metrics table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "CPU_Utilization")]
    pub cpu_utilization: f64,
    #[serde(rename = "Memory_Usage_MB")]
    pub memory_usage_mb: f64,
    #[serde(rename = "Disk_IO_MBps")]
    pub disk_io_mbps: f64,
    #[serde(rename = "Network_In_Mbps")]
    pub network_in_mbps: f64,
    #[serde(rename = "Network_Out_Mbps")]
    pub network_out_mbps: f64,
    #[serde(rename = "Error_Rate_Percentage")]
    pub error_rate_percentage: f64,
}

/// Terminal action taken against a selected instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationAction {
    Reboot,
    MarkUnhealthy,
}

impl std::fmt::Display for RemediationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemediationAction::Reboot => write!(f, "reboot"),
            RemediationAction::MarkUnhealthy => write!(f, "mark_unhealthy"),
        }
    }
}

/// Outcome of one remediation invocation that acted on an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceHealthDecision {
    pub instance_id: String,
    /// Scaling group the instance was selected from, if any
    pub group_name: Option<String>,
    /// Average CPU used for the selection, 0.0 when no datapoints came
    /// back, `None` when the flow acted without querying metrics
    pub cpu_utilization: Option<f64>,
    /// False when at least one candidate returned no datapoints
    pub metrics_complete: bool,
    pub candidates: usize,
    pub action: RemediationAction,
    pub decided_at: DateTime<Utc>,
}
