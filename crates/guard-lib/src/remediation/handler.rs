//! Per-event remediation state machine
//!
//! `Received -> Parsed -> Queried -> Selected -> ActionIssued -> Done`, with
//! `Failed` reachable from `Parsed`, `Queried` and `ActionIssued`. Nothing is
//! retried; the event source owns redelivery.

use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use super::backend::{CloudContext, HealthMark, HealthStatus, MetricQuery, Statistic};
use super::event::{AlarmEvent, AlarmTarget};
use super::selector::{select_worst_instance, summarize_datapoints};
use crate::error::GuardError;
use crate::models::{InstanceHealthDecision, RemediationAction};
use crate::observability::{GuardMetrics, StructuredLogger};

/// Settings shared by every invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationConfig {
    /// Length of the CPU lookback window
    pub metric_window_secs: u64,
    pub metric_period_secs: u32,
    pub statistic: Statistic,
    /// `false` marks instances unhealthy immediately
    pub respect_grace_period: bool,
    /// Fail instead of selecting when no candidate reported any datapoint
    pub require_metric_data: bool,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            metric_window_secs: 600,
            metric_period_secs: 60,
            statistic: Statistic::Average,
            respect_grace_period: false,
            require_metric_data: false,
        }
    }
}

impl RemediationConfig {
    /// Lookback window as a duration
    pub fn metric_window(&self) -> Result<chrono::Duration, GuardError> {
        i64::try_from(self.metric_window_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| {
                GuardError::InvalidConfig(format!(
                    "metric window of {}s is out of range",
                    self.metric_window_secs
                ))
            })
    }

    /// Reject settings that would make every metric query fail
    pub fn validate(&self) -> Result<(), GuardError> {
        let window = self.metric_window()?;
        if Utc::now().checked_sub_signed(window).is_none() {
            return Err(GuardError::InvalidConfig(format!(
                "metric window of {}s reaches before the earliest representable time",
                self.metric_window_secs
            )));
        }
        if self.metric_period_secs == 0 {
            return Err(GuardError::InvalidConfig(
                "metric period must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStage {
    Received,
    Parsed,
    Queried,
    Selected,
    ActionIssued,
    Done,
    Failed,
}

impl std::fmt::Display for InvocationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            InvocationStage::Received => "received",
            InvocationStage::Parsed => "parsed",
            InvocationStage::Queried => "queried",
            InvocationStage::Selected => "selected",
            InvocationStage::ActionIssued => "action_issued",
            InvocationStage::Done => "done",
            InvocationStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RemediationOutcome {
    Remediated(InstanceHealthDecision),
    /// Alarm moved to a state that needs no action
    NoActionNeeded {
        alarm_name: Option<String>,
        state: Option<String>,
    },
}

/// Invocation that ended in `Failed`, with the stage it failed from
#[derive(Debug, Error)]
#[error("remediation failed at {stage}: {error}")]
pub struct RemediationFailure {
    pub stage: InvocationStage,
    #[source]
    pub error: GuardError,
}

impl RemediationFailure {
    fn at(stage: InvocationStage) -> impl FnOnce(GuardError) -> Self {
        move |error| Self { stage, error }
    }

    /// Label used for metrics and logs
    pub fn outcome_label(&self) -> &'static str {
        match &self.error {
            e if e.is_invalid_input() => "invalid_input",
            GuardError::Backend(_) => "backend_failure",
            _ => "failed",
        }
    }
}

pub type InvocationResult = Result<RemediationOutcome, RemediationFailure>;

/// `{statusCode, body}` envelope returned to the event source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl From<&InvocationResult> for HandlerResponse {
    fn from(result: &InvocationResult) -> Self {
        match result {
            Ok(RemediationOutcome::Remediated(decision)) => {
                let body = match decision.action {
                    RemediationAction::Reboot => {
                        format!("Instance {} rebooted successfully", decision.instance_id)
                    }
                    RemediationAction::MarkUnhealthy => {
                        format!("Instance {} marked as unhealthy", decision.instance_id)
                    }
                };
                Self {
                    status_code: 200,
                    body,
                }
            }
            Ok(RemediationOutcome::NoActionNeeded { state, .. }) => Self {
                status_code: 200,
                body: format!(
                    "No action needed for alarm state {}",
                    state.as_deref().unwrap_or("unknown")
                ),
            },
            Err(failure) if failure.error.is_invalid_input() => Self {
                status_code: 400,
                body: failure.error.to_string(),
            },
            Err(failure) => Self {
                status_code: 500,
                body: failure.to_string(),
            },
        }
    }
}

/// Handles alarm and reboot events against injected cloud clients
#[derive(Debug, Clone)]
pub struct RemediationHandler {
    cloud: CloudContext,
    config: RemediationConfig,
    metrics: GuardMetrics,
    logger: StructuredLogger,
}

impl RemediationHandler {
    pub fn new(cloud: CloudContext, config: RemediationConfig) -> Self {
        Self {
            cloud,
            config,
            metrics: GuardMetrics::new(),
            logger: StructuredLogger::new("opsguard"),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &RemediationConfig {
        &self.config
    }

    /// Mark the worst in-service instance unhealthy
    pub async fn handle_alarm(&self, raw: &Value) -> InvocationResult {
        self.invoke(RemediationAction::MarkUnhealthy, raw).await
    }

    /// Reboot the instance named by the event
    pub async fn handle_reboot(&self, raw: &Value) -> InvocationResult {
        self.invoke(RemediationAction::Reboot, raw).await
    }

    async fn invoke(&self, action: RemediationAction, raw: &Value) -> InvocationResult {
        let started = Instant::now();
        let flow = action.to_string();
        debug!(flow = %flow, stage = %InvocationStage::Received, "Remediation event received");

        let result = match action {
            RemediationAction::MarkUnhealthy => self.mark_unhealthy_flow(raw).await,
            RemediationAction::Reboot => self.reboot_flow(raw).await,
        };

        let outcome = match &result {
            Ok(RemediationOutcome::Remediated(decision)) => {
                self.logger.log_remediation(
                    &flow,
                    &decision.instance_id,
                    &decision.action.to_string(),
                    decision.cpu_utilization.unwrap_or_default(),
                    decision.candidates,
                );
                "remediated"
            }
            Ok(RemediationOutcome::NoActionNeeded { alarm_name, state }) => {
                info!(
                    flow = %flow,
                    alarm = ?alarm_name,
                    state = ?state,
                    "Alarm state needs no action"
                );
                "no_action"
            }
            Err(failure) => {
                self.logger.log_remediation_failure(
                    &flow,
                    &failure.stage.to_string(),
                    &failure.error.to_string(),
                );
                failure.outcome_label()
            }
        };
        self.metrics
            .record_invocation(&flow, outcome, started.elapsed().as_secs_f64());
        result
    }

    async fn mark_unhealthy_flow(&self, raw: &Value) -> InvocationResult {
        let event = AlarmEvent::parse(raw).map_err(RemediationFailure::at(InvocationStage::Parsed))?;
        debug!(alarm_target = ?event.target, stage = %InvocationStage::Parsed, "Alarm parsed");
        if !event.requires_action() {
            return Ok(RemediationOutcome::NoActionNeeded {
                alarm_name: event.alarm_name,
                state: event.new_state,
            });
        }

        let (candidates, group_name) = self
            .candidates(&event.target)
            .await
            .map_err(RemediationFailure::at(InvocationStage::Queried))?;
        let (values, missing) = self
            .query_cpu(&candidates)
            .await
            .map_err(RemediationFailure::at(InvocationStage::Queried))?;
        debug!(candidates = candidates.len(), stage = %InvocationStage::Queried, "CPU metrics queried");

        if !missing.is_empty() {
            self.metrics.add_missing_metric_instances(missing.len() as u64);
            self.logger.log_metrics_missing(&missing, candidates.len());
            if missing.len() == candidates.len() && self.config.require_metric_data {
                return Err(RemediationFailure {
                    stage: InvocationStage::Queried,
                    error: GuardError::NoMetricData {
                        candidates: candidates.len(),
                    },
                });
            }
        }

        let selection =
            select_worst_instance(&values).map_err(RemediationFailure::at(InvocationStage::Queried))?;
        debug!(
            instance_id = %selection.instance_id,
            cpu = selection.cpu_utilization,
            stage = %InvocationStage::Selected,
            "Worst instance selected"
        );

        let mark = HealthMark {
            instance_id: selection.instance_id.clone(),
            health_status: HealthStatus::Unhealthy,
            should_respect_grace_period: self.config.respect_grace_period,
        };
        self.cloud
            .actions
            .set_instance_health(&mark)
            .await
            .map_err(|e| RemediationFailure::at(InvocationStage::ActionIssued)(e.into()))?;
        self.metrics.inc_marked_unhealthy();
        debug!(instance_id = %mark.instance_id, stage = %InvocationStage::ActionIssued, "Health mark issued");

        Ok(RemediationOutcome::Remediated(InstanceHealthDecision {
            instance_id: selection.instance_id,
            group_name,
            cpu_utilization: Some(selection.cpu_utilization),
            metrics_complete: missing.is_empty(),
            candidates: candidates.len(),
            action: RemediationAction::MarkUnhealthy,
            decided_at: Utc::now(),
        }))
    }

    async fn reboot_flow(&self, raw: &Value) -> InvocationResult {
        let event = AlarmEvent::parse(raw).map_err(RemediationFailure::at(InvocationStage::Parsed))?;
        if !event.requires_action() {
            return Ok(RemediationOutcome::NoActionNeeded {
                alarm_name: event.alarm_name,
                state: event.new_state,
            });
        }
        let instance_id = match event.target {
            AlarmTarget::Instance(id) => id,
            AlarmTarget::ScalingGroup(name) => {
                return Err(RemediationFailure {
                    stage: InvocationStage::Parsed,
                    error: GuardError::InvalidEvent(format!(
                        "reboot needs an instance id, got scaling group {name}"
                    )),
                })
            }
        };

        self.cloud
            .actions
            .reboot_instances(std::slice::from_ref(&instance_id))
            .await
            .map_err(|e| RemediationFailure::at(InvocationStage::ActionIssued)(e.into()))?;
        self.metrics.inc_rebooted();

        Ok(RemediationOutcome::Remediated(InstanceHealthDecision {
            instance_id,
            group_name: None,
            cpu_utilization: None,
            metrics_complete: false,
            candidates: 1,
            action: RemediationAction::Reboot,
            decided_at: Utc::now(),
        }))
    }

    /// Candidate ids and the group they came from
    async fn candidates(
        &self,
        target: &AlarmTarget,
    ) -> Result<(Vec<String>, Option<String>), GuardError> {
        match target {
            AlarmTarget::Instance(id) => Ok((vec![id.clone()], None)),
            AlarmTarget::ScalingGroup(name) => {
                let members = self.cloud.groups.describe_group(name).await?;
                let total = members.len();
                let in_service: Vec<String> = members
                    .into_iter()
                    .filter(|m| m.is_in_service())
                    .map(|m| m.instance_id)
                    .collect();
                debug!(group = %name, total, in_service = in_service.len(), "Listed group members");
                if in_service.is_empty() {
                    return Err(GuardError::NoCandidates);
                }
                Ok((in_service, Some(name.clone())))
            }
        }
    }

    /// CPU value per candidate, in candidate order, plus ids with no datapoints
    async fn query_cpu(
        &self,
        candidates: &[String],
    ) -> Result<(Vec<(String, f64)>, Vec<String>), GuardError> {
        let end = Utc::now();
        let window = self.config.metric_window()?;
        let mut values = Vec::with_capacity(candidates.len());
        let mut missing = Vec::new();

        for id in candidates {
            let query = MetricQuery::cpu_utilization(
                id,
                end,
                window,
                self.config.metric_period_secs,
                self.config.statistic,
            )
            .ok_or_else(|| {
                GuardError::InvalidConfig(format!(
                    "metric window of {}s reaches before the earliest representable time",
                    self.config.metric_window_secs
                ))
            })?;
            let datapoints = self.cloud.metrics.get_metric_statistics(&query).await?;
            let readings: Vec<f64> = datapoints.iter().map(|d| d.value).collect();
            if !readings.iter().any(|v| v.is_finite()) {
                missing.push(id.clone());
            }
            values.push((id.clone(), summarize_datapoints(&readings)));
        }
        Ok((values, missing))
    }
}
