//! Cloud collaborators used by the remediation handler
//!
//! The handler only talks to these traits, so a vendor SDK client, a test
//! double and the JSON-backed [`FixtureCloud`](super::FixtureCloud) are
//! interchangeable.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a group member that may receive health actions
pub const IN_SERVICE: &str = "InService";

pub const CPU_NAMESPACE: &str = "AWS/EC2";
pub const CPU_METRIC: &str = "CPUUtilization";
pub const INSTANCE_DIMENSION: &str = "InstanceId";

/// Failures reported by a backend call
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("scaling group not found: {0}")]
    GroupNotFound(String),

    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Aggregation applied to raw samples within each period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statistic {
    Average,
    Maximum,
    Minimum,
}

/// Time-windowed metric statistics request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricQuery {
    pub namespace: String,
    pub metric_name: String,
    /// Dimension name and value, e.g. `("InstanceId", "i-123")`
    pub dimension: (String, String),
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub period_secs: u32,
    pub statistic: Statistic,
}

impl MetricQuery {
    /// Per-instance CPU utilization query over `[end - window, end]`
    ///
    /// `None` when `end - window` falls outside the representable date range.
    pub fn cpu_utilization(
        instance_id: &str,
        end: DateTime<Utc>,
        window: chrono::Duration,
        period_secs: u32,
        statistic: Statistic,
    ) -> Option<Self> {
        Some(Self {
            namespace: CPU_NAMESPACE.to_string(),
            metric_name: CPU_METRIC.to_string(),
            dimension: (INSTANCE_DIMENSION.to_string(), instance_id.to_string()),
            start: end.checked_sub_signed(window)?,
            end,
            period_secs,
            statistic,
        })
    }

    pub fn instance_id(&self) -> Option<&str> {
        (self.dimension.0 == INSTANCE_DIMENSION).then_some(self.dimension.1.as_str())
    }
}

/// One aggregated value for one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub instance_id: String,
    pub lifecycle_state: String,
}

impl GroupMember {
    pub fn is_in_service(&self) -> bool {
        self.lifecycle_state == IN_SERVICE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Health transition request for one group member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthMark {
    pub instance_id: String,
    pub health_status: HealthStatus,
    /// `false` applies the mark immediately, ignoring the group's grace period
    pub should_respect_grace_period: bool,
}

/// Source of per-instance metric statistics
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn get_metric_statistics(
        &self,
        query: &MetricQuery,
    ) -> Result<Vec<Datapoint>, BackendError>;
}

/// Scaling group membership lookups
#[async_trait]
pub trait ScalingGroupDirectory: Send + Sync {
    async fn describe_group(&self, name: &str) -> Result<Vec<GroupMember>, BackendError>;
}

/// Fire-and-forget instance actions
#[async_trait]
pub trait FleetActions: Send + Sync {
    async fn set_instance_health(&self, mark: &HealthMark) -> Result<(), BackendError>;

    async fn reboot_instances(&self, instance_ids: &[String]) -> Result<(), BackendError>;
}

/// Long-lived clients shared by every invocation
#[derive(Clone)]
pub struct CloudContext {
    pub metrics: Arc<dyn MetricSource>,
    pub groups: Arc<dyn ScalingGroupDirectory>,
    pub actions: Arc<dyn FleetActions>,
}

impl CloudContext {
    pub fn new(
        metrics: Arc<dyn MetricSource>,
        groups: Arc<dyn ScalingGroupDirectory>,
        actions: Arc<dyn FleetActions>,
    ) -> Self {
        Self {
            metrics,
            groups,
            actions,
        }
    }

    /// Use one object for all three collaborators
    pub fn from_shared<T>(cloud: Arc<T>) -> Self
    where
        T: MetricSource + ScalingGroupDirectory + FleetActions + 'static,
    {
        Self {
            metrics: cloud.clone(),
            groups: cloud.clone(),
            actions: cloud,
        }
    }
}

impl std::fmt::Debug for CloudContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudContext").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_query_window() {
        let end = Utc::now();
        let query = MetricQuery::cpu_utilization(
            "i-abc",
            end,
            chrono::Duration::seconds(600),
            60,
            Statistic::Average,
        )
        .unwrap();

        assert_eq!(query.namespace, "AWS/EC2");
        assert_eq!(query.metric_name, "CPUUtilization");
        assert_eq!(query.instance_id(), Some("i-abc"));
        assert_eq!((query.end - query.start).num_seconds(), 600);
        assert_eq!(query.period_secs, 60);
    }

    #[test]
    fn test_cpu_query_window_out_of_range() {
        let query = MetricQuery::cpu_utilization(
            "i-abc",
            Utc::now(),
            chrono::TimeDelta::MAX,
            60,
            Statistic::Average,
        );
        assert!(query.is_none());
    }

    #[test]
    fn test_in_service_filter() {
        let member = GroupMember {
            instance_id: "i-1".into(),
            lifecycle_state: "Pending".into(),
        };
        assert!(!member.is_in_service());
    }
}
