//! In-memory cloud backed by a JSON snapshot
//!
//! Used by the agent when no real backend is wired in, by `opsguard
//! remediate` for dry runs, and by tests. Every action is recorded instead
//! of being sent anywhere.
//!
//! ```json
//! {
//!   "groups": {"web-asg": [{"instance_id": "i-1", "lifecycle_state": "InService"}]},
//!   "cpu": {"i-1": [{"age_secs": 120, "value": 87.5}]},
//!   "fail": {"metrics": false, "groups": false, "actions": false}
//! }
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::backend::{
    BackendError, Datapoint, FleetActions, GroupMember, HealthMark, MetricQuery, MetricSource,
    ScalingGroupDirectory,
};
use crate::error::{GuardError, Result};

/// Datapoint positioned relative to the end of the query window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureDatapoint {
    pub age_secs: i64,
    pub value: f64,
}

impl FixtureDatapoint {
    /// Timestamp `age_secs` before `end`, if representable
    fn timestamp(&self, end: DateTime<Utc>) -> Option<DateTime<Utc>> {
        end.checked_sub_signed(chrono::Duration::try_seconds(self.age_secs)?)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailureSwitches {
    #[serde(default)]
    pub metrics: bool,
    #[serde(default)]
    pub groups: bool,
    #[serde(default)]
    pub actions: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudSnapshot {
    #[serde(default)]
    pub groups: HashMap<String, Vec<GroupMember>>,
    #[serde(default)]
    pub cpu: HashMap<String, Vec<FixtureDatapoint>>,
    /// Standalone instances that belong to no group
    #[serde(default)]
    pub instances: Vec<String>,
    #[serde(default)]
    pub fail: FailureSwitches,
}

impl CloudSnapshot {
    /// Reject datapoints whose age cannot be placed on the clock
    pub fn validate(&self) -> Result<()> {
        let now = Utc::now();
        for (instance_id, points) in &self.cpu {
            if let Some(bad) = points.iter().find(|p| p.timestamp(now).is_none()) {
                return Err(GuardError::InvalidConfig(format!(
                    "snapshot datapoint for {} has out-of-range age_secs {}",
                    instance_id, bad.age_secs
                )));
            }
        }
        Ok(())
    }
}

/// Action captured by the fixture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecordedAction {
    SetInstanceHealth(HealthMark),
    RebootInstances { instance_ids: Vec<String> },
}

pub struct FixtureCloud {
    snapshot: CloudSnapshot,
    fail_metrics: AtomicBool,
    fail_groups: AtomicBool,
    fail_actions: AtomicBool,
    actions: Mutex<Vec<RecordedAction>>,
    queries: Mutex<Vec<MetricQuery>>,
}

impl FixtureCloud {
    pub fn new(snapshot: CloudSnapshot) -> Self {
        Self {
            fail_metrics: AtomicBool::new(snapshot.fail.metrics),
            fail_groups: AtomicBool::new(snapshot.fail.groups),
            fail_actions: AtomicBool::new(snapshot.fail.actions),
            snapshot,
            actions: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: CloudSnapshot = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(Self::new(snapshot))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let cloud = Self::from_json(&content)?;
        info!(
            path = %path.display(),
            groups = cloud.snapshot.groups.len(),
            instances = cloud.known_instances().len(),
            "Loaded cloud snapshot"
        );
        Ok(cloud)
    }

    pub fn fail_metrics(&self, fail: bool) {
        self.fail_metrics.store(fail, Ordering::SeqCst);
    }

    pub fn fail_groups(&self, fail: bool) {
        self.fail_groups.store(fail, Ordering::SeqCst);
    }

    pub fn fail_actions(&self, fail: bool) {
        self.fail_actions.store(fail, Ordering::SeqCst);
    }

    /// Actions issued so far, oldest first
    pub fn recorded_actions(&self) -> Vec<RecordedAction> {
        self.actions
            .lock()
            .map(|a| a.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Metric queries received so far, oldest first
    pub fn recorded_queries(&self) -> Vec<MetricQuery> {
        self.queries
            .lock()
            .map(|q| q.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn known_instances(&self) -> BTreeSet<&str> {
        self.snapshot
            .groups
            .values()
            .flatten()
            .map(|m| m.instance_id.as_str())
            .chain(self.snapshot.cpu.keys().map(String::as_str))
            .chain(self.snapshot.instances.iter().map(String::as_str))
            .collect()
    }

    fn check_known(&self, instance_id: &str) -> std::result::Result<(), BackendError> {
        if self.known_instances().contains(instance_id) {
            Ok(())
        } else {
            Err(BackendError::InstanceNotFound(instance_id.to_string()))
        }
    }

    fn record(&self, action: RecordedAction) {
        match self.actions.lock() {
            Ok(mut actions) => actions.push(action),
            Err(poisoned) => poisoned.into_inner().push(action),
        }
    }
}

#[async_trait]
impl MetricSource for FixtureCloud {
    async fn get_metric_statistics(
        &self,
        query: &MetricQuery,
    ) -> std::result::Result<Vec<Datapoint>, BackendError> {
        match self.queries.lock() {
            Ok(mut queries) => queries.push(query.clone()),
            Err(poisoned) => poisoned.into_inner().push(query.clone()),
        }
        if self.fail_metrics.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("metrics endpoint".to_string()));
        }

        let Some(instance_id) = query.instance_id() else {
            return Ok(Vec::new());
        };
        let Some(points) = self.snapshot.cpu.get(instance_id) else {
            return Ok(Vec::new());
        };
        let mut datapoints = Vec::with_capacity(points.len());
        for point in points {
            let timestamp = point.timestamp(query.end).ok_or_else(|| {
                BackendError::Rejected(format!(
                    "datapoint for {} has out-of-range age_secs {}",
                    instance_id, point.age_secs
                ))
            })?;
            if in_window(timestamp, query.start, query.end) {
                datapoints.push(Datapoint {
                    timestamp,
                    value: point.value,
                });
            }
        }
        Ok(datapoints)
    }
}

fn in_window(at: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    at >= start && at <= end
}

#[async_trait]
impl ScalingGroupDirectory for FixtureCloud {
    async fn describe_group(&self, name: &str) -> std::result::Result<Vec<GroupMember>, BackendError> {
        if self.fail_groups.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("autoscaling endpoint".to_string()));
        }
        self.snapshot
            .groups
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::GroupNotFound(name.to_string()))
    }
}

#[async_trait]
impl FleetActions for FixtureCloud {
    async fn set_instance_health(&self, mark: &HealthMark) -> std::result::Result<(), BackendError> {
        if self.fail_actions.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("autoscaling endpoint".to_string()));
        }
        self.check_known(&mark.instance_id)?;
        debug!(instance_id = %mark.instance_id, status = ?mark.health_status, "Recorded health mark");
        self.record(RecordedAction::SetInstanceHealth(mark.clone()));
        Ok(())
    }

    async fn reboot_instances(&self, instance_ids: &[String]) -> std::result::Result<(), BackendError> {
        if self.fail_actions.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("compute endpoint".to_string()));
        }
        for id in instance_ids {
            self.check_known(id)?;
        }
        debug!(instances = ?instance_ids, "Recorded reboot");
        self.record(RecordedAction::RebootInstances {
            instance_ids: instance_ids.to_vec(),
        });
        Ok(())
    }
}
