//! Alarm event parsing
//!
//! Accepted shapes, first match wins:
//! 1. `{"detail": {"instance-id": "i-..."}}`
//! 2. `{"instance_id": "i-..."}` or `{"InstanceId": "i-..."}`
//! 3. An SNS envelope whose `Records[0].Sns.Message` is alarm JSON text
//! 4. A bare alarm message
//!
//! Alarm messages name their target through `Trigger.Dimensions` or a
//! top-level `AutoScalingGroupName`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GuardError, Result};

pub const GROUP_DIMENSION: &str = "AutoScalingGroupName";
pub const INSTANCE_DIMENSION: &str = "InstanceId";

/// Alarm states that do not call for remediation
const QUIET_STATES: &[&str] = &["OK", "INSUFFICIENT_DATA"];

/// What an alarm points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AlarmTarget {
    Instance(String),
    ScalingGroup(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmEvent {
    pub target: AlarmTarget,
    pub alarm_name: Option<String>,
    pub new_state: Option<String>,
}

impl AlarmEvent {
    pub fn parse(raw: &Value) -> Result<Self> {
        if let Some(id) = raw
            .get("detail")
            .and_then(|d| d.get("instance-id"))
            .and_then(Value::as_str)
        {
            return Ok(Self::for_instance(non_empty(id, "detail.instance-id")?));
        }

        for key in ["instance_id", INSTANCE_DIMENSION] {
            if let Some(id) = raw.get(key).and_then(Value::as_str) {
                return Ok(Self::for_instance(non_empty(id, key)?));
            }
        }

        if let Some(records) = raw.get("Records") {
            let message = records
                .get(0)
                .and_then(|r| r.get("Sns"))
                .and_then(|s| s.get("Message"))
                .ok_or_else(|| {
                    GuardError::InvalidEvent("Records[0].Sns.Message is missing".to_string())
                })?;
            let message = match message {
                Value::String(text) => serde_json::from_str::<Value>(text).map_err(|e| {
                    GuardError::InvalidEvent(format!("SNS message is not valid JSON: {e}"))
                })?,
                other => other.clone(),
            };
            return Self::from_alarm_message(&message);
        }

        if raw.get("Trigger").is_some() || raw.get(GROUP_DIMENSION).is_some() {
            return Self::from_alarm_message(raw);
        }

        Err(GuardError::InvalidEvent(
            "event has no instance id, SNS envelope or alarm trigger".to_string(),
        ))
    }

    fn for_instance(id: String) -> Self {
        Self {
            target: AlarmTarget::Instance(id),
            alarm_name: None,
            new_state: None,
        }
    }

    fn from_alarm_message(message: &Value) -> Result<Self> {
        let alarm_name = string_field(message, "AlarmName");
        let new_state = string_field(message, "NewStateValue");

        let dimensions = message
            .get("Trigger")
            .and_then(|t| t.get("Dimensions"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let dimension = |wanted: &str| {
            dimensions.iter().find_map(|d| {
                let name = d.get("name").or_else(|| d.get("Name"))?.as_str()?;
                let value = d.get("value").or_else(|| d.get("Value"))?.as_str()?;
                (name == wanted).then(|| value.to_string())
            })
        };

        let target = if let Some(group) = dimension(GROUP_DIMENSION) {
            AlarmTarget::ScalingGroup(non_empty(&group, GROUP_DIMENSION)?)
        } else if let Some(instance) = dimension(INSTANCE_DIMENSION) {
            AlarmTarget::Instance(non_empty(&instance, INSTANCE_DIMENSION)?)
        } else if let Some(group) = string_field(message, GROUP_DIMENSION) {
            AlarmTarget::ScalingGroup(non_empty(&group, GROUP_DIMENSION)?)
        } else {
            return Err(GuardError::InvalidEvent(format!(
                "alarm message has no {GROUP_DIMENSION} or {INSTANCE_DIMENSION} dimension"
            )));
        };

        Ok(Self {
            target,
            alarm_name,
            new_state,
        })
    }

    /// False for alarms transitioning to `OK` or `INSUFFICIENT_DATA`
    pub fn requires_action(&self) -> bool {
        match &self.new_state {
            Some(state) => !QUIET_STATES.contains(&state.as_str()),
            None => true,
        }
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn non_empty(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(GuardError::InvalidEvent(format!("{field} is empty")));
    }
    Ok(trimmed.to_string())
}
