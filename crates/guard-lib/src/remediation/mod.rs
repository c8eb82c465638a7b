//! Alarm-driven remediation of unhealthy instances
//!
//! An alarm event names an instance or a scaling group. For a group, every
//! in-service member's recent CPU is queried and the busiest one is marked
//! unhealthy so the group replaces it. The reboot flow restarts the named
//! instance directly.

pub mod backend;
mod event;
mod fixture;
mod handler;
mod selector;

#[cfg(test)]
mod tests;

pub use backend::{
    BackendError, CloudContext, Datapoint, FleetActions, GroupMember, HealthMark, HealthStatus,
    MetricQuery, MetricSource, ScalingGroupDirectory, Statistic, IN_SERVICE,
};
pub use event::{AlarmEvent, AlarmTarget};
pub use fixture::{CloudSnapshot, FailureSwitches, FixtureCloud, FixtureDatapoint, RecordedAction};
pub use handler::{
    HandlerResponse, InvocationResult, InvocationStage, RemediationConfig, RemediationFailure,
    RemediationHandler, RemediationOutcome,
};
pub use selector::{select_worst_instance, summarize_datapoints, Selection};
