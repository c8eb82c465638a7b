//! Operations guard library
//!
//! This crate provides the core functionality for:
//! - Metrics preprocessing and feature selection
//! - Anomaly detection, predictive maintenance and log clustering
//! - Model artifact storage and online inference
//! - Alarm-driven instance remediation
//! - Health checks and observability

pub mod anomaly;
pub mod artifacts;
pub mod error;
pub mod health;
pub mod inference;
pub mod logs;
pub mod maintenance;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod preprocess;
pub mod remediation;

pub use artifacts::{ModelKind, ModelStore};
pub use error::{GuardError, Result};
pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse,
    ReadinessResponse,
};
pub use inference::{InferenceRequest, InferenceResponse, InferenceService};
pub use models::*;
pub use observability::{GuardMetrics, StructuredLogger};
