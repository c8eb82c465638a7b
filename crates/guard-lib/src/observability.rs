//! Observability infrastructure for opsguard
//!
//! Provides:
//! - Prometheus metrics (remediation outcomes and latency, inference traffic, loaded models)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for remediation latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<GuardMetricsInner> = OnceLock::new();

struct GuardMetricsInner {
    remediation_invocations: IntCounterVec,
    remediation_latency_seconds: Histogram,
    instances_marked_unhealthy: IntCounter,
    instances_rebooted: IntCounter,
    missing_metric_instances: IntCounter,
    anomalies_flagged: IntCounter,
    inference_requests: IntCounterVec,
    models_loaded: IntGauge,
}

impl GuardMetricsInner {
    fn new() -> Self {
        Self {
            remediation_invocations: register_int_counter_vec!(
                "opsguard_remediation_invocations_total",
                "Remediation handler invocations by flow and outcome",
                &["flow", "outcome"]
            )
            .expect("Failed to register remediation_invocations"),

            remediation_latency_seconds: register_histogram!(
                "opsguard_remediation_latency_seconds",
                "Time from event receipt to action issued or failure",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register remediation_latency_seconds"),

            instances_marked_unhealthy: register_int_counter!(
                "opsguard_instances_marked_unhealthy_total",
                "Instances marked unhealthy in their scaling group"
            )
            .expect("Failed to register instances_marked_unhealthy"),

            instances_rebooted: register_int_counter!(
                "opsguard_instances_rebooted_total",
                "Instances rebooted"
            )
            .expect("Failed to register instances_rebooted"),

            missing_metric_instances: register_int_counter!(
                "opsguard_missing_metric_instances_total",
                "Candidate instances that returned no CPU datapoints"
            )
            .expect("Failed to register missing_metric_instances"),

            anomalies_flagged: register_int_counter!(
                "opsguard_anomalies_flagged_total",
                "Rows flagged by the combined anomaly decision"
            )
            .expect("Failed to register anomalies_flagged"),

            inference_requests: register_int_counter_vec!(
                "opsguard_inference_requests_total",
                "Inference requests by request type",
                &["type"]
            )
            .expect("Failed to register inference_requests"),

            models_loaded: register_int_gauge!(
                "opsguard_models_loaded",
                "Number of model artifacts currently loaded"
            )
            .expect("Failed to register models_loaded"),
        }
    }
}

/// Metrics handle for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Debug, Clone)]
pub struct GuardMetrics {
    _private: (),
}

impl Default for GuardMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GuardMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(GuardMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &GuardMetricsInner {
        GLOBAL_METRICS.get_or_init(GuardMetricsInner::new)
    }

    pub fn record_invocation(&self, flow: &str, outcome: &str, duration_secs: f64) {
        let inner = self.inner();
        inner
            .remediation_invocations
            .with_label_values(&[flow, outcome])
            .inc();
        inner.remediation_latency_seconds.observe(duration_secs);
    }

    pub fn invocation_count(&self, flow: &str, outcome: &str) -> u64 {
        self.inner()
            .remediation_invocations
            .with_label_values(&[flow, outcome])
            .get()
    }

    pub fn inc_marked_unhealthy(&self) {
        self.inner().instances_marked_unhealthy.inc();
    }

    pub fn inc_rebooted(&self) {
        self.inner().instances_rebooted.inc();
    }

    pub fn add_missing_metric_instances(&self, count: u64) {
        self.inner().missing_metric_instances.inc_by(count);
    }

    pub fn add_anomalies_flagged(&self, count: u64) {
        self.inner().anomalies_flagged.inc_by(count);
    }

    pub fn inc_inference_request(&self, request_type: &str) {
        self.inner()
            .inference_requests
            .with_label_values(&[request_type])
            .inc();
    }

    pub fn set_models_loaded(&self, count: i64) {
        self.inner().models_loaded.set(count);
    }
}

/// Structured logger for opsguard events
///
/// Emits named `event` fields so JSON log pipelines can filter on them.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_startup(&self, version: &str, models_loaded: usize) {
        info!(
            event = "agent_started",
            service = %self.service,
            agent_version = %version,
            models_loaded = models_loaded,
            "Remediation agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            service = %self.service,
            reason = %reason,
            "Remediation agent shutting down"
        );
    }

    pub fn log_remediation(
        &self,
        flow: &str,
        instance_id: &str,
        action: &str,
        cpu_utilization: f64,
        candidates: usize,
    ) {
        info!(
            event = "remediation_completed",
            service = %self.service,
            flow = %flow,
            instance_id = %instance_id,
            action = %action,
            cpu_utilization = cpu_utilization,
            candidates = candidates,
            "Remediation action issued"
        );
    }

    pub fn log_remediation_failure(&self, flow: &str, stage: &str, error: &str) {
        warn!(
            event = "remediation_failed",
            service = %self.service,
            flow = %flow,
            stage = %stage,
            error = %error,
            "Remediation failed"
        );
    }

    /// Candidates without datapoints were treated as 0% CPU
    pub fn log_metrics_missing(&self, instance_ids: &[String], candidates: usize) {
        warn!(
            event = "metrics_missing",
            service = %self.service,
            instances = ?instance_ids,
            missing = instance_ids.len(),
            candidates = candidates,
            "No CPU datapoints for some candidates, treating them as 0%"
        );
    }

    pub fn log_anomalies(&self, rows: usize, model_flags: usize, rule_flags: usize, combined: usize) {
        if combined > 0 {
            warn!(
                event = "anomalies_detected",
                service = %self.service,
                rows = rows,
                model_flags = model_flags,
                rule_flags = rule_flags,
                combined = combined,
                "Anomalies detected (combined method)"
            );
        } else {
            info!(
                event = "anomalies_detected",
                service = %self.service,
                rows = rows,
                combined = 0,
                "No anomalies detected"
            );
        }
    }

    pub fn log_model_saved(&self, model: &str, path: &str) {
        info!(
            event = "model_saved",
            service = %self.service,
            model = %model,
            path = %path,
            "Model artifact saved"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_metrics_creation() {
        let metrics = GuardMetrics::new();

        metrics.record_invocation("alarm", "remediated", 0.01);
        metrics.inc_marked_unhealthy();
        metrics.inc_rebooted();
        metrics.add_missing_metric_instances(2);
        metrics.add_anomalies_flagged(3);
        metrics.inc_inference_request("anomaly_detection");
        metrics.set_models_loaded(3);

        assert!(metrics.invocation_count("alarm", "remediated") >= 1);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("opsguard-test");
        assert_eq!(logger.service, "opsguard-test");
    }
}
