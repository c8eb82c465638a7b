//! HTTP API for remediation events, inference, health checks and Prometheus metrics

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use guard_lib::{
    health::{Component, ComponentStatus, HealthRegistry},
    inference::InferenceService,
    observability::GuardMetrics,
    remediation::{HandlerResponse, InvocationResult, RemediationHandler},
};
use prometheus::{Encoder, TextEncoder};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: GuardMetrics,
    pub remediation: RemediationHandler,
    pub inference: Arc<InferenceService>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: GuardMetrics,
        remediation: RemediationHandler,
        inference: InferenceService,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            remediation,
            inference: Arc::new(inference),
        }
    }

    /// Backend failures degrade remediation until the next success
    async fn track_remediation(&self, result: &InvocationResult) {
        match result {
            Ok(_) => self.health_registry.set_healthy(Component::Remediation).await,
            Err(failure) if failure.outcome_label() == "backend_failure" => {
                self.health_registry
                    .set_degraded(Component::Remediation, failure.to_string())
                    .await
            }
            Err(_) => {}
        }
    }
}

/// Status code from the envelope, with the envelope as JSON body
fn reply(response: HandlerResponse) -> impl IntoResponse {
    let status = StatusCode::from_u16(response.status_code)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response))
}

/// Health check response - returns 200 if healthy, 503 if degraded/unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            e.to_string().into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Alarm event: mark the worst in-service instance unhealthy
async fn alarms(State(state): State<Arc<AppState>>, Json(event): Json<Value>) -> impl IntoResponse {
    let result = state.remediation.handle_alarm(&event).await;
    state.track_remediation(&result).await;
    reply(HandlerResponse::from(&result))
}

/// Reboot event: reboot the named instance
async fn reboot(State(state): State<Arc<AppState>>, Json(event): Json<Value>) -> impl IntoResponse {
    let result = state.remediation.handle_reboot(&event).await;
    state.track_remediation(&result).await;
    reply(HandlerResponse::from(&result))
}

async fn inference(
    State(state): State<Arc<AppState>>,
    Json(request): Json<Value>,
) -> impl IntoResponse {
    let result = state.inference.handle(&request);
    reply(HandlerResponse::from(&result))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/v1/alarms", post(alarms))
        .route("/v1/reboot", post(reboot))
        .route("/v1/inference", post(inference))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
