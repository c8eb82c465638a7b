//! Remediation agent - alarm-driven instance remediation and model inference
//!
//! Loads trained artifacts and cloud clients once at startup, then serves
//! events over HTTP until interrupted.

use anyhow::{Context, Result};
use guard_lib::{
    health::{Component, HealthRegistry},
    inference::InferenceService,
    observability::{GuardMetrics, StructuredLogger},
    remediation::{CloudContext, CloudSnapshot, FixtureCloud, RemediationHandler},
    ModelStore,
};
use remediation_agent::{api, config::AgentConfig};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting remediation-agent");

    let config = AgentConfig::load().context("invalid GUARD_* configuration")?;
    info!(service = %config.service_name, port = config.api_port, "Agent configured");

    let health_registry = HealthRegistry::with_all_components().await;
    let metrics = GuardMetrics::new();
    let logger = StructuredLogger::new(&config.service_name);

    let store = ModelStore::new(&config.models_dir);
    let inference = match InferenceService::load(&store) {
        Ok(service) => service,
        Err(e) => {
            warn!(error = %e, "Model store unreadable, serving without models");
            health_registry
                .set_unhealthy(Component::ModelStore, e.to_string())
                .await;
            InferenceService::new()
        }
    };
    let missing = inference.missing_models();
    if !missing.is_empty() {
        let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
        health_registry
            .set_degraded(
                Component::Inference,
                format!("Models not loaded: {}", names.join(", ")),
            )
            .await;
    }
    let loaded = inference.loaded_models().len();
    metrics.set_models_loaded(loaded as i64);

    let cloud = match &config.cloud_snapshot {
        Some(path) => FixtureCloud::from_path(path)
            .with_context(|| format!("failed to load cloud snapshot {}", path.display()))?,
        None => {
            warn!("No cloud snapshot configured, every group lookup will fail");
            FixtureCloud::new(CloudSnapshot::default())
        }
    };
    let remediation = RemediationHandler::new(
        CloudContext::from_shared(Arc::new(cloud)),
        config.remediation(),
    )
    .with_logger(logger.clone());

    logger.log_startup(AGENT_VERSION, loaded);

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics,
        remediation,
        inference,
    ));

    // Mark agent as ready after initialization
    health_registry.set_ready(true).await;

    let server = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = server => {
            result.context("API server task panicked")??;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }
    info!("Shutting down");

    Ok(())
}
