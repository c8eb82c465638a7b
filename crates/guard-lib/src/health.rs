//! Component health tracking for the remediation agent
//!
//! Backs the `/healthz` and `/readyz` probes. Backend failures degrade the
//! remediation component, missing model artifacts degrade inference.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Still serving, with reduced capability
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentStatus::Healthy => "healthy",
            ComponentStatus::Degraded => "degraded",
            ComponentStatus::Unhealthy => "unhealthy",
        }
    }

    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

/// Tracked parts of the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Remediation,
    Inference,
    ModelStore,
}

impl Component {
    pub const ALL: [Component; 3] = [
        Component::Remediation,
        Component::Inference,
        Component::ModelStore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Remediation => "remediation",
            Component::Inference => "inference",
            Component::ModelStore => "model_store",
        }
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across components; empty means healthy
    pub fn compute_status<'a>(
        components: impl IntoIterator<Item = &'a ComponentHealth>,
    ) -> ComponentStatus {
        components
            .into_iter()
            .map(|h| h.status)
            .fold(ComponentStatus::Healthy, |worst, status| match (worst, status) {
                (ComponentStatus::Unhealthy, _) | (_, ComponentStatus::Unhealthy) => {
                    ComponentStatus::Unhealthy
                }
                (ComponentStatus::Degraded, _) | (_, ComponentStatus::Degraded) => {
                    ComponentStatus::Degraded
                }
                _ => ComponentStatus::Healthy,
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<BTreeMap<Component, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every component registered as healthy
    pub async fn with_all_components() -> Self {
        let registry = Self::new();
        for component in Component::ALL {
            registry.register(component).await;
        }
        registry
    }

    pub async fn register(&self, component: Component) {
        self.update(component, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, component: Component, health: ComponentHealth) {
        self.components.write().await.insert(component, health);
    }

    pub async fn set_healthy(&self, component: Component) {
        self.update(component, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, component: Component, message: impl Into<String>) {
        self.update(component, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, component: Component, message: impl Into<String>) {
        self.update(component, ComponentHealth::unhealthy(message)).await;
    }

    pub async fn status_of(&self, component: Component) -> Option<ComponentStatus> {
        self.components.read().await.get(&component).map(|h| h.status)
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await;
        HealthResponse {
            status: HealthResponse::compute_status(components.values()),
            components: components
                .iter()
                .map(|(c, h)| (c.as_str().to_string(), h.clone()))
                .collect(),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = *self.ready.read().await;
        let health = self.health().await;

        let reason = if !ready {
            Some("Agent not yet initialized".to_string())
        } else if health.status == ComponentStatus::Unhealthy {
            let failing: Vec<&str> = health
                .components
                .iter()
                .filter(|(_, h)| h.status == ComponentStatus::Unhealthy)
                .map(|(name, _)| name.as_str())
                .collect();
            Some(format!("Unhealthy components: {}", failing.join(", ")))
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}
