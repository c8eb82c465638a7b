//! Online inference over trained artifacts
//!
//! Requests are JSON objects discriminated by `type`:
//! - `anomaly_detection` with `data: [[f64]]` answers `{"predictions": [1 | -1]}`
//! - `predictive_maintenance` with `features: [f64]` answers `{"maintenance_prediction": [f64]}`
//! - `log_clustering` with `logs: [String]` answers `{"log_clusters": [usize]}`
//!
//! Any other `type` answers `{"error": "Invalid event type"}`.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::anomaly::OutlierModel;
use crate::artifacts::{AnomalyArtifact, ModelKind, ModelStore};
use crate::error::{GuardError, Result};
use crate::logs::LogClusterer;
use crate::maintenance::MaintenanceModel;
use crate::observability::GuardMetrics;
use crate::remediation::HandlerResponse;

pub const INVALID_EVENT_TYPE: &str = "Invalid event type";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InferenceRequest {
    AnomalyDetection {
        #[serde(default)]
        data: Vec<Vec<f64>>,
    },
    PredictiveMaintenance {
        #[serde(default)]
        features: Vec<f64>,
    },
    LogClustering {
        #[serde(default)]
        logs: Vec<String>,
    },
}

impl InferenceRequest {
    const TYPES: [&'static str; 3] = [
        "anomaly_detection",
        "predictive_maintenance",
        "log_clustering",
    ];

    pub fn type_name(&self) -> &'static str {
        match self {
            InferenceRequest::AnomalyDetection { .. } => Self::TYPES[0],
            InferenceRequest::PredictiveMaintenance { .. } => Self::TYPES[1],
            InferenceRequest::LogClustering { .. } => Self::TYPES[2],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InferenceResponse {
    Anomalies { predictions: Vec<i8> },
    Maintenance { maintenance_prediction: Vec<f64> },
    LogClusters { log_clusters: Vec<usize> },
    Error { error: String },
}

/// Loaded artifacts, any of which may be absent
#[derive(Debug, Default)]
pub struct InferenceService {
    anomaly: Option<AnomalyArtifact>,
    maintenance: Option<MaintenanceModel>,
    clustering: Option<LogClusterer>,
}

impl InferenceService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load whatever artifacts exist in `store`; corrupt ones are errors
    pub fn load(store: &ModelStore) -> Result<Self> {
        let service = Self {
            anomaly: store.load_optional(ModelKind::Anomaly)?,
            maintenance: store.load_optional(ModelKind::Maintenance)?,
            clustering: store.load_optional(ModelKind::LogClustering)?,
        };
        info!(
            models_dir = %store.root().display(),
            loaded = ?service.loaded_models(),
            missing = ?service.missing_models(),
            "Inference models loaded"
        );
        Ok(service)
    }

    pub fn with_anomaly(mut self, model: AnomalyArtifact) -> Self {
        self.anomaly = Some(model);
        self
    }

    pub fn with_maintenance(mut self, model: MaintenanceModel) -> Self {
        self.maintenance = Some(model);
        self
    }

    pub fn with_clustering(mut self, model: LogClusterer) -> Self {
        self.clustering = Some(model);
        self
    }

    pub fn loaded_models(&self) -> Vec<ModelKind> {
        ModelKind::ALL
            .into_iter()
            .filter(|kind| self.is_loaded(*kind))
            .collect()
    }

    pub fn missing_models(&self) -> Vec<ModelKind> {
        ModelKind::ALL
            .into_iter()
            .filter(|kind| !self.is_loaded(*kind))
            .collect()
    }

    fn is_loaded(&self, kind: ModelKind) -> bool {
        match kind {
            ModelKind::Anomaly => self.anomaly.is_some(),
            ModelKind::Maintenance => self.maintenance.is_some(),
            ModelKind::LogClustering => self.clustering.is_some(),
        }
    }

    /// Dispatch a raw JSON request
    pub fn handle(&self, raw: &Value) -> Result<InferenceResponse> {
        let known = raw
            .get("type")
            .and_then(Value::as_str)
            .map(|t| InferenceRequest::TYPES.contains(&t))
            .unwrap_or(false);
        if !known {
            debug!(request_type = ?raw.get("type"), "Rejected inference request");
            return Ok(InferenceResponse::Error {
                error: INVALID_EVENT_TYPE.to_string(),
            });
        }
        let request: InferenceRequest = serde_json::from_value(raw.clone())
            .map_err(|e| GuardError::InvalidEvent(format!("malformed inference request: {e}")))?;
        self.infer(&request)
    }

    pub fn infer(&self, request: &InferenceRequest) -> Result<InferenceResponse> {
        GuardMetrics::new().inc_inference_request(request.type_name());
        match request {
            InferenceRequest::AnomalyDetection { data } => {
                let model = self.anomaly.as_ref().ok_or_else(|| not_loaded(ModelKind::Anomaly))?;
                let matrix = rows_to_matrix(data, model.forest.n_features())?;
                Ok(InferenceResponse::Anomalies {
                    predictions: model.forest.predict(matrix.view())?,
                })
            }
            InferenceRequest::PredictiveMaintenance { features } => {
                let model = self
                    .maintenance
                    .as_ref()
                    .ok_or_else(|| not_loaded(ModelKind::Maintenance))?;
                let matrix = rows_to_matrix(std::slice::from_ref(features), model.n_inputs())?;
                Ok(InferenceResponse::Maintenance {
                    maintenance_prediction: model.predict_raw(matrix.view())?,
                })
            }
            InferenceRequest::LogClustering { logs } => {
                let model = self
                    .clustering
                    .as_ref()
                    .ok_or_else(|| not_loaded(ModelKind::LogClustering))?;
                Ok(InferenceResponse::LogClusters {
                    log_clusters: model.predict(logs)?,
                })
            }
        }
    }
}

/// `{statusCode, body}` envelope with the JSON response as body
impl From<&Result<InferenceResponse>> for HandlerResponse {
    fn from(result: &Result<InferenceResponse>) -> Self {
        match result {
            Ok(response) => {
                let status_code = match response {
                    InferenceResponse::Error { .. } => 400,
                    _ => 200,
                };
                Self {
                    status_code,
                    body: serde_json::to_string(response).unwrap_or_else(|e| e.to_string()),
                }
            }
            Err(e) => Self {
                status_code: match e {
                    e if e.is_invalid_input() => 400,
                    GuardError::ModelNotLoaded(_) => 503,
                    _ => 500,
                },
                body: e.to_string(),
            },
        }
    }
}

fn not_loaded(kind: ModelKind) -> GuardError {
    GuardError::ModelNotLoaded(kind.to_string())
}

/// Dense matrix from row vectors that must all be `width` wide
fn rows_to_matrix(rows: &[Vec<f64>], width: usize) -> Result<Array2<f64>> {
    if let Some(bad) = rows.iter().find(|r| r.len() != width) {
        return Err(GuardError::DimensionMismatch {
            expected: width,
            actual: bad.len(),
        });
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), width), flat).map_err(|e| {
        GuardError::InvalidEvent(format!("could not build feature matrix: {e}"))
    })
}
