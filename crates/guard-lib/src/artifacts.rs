//! Model artifact persistence
//!
//! Each trained model is written as pretty JSON next to a `.sha256`
//! sidecar holding the hex digest of the JSON bytes. Loading recomputes the
//! digest and refuses files that do not match.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::anomaly::{CpuDeviationRule, IsolationForest};
use crate::error::{GuardError, Result};

/// Kinds of artifacts produced by the offline pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Anomaly,
    Maintenance,
    LogClustering,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [
        ModelKind::Anomaly,
        ModelKind::Maintenance,
        ModelKind::LogClustering,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            ModelKind::Anomaly => "anomaly_model.json",
            ModelKind::Maintenance => "maintenance_model.json",
            ModelKind::LogClustering => "log_clustering_model.json",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKind::Anomaly => write!(f, "anomaly"),
            ModelKind::Maintenance => write!(f, "maintenance"),
            ModelKind::LogClustering => write!(f, "log_clustering"),
        }
    }
}

/// Isolation forest plus what is needed to apply it to a fresh CSV
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyArtifact {
    /// Raw metric columns in the order the forest was fitted on
    pub feature_names: Vec<String>,
    pub forest: IsolationForest,
    pub rule: CpuDeviationRule,
}

/// Directory of model artifacts
#[derive(Debug, Clone)]
pub struct ModelStore {
    root: PathBuf,
}

/// Hex-encoded SHA-256 of `data`
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".sha256");
    PathBuf::from(name)
}

impl ModelStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, kind: ModelKind) -> PathBuf {
        self.root.join(kind.file_name())
    }

    pub fn exists(&self, kind: ModelKind) -> bool {
        self.path_for(kind).is_file()
    }

    /// Serialize `model` and write it with its checksum sidecar
    pub fn save<T: Serialize>(&self, kind: ModelKind, model: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(kind);
        let bytes = serde_json::to_vec_pretty(model)?;
        let checksum = compute_checksum(&bytes);

        fs::write(&path, &bytes)?;
        fs::write(sidecar_path(&path), format!("{checksum}\n"))?;

        info!(
            model = %kind,
            path = %path.display(),
            size_bytes = bytes.len(),
            checksum = %checksum,
            "Saved model artifact"
        );
        Ok(path)
    }

    /// Read and verify an artifact
    ///
    /// A missing sidecar is accepted; a present one must match.
    pub fn load<T: DeserializeOwned>(&self, kind: ModelKind) -> Result<T> {
        let path = self.path_for(kind);
        if !path.is_file() {
            return Err(GuardError::ModelNotLoaded(format!(
                "{kind} artifact not found at {}",
                path.display()
            )));
        }

        let bytes = fs::read(&path)?;
        let sidecar = sidecar_path(&path);
        if sidecar.is_file() {
            let expected = fs::read_to_string(&sidecar)?.trim().to_string();
            let actual = compute_checksum(&bytes);
            if expected != actual {
                return Err(GuardError::ChecksumMismatch {
                    path: path.display().to_string(),
                    expected,
                    actual,
                });
            }
        } else {
            debug!(path = %path.display(), "No checksum sidecar, skipping verification");
        }

        let model = serde_json::from_slice(&bytes)?;
        debug!(model = %kind, path = %path.display(), "Loaded model artifact");
        Ok(model)
    }

    /// Load an artifact if it exists
    pub fn load_optional<T: DeserializeOwned>(&self, kind: ModelKind) -> Result<Option<T>> {
        if !self.exists(kind) {
            return Ok(None);
        }
        self.load(kind).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Toy {
        weights: Vec<f64>,
    }

    #[test]
    fn test_checksum_is_stable() {
        assert_eq!(compute_checksum(b"abc"), compute_checksum(b"abc"));
        assert_ne!(compute_checksum(b"abc"), compute_checksum(b"abd"));
        assert_eq!(compute_checksum(b"").len(), 64);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path().join("models"));
        let toy = Toy {
            weights: vec![0.5, 1.5],
        };

        let path = store.save(ModelKind::Maintenance, &toy).unwrap();
        assert!(path.ends_with("maintenance_model.json"));
        assert!(sidecar_path(&path).is_file());

        let loaded: Toy = store.load(ModelKind::Maintenance).unwrap();
        assert_eq!(loaded, toy);
    }

    #[test]
    fn test_tampered_artifact_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path());
        let path = store
            .save(ModelKind::Anomaly, &Toy { weights: vec![1.0] })
            .unwrap();
        fs::write(&path, br#"{"weights":[2.0]}"#).unwrap();

        let result: Result<Toy> = store.load(ModelKind::Anomaly);
        assert!(matches!(result, Err(GuardError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_missing_artifact() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path());

        let result: Result<Toy> = store.load(ModelKind::LogClustering);
        assert!(matches!(result, Err(GuardError::ModelNotLoaded(_))));
        let optional: Option<Toy> = store.load_optional(ModelKind::LogClustering).unwrap();
        assert!(optional.is_none());
    }

    #[test]
    fn test_file_names() {
        let names: Vec<&str> = ModelKind::ALL.iter().map(ModelKind::file_name).collect();
        assert_eq!(
            names,
            vec![
                "anomaly_model.json",
                "maintenance_model.json",
                "log_clustering_model.json"
            ]
        );
    }
}
