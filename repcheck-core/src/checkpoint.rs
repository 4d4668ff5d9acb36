//! Checkpoint documents written by training runs.
//!
//! Two JSON layouts are accepted:
//!
//! - a training checkpoint, `{"iteration": N, "model": {...}, "optimizer": {...}, "config": {...}}`
//! - a bare state dict, `{"<param id>": <tensor>, ...}`

use crate::error::{LoadError, VerifyError};
use crate::persistence;
use crate::tensor::Tensor;
use crate::training_config::TrainingConfiguration;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

/// Optimizer state saved next to the model parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    #[serde(default)]
    pub step: u64,
    /// Per-parameter buffers such as `exp_avg.<param>`.
    #[serde(default)]
    pub state: BTreeMap<String, Tensor>,
    /// Scalar settings such as `lr` or `beta1`.
    #[serde(default)]
    pub hyperparams: BTreeMap<String, f64>,
}

/// A snapshot of model parameters at one point of a training run.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub name: String,
    /// Iteration the snapshot was taken at. Unknown for bare state dicts.
    pub iteration: Option<u64>,
    pub parameters: BTreeMap<String, Tensor>,
    pub optimizer: Option<OptimizerState>,
    pub config: Option<TrainingConfiguration>,
    pub saved_at: Option<DateTime<Utc>>,
}

/// Training-checkpoint layout on disk.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TrainingDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, alias = "iter_num")]
    iteration: Option<u64>,
    model: BTreeMap<String, Tensor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    optimizer: Option<OptimizerState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    config: Option<TrainingConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    saved_at: Option<DateTime<Utc>>,
}

/// Content that identifies a run's output; excludes `name` and `saved_at`.
#[derive(Serialize)]
struct FingerprintView<'a> {
    iteration: Option<u64>,
    parameters: &'a BTreeMap<String, Tensor>,
    optimizer: Option<&'a OptimizerState>,
    config: Option<&'a TrainingConfiguration>,
}

impl Checkpoint {
    pub fn new(name: impl Into<String>, iteration: Option<u64>) -> Self {
        Self {
            name: name.into(),
            iteration,
            parameters: BTreeMap::new(),
            optimizer: None,
            config: None,
            saved_at: None,
        }
    }

    /// Builder-style parameter insertion.
    pub fn with_parameter(mut self, id: impl Into<String>, tensor: Tensor) -> Self {
        self.parameters.insert(id.into(), tensor);
        self
    }

    pub fn with_optimizer(mut self, optimizer: OptimizerState) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    pub fn with_config(mut self, config: TrainingConfiguration) -> Self {
        self.config = Some(config);
        self
    }

    /// Load and validate a checkpoint file.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LoadError::Missing {
                    path: path.to_path_buf(),
                });
            }
            Err(source) => {
                return Err(LoadError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let default_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let checkpoint = Self::from_json(&content, &default_name)
            .map_err(|reason| LoadError::corrupt(path, reason))?;

        tracing::debug!(
            path = %path.display(),
            parameters = checkpoint.parameters.len(),
            elements = checkpoint.total_elements(),
            "Loaded checkpoint"
        );
        Ok(checkpoint)
    }

    /// Parse either on-disk layout. Errors are human-readable reasons.
    pub fn from_json(content: &str, default_name: &str) -> Result<Self, String> {
        let value: serde_json::Value =
            serde_json::from_str(content).map_err(|e| format!("invalid JSON: {e}"))?;
        let serde_json::Value::Object(map) = value else {
            return Err("top level must be a JSON object".into());
        };

        let checkpoint = if map.contains_key("model") {
            let doc: TrainingDocument = serde_json::from_value(serde_json::Value::Object(map))
                .map_err(|e| format!("invalid training checkpoint: {e}"))?;
            Self {
                name: doc.name.unwrap_or_else(|| default_name.to_string()),
                iteration: doc.iteration,
                parameters: doc.model,
                optimizer: doc.optimizer,
                config: doc.config,
                saved_at: doc.saved_at,
            }
        } else {
            let mut parameters = BTreeMap::new();
            for (id, raw) in map {
                let tensor: Tensor = serde_json::from_value(raw)
                    .map_err(|e| format!("parameter '{id}': {e}"))?;
                parameters.insert(id, tensor);
            }
            Self {
                name: default_name.to_string(),
                iteration: None,
                parameters,
                optimizer: None,
                config: None,
                saved_at: None,
            }
        };

        if checkpoint.parameters.is_empty() {
            return Err("checkpoint contains no parameters".into());
        }
        Ok(checkpoint)
    }

    /// Write the checkpoint atomically in the training-checkpoint layout.
    pub fn save(&self, path: &Path) -> Result<(), VerifyError> {
        let doc = TrainingDocument {
            name: Some(self.name.clone()),
            iteration: self.iteration,
            model: self.parameters.clone(),
            optimizer: self.optimizer.clone(),
            config: self.config.clone(),
            saved_at: self.saved_at,
        };
        persistence::atomic_write_json(path, &doc)?;
        Ok(())
    }

    pub fn total_elements(&self) -> u64 {
        self.parameters.values().map(|t| t.numel() as u64).sum()
    }

    /// SHA-256 over the canonical content of the checkpoint.
    ///
    /// Bit-identical runs produce equal fingerprints regardless of file name
    /// or save time.
    pub fn fingerprint(&self) -> Result<String, VerifyError> {
        let view = FingerprintView {
            iteration: self.iteration,
            parameters: &self.parameters,
            optimizer: self.optimizer.as_ref(),
            config: self.config.as_ref(),
        };
        let bytes = serde_json::to_vec(&view)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }
}
