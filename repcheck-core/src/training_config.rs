//! Training configuration recorded alongside checkpoints.
//!
//! Both runs of a reproducibility check must be launched from the same
//! configuration and seed; when checkpoints embed it, the verifier checks it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Numeric precision the training run used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Float32,
    BFloat16,
    Float16,
    Float64,
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Float32 => "float32",
            Self::BFloat16 => "bfloat16",
            Self::Float16 => "float16",
            Self::Float64 => "float64",
        };
        f.write_str(s)
    }
}

/// Hyperparameters fixed for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfiguration {
    pub seed: u64,
    pub max_iters: u64,
    /// Model shape, e.g. `n_layer`, `n_head`, `n_embd`, `block_size`.
    #[serde(default)]
    pub model: BTreeMap<String, u64>,
    #[serde(default)]
    pub precision: Precision,
    /// Any other hyperparameters, stringified.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl TrainingConfiguration {
    pub fn new(seed: u64, max_iters: u64) -> Self {
        Self {
            seed,
            max_iters,
            model: BTreeMap::new(),
            precision: Precision::default(),
            extra: BTreeMap::new(),
        }
    }

    /// Describe every field that differs from `other`, in a stable order.
    pub fn differences(&self, other: &Self) -> Vec<String> {
        let mut diffs = Vec::new();
        if self.seed != other.seed {
            diffs.push(format!("seed {} vs {}", self.seed, other.seed));
        }
        if self.max_iters != other.max_iters {
            diffs.push(format!(
                "max_iters {} vs {}",
                self.max_iters, other.max_iters
            ));
        }
        if self.precision != other.precision {
            diffs.push(format!(
                "precision {} vs {}",
                self.precision, other.precision
            ));
        }
        map_differences("model", &self.model, &other.model, &mut diffs);
        map_differences("extra", &self.extra, &other.extra, &mut diffs);
        diffs
    }
}

fn map_differences<V: PartialEq + fmt::Display>(
    section: &str,
    a: &BTreeMap<String, V>,
    b: &BTreeMap<String, V>,
    out: &mut Vec<String>,
) {
    let mut keys: Vec<&String> = a.keys().chain(b.keys()).collect();
    keys.sort();
    keys.dedup();
    for key in keys {
        match (a.get(key), b.get(key)) {
            (Some(x), Some(y)) if x == y => {}
            (Some(x), Some(y)) => out.push(format!("{section}.{key} {x} vs {y}")),
            (Some(x), None) => out.push(format!("{section}.{key} {x} vs <unset>")),
            (None, Some(y)) => out.push(format!("{section}.{key} <unset> vs {y}")),
            (None, None) => {}
        }
    }
}
