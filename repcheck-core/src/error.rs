//! Error types for the repcheck-core crate.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for verification runs.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl VerifyError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn task(msg: impl Into<String>) -> Self {
        Self::Task(msg.into())
    }

    /// True when the failure came from loading or pairing the checkpoints.
    pub fn is_load_error(&self) -> bool {
        matches!(self, Self::Load(_))
    }
}

/// A checkpoint could not be loaded, or the pair cannot be compared.
///
/// Always fatal: comparison never starts once one of these is raised.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Checkpoint not found: {}", path.display())]
    Missing { path: PathBuf },

    #[error("Failed to read checkpoint {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt checkpoint {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("Checkpoints are structurally incompatible:\n{0}")]
    StructuralMismatch(Mismatch),
}

impl LoadError {
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Everything that keeps two checkpoints from being compared element-wise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mismatch {
    /// Identifiers present only in the first checkpoint.
    pub only_in_a: Vec<String>,
    /// Identifiers present only in the second checkpoint.
    pub only_in_b: Vec<String>,
    /// Per-identifier or whole-checkpoint conflicts (shape, dtype, iteration, ...).
    pub conflicts: Vec<String>,
}

impl Mismatch {
    pub fn is_empty(&self) -> bool {
        self.only_in_a.is_empty() && self.only_in_b.is_empty() && self.conflicts.is_empty()
    }

    pub(crate) fn conflict(&mut self, msg: impl Into<String>) {
        self.conflicts.push(msg.into());
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = Vec::new();
        if !self.only_in_a.is_empty() {
            lines.push(format!(
                "  keys only in checkpoint A: {}",
                self.only_in_a.join(", ")
            ));
        }
        if !self.only_in_b.is_empty() {
            lines.push(format!(
                "  keys only in checkpoint B: {}",
                self.only_in_b.join(", ")
            ));
        }
        for conflict in &self.conflicts {
            lines.push(format!("  {conflict}"));
        }
        write!(f, "{}", lines.join("\n"))
    }
}
