//! Configuration system for repcheck.
//!
//! Uses `figment` for layered configuration: defaults -> user config ->
//! workspace config -> explicit file -> environment. CLI flags are applied on
//! top by the binary.

use crate::error::VerifyError;
use crate::tolerance::Tolerance;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Top-level configuration for a verification run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifierConfig {
    #[serde(default)]
    pub tolerance: Tolerance,
    #[serde(default)]
    pub compare: CompareOptions,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Which structural checks apply and what participates in the comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareOptions {
    /// Compare optimizer state as well as model parameters.
    pub include_optimizer: bool,
    /// Both checkpoints must have been saved at the same iteration.
    pub require_same_iteration: bool,
    /// Embedded training configurations must match.
    pub require_same_config: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            include_optimizer: true,
            require_same_iteration: true,
            require_same_config: true,
        }
    }
}

/// Report format on stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output format '{other}' (expected text or json)")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

impl VerifierConfig {
    pub fn validate(&self) -> Result<(), VerifyError> {
        self.tolerance.validate()
    }
}

/// `<workspace>/.repcheck/config.toml`
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".repcheck").join("config.toml")
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "repcheck", "repcheck")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (`REPCHECK_TOLERANCE__ABSOLUTE`, ...)
/// 2. Explicit config file
/// 3. Workspace config (`.repcheck/config.toml`)
/// 4. User config (`~/.config/repcheck/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<VerifierConfig, VerifyError> {
    let mut figment = Figment::from(Serialized::defaults(VerifierConfig::default()));

    if let Some(user_config) = user_config_path().filter(|p| p.exists()) {
        figment = figment.merge(Toml::file(user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(ws_config));
        }
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(VerifyError::config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("REPCHECK_").split("__"));

    let config: VerifierConfig = figment.extract().map_err(Box::new)?;
    config.validate()?;
    tracing::debug!(?config, "Loaded configuration");
    Ok(config)
}
