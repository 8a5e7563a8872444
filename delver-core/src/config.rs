//! Configuration system for Delver.
//!
//! Uses `figment` for layered configuration: defaults -> config file ->
//! environment -> explicit overrides. Configuration is loaded from
//! `delver.toml` in the workspace directory; environment variables use the
//! `DELVER_` prefix with `__` as the section separator.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Configuration for a deep research run.
///
/// `breadth` bounds fan-out at every level of the exploration tree (it
/// resets per level), `depth` is the number of recursive levels below the
/// root, and `concurrency_limit` caps simultaneously running branches
/// across the whole tree. The budget fields are optional; `None` means
/// unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Maximum number of sub-queries generated per node.
    pub breadth: usize,
    /// Number of recursive levels explored below the root.
    pub depth: usize,
    /// Maximum number of research branches running at the same time.
    pub concurrency_limit: usize,
    /// Total token budget for the run, if any.
    pub max_token_budget: Option<u64>,
    /// Maximum number of retrieval queries issued, if any.
    pub max_queries: Option<u64>,
    /// Wall-clock deadline for the run in seconds, if any.
    pub max_wall_clock_secs: Option<u64>,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            breadth: 4,
            depth: 2,
            concurrency_limit: 2,
            max_token_budget: None,
            max_queries: None,
            max_wall_clock_secs: None,
        }
    }
}

impl ResearchConfig {
    /// Validate the configuration.
    ///
    /// Contract violations fail fast here, before any research work starts.
    /// `depth == 0` is legal (the root behaves as a leaf).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.breadth < 1 {
            return Err(ConfigError::InvalidBreadth {
                breadth: self.breadth,
            });
        }
        if self.concurrency_limit < 1 {
            return Err(ConfigError::InvalidConcurrencyLimit {
                limit: self.concurrency_limit,
            });
        }
        Ok(())
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `DELVER_`)
/// 3. Workspace-local config (`delver.toml`)
/// 4. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&ResearchConfig>,
) -> Result<ResearchConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(ResearchConfig::default()));

    if let Some(ws) = workspace {
        let ws_config = ws.join("delver.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    figment = figment.merge(Env::prefixed("DELVER_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: ResearchConfig = figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}
