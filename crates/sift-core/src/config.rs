//! Configuration management for sift
//!
//! Handles loading and validation of sift.toml configuration files.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::{DEFAULT_TOP_K, MatchOptions};
use crate::error::{ConfigError, Result};
use crate::logging::LogFormat;
use crate::pipeline::PipelineOptions;
use crate::rank::Scheme;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Matching settings
    #[serde(default, rename = "match")]
    pub matching: MatchConfig,

    /// Pipeline settings
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Matching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Disable ASCII case folding
    #[serde(default)]
    pub case_sensitive: bool,

    /// Secondary ordering policy (default, path, history)
    #[serde(default)]
    pub scheme: Scheme,

    /// Result limit per pass
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            scheme: Scheme::default(),
            limit: default_limit(),
        }
    }
}

fn default_limit() -> usize {
    DEFAULT_TOP_K
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Keystroke debounce window in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Growth observation interval in milliseconds
    #[serde(default = "default_growth_tick_ms")]
    pub growth_tick_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            growth_tick_ms: default_growth_tick_ms(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_growth_tick_ms() -> u64 {
    100
}

const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Load and validate a config file.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::ReadFailed(path.display().to_string(), e.to_string())
        })?;
        let config: Self =
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field ranges.
    pub fn validate(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "general.log_level must be one of {VALID_LOG_LEVELS:?}, got {:?}",
                self.general.log_level
            ))
            .into());
        }
        if self.matching.limit == 0 {
            return Err(
                ConfigError::ValidationError("match.limit must be greater than 0".into()).into(),
            );
        }
        if self.pipeline.debounce_ms == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.debounce_ms must be greater than 0".into(),
            )
            .into());
        }
        if self.pipeline.growth_tick_ms == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.growth_tick_ms must be greater than 0".into(),
            )
            .into());
        }
        Ok(())
    }

    /// Engine options derived from the `[match]` section.
    #[must_use]
    pub fn match_options(&self) -> MatchOptions {
        MatchOptions {
            case_sensitive: self.matching.case_sensitive,
            scheme: self.matching.scheme,
            top_k: self.matching.limit,
        }
    }

    /// Pipeline options derived from the `[pipeline]` and `[match]` sections.
    #[must_use]
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            debounce: Duration::from_millis(self.pipeline.debounce_ms),
            growth_tick: Duration::from_millis(self.pipeline.growth_tick_ms),
            matching: self.match_options(),
        }
    }
}
