//! Engine configuration
//!
//! Tunables for the judging engine, loaded from TOML or set dynamically.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

use crate::error::JudgeError;

/// Engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Interval between memory samples (default: 5ms)
    pub sample_interval: Duration,
    /// A limit is reported as too tight when it is less than this many
    /// times the observed usage (default: 2.0)
    pub tight_limit_ratio: f64,
    /// Upper bound for collecting output after the child is reaped (default: 1s)
    pub drain_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(5),
            tight_limit_ratio: 2.0,
            drain_timeout: Duration::from_secs(1),
        }
    }
}

/// Raw TOML configuration, all durations in milliseconds
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEngineConfig {
    sample_interval_ms: Option<u64>,
    tight_limit_ratio: Option<f64>,
    drain_timeout_ms: Option<u64>,
}

impl EngineConfig {
    /// Parse configuration from TOML; missing keys keep their defaults
    pub fn from_toml(content: &str) -> Result<Self, JudgeError> {
        let raw: RawEngineConfig =
            toml::from_str(content).map_err(|e| JudgeError::Config(e.to_string()))?;
        let defaults = Self::default();

        let config = Self {
            sample_interval: raw
                .sample_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.sample_interval),
            tight_limit_ratio: raw.tight_limit_ratio.unwrap_or(defaults.tight_limit_ratio),
            drain_timeout: raw
                .drain_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.drain_timeout),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine config: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse engine config: {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), JudgeError> {
        if self.sample_interval.is_zero() {
            return Err(JudgeError::Config("sample interval must be positive".into()));
        }
        if self.drain_timeout.is_zero() {
            return Err(JudgeError::Config("drain timeout must be positive".into()));
        }
        if !(self.tight_limit_ratio.is_finite() && self.tight_limit_ratio > 0.0) {
            return Err(JudgeError::Config(format!(
                "tight limit ratio must be positive, got {}",
                self.tight_limit_ratio
            )));
        }
        Ok(())
    }
}

/// Global engine configuration
static ENGINE_CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// Initialize the global engine configuration
pub fn init_config(config: EngineConfig) -> anyhow::Result<()> {
    config.validate()?;
    ENGINE_CONFIG
        .set(config)
        .map_err(|_| anyhow::anyhow!("Engine configuration already initialized"))?;

    Ok(())
}

/// Get the global engine configuration
pub fn get_config() -> &'static EngineConfig {
    ENGINE_CONFIG.get().unwrap_or_else(|| {
        static DEFAULT: OnceLock<EngineConfig> = OnceLock::new();

        DEFAULT.get_or_init(|| {
            warn!("Engine configuration not initialized, using default");
            EngineConfig::default()
        })
    })
}
