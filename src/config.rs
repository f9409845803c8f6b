//! Engine configuration
//!
//! Stored as RON next to the executable. Every field has a default, so a
//! partial file (or no file at all) is fine.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Serialize, Deserialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Logic step length in seconds
    pub fixed_step: f64,
    /// Most logic steps run in a single rendered frame
    pub max_substeps: u32,
    /// Downward acceleration, units per second squared
    pub gravity: f32,
    /// Slack allowed between room bounds that count as touching
    pub near_margin: f32,
    /// `tracing` filter used when `RUST_LOG` adds nothing
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fixed_step: 1.0 / 60.0,
            max_substeps: 6,
            gravity: 4500.0,
            near_margin: 16.0,
            log_filter: "warn,tomb_runtime=info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fixed_step.is_finite() && self.fixed_step > 0.0) {
            return Err(ConfigError::Invalid(format!("fixed_step must be positive, got {}", self.fixed_step)));
        }
        self.step_duration()?;
        if self.max_substeps == 0 {
            return Err(ConfigError::Invalid("max_substeps must be at least 1".to_string()));
        }
        if !self.gravity.is_finite() {
            return Err(ConfigError::Invalid(format!("gravity must be finite, got {}", self.gravity)));
        }
        if !(self.near_margin.is_finite() && self.near_margin >= 0.0) {
            return Err(ConfigError::Invalid(format!("near_margin must be non-negative, got {}", self.near_margin)));
        }
        Ok(())
    }

    /// `fixed_step` as a `Duration`. Fails for steps too long to represent.
    pub fn step_duration(&self) -> Result<Duration, ConfigError> {
        Duration::try_from_secs_f64(self.fixed_step)
            .map_err(|e| ConfigError::Invalid(format!("fixed_step {}: {}", self.fixed_step, e)))
    }
}

/// Read a config file. A missing file gives the defaults.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(EngineConfig::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: EngineConfig = ron::from_str(&text)?;
    config.validate()?;
    Ok(config)
}
