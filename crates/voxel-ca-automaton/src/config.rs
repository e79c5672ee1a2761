//! Engine configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AutomatonError, AutomatonResult};

/// Configuration for a [`crate::LazyWorld`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Buckets in the timer wheel; scheduled delays must be smaller.
    #[serde(default = "default_wheel_size")]
    pub wheel_size: usize,

    /// Engine steps executed per host tick.
    #[serde(default = "default_steps_per_tick")]
    pub steps_per_tick: u32,

    /// Also seed empty cells when a section loads.
    #[serde(default)]
    pub seed_empty_cells: bool,

    /// Number of tick reports kept in history.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

fn default_wheel_size() -> usize {
    256
}

fn default_steps_per_tick() -> u32 {
    1
}

fn default_history_window() -> usize {
    64
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            wheel_size: default_wheel_size(),
            steps_per_tick: default_steps_per_tick(),
            seed_empty_cells: false,
            history_window: default_history_window(),
        }
    }
}

impl EngineConfig {
    /// Small wheel and short history, for tests and demos.
    pub fn fast() -> Self {
        Self {
            wheel_size: 32,
            history_window: 8,
            ..Default::default()
        }
    }

    /// Several steps per host tick for quickly settling simulations.
    pub fn accelerated(steps_per_tick: u32) -> Self {
        Self {
            steps_per_tick,
            ..Default::default()
        }
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> AutomatonResult<()> {
        if self.wheel_size < 2 {
            return Err(AutomatonError::InvalidConfig {
                message: format!("wheel_size must be >= 2, got {}", self.wheel_size),
            });
        }
        if self.steps_per_tick == 0 {
            return Err(AutomatonError::InvalidConfig {
                message: "steps_per_tick must be >= 1".to_string(),
            });
        }
        if self.history_window == 0 {
            return Err(AutomatonError::InvalidConfig {
                message: "history_window must be >= 1".to_string(),
            });
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> AutomatonResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> AutomatonResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}
