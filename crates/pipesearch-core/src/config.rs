//! Configuration management for the pipesearch orchestrator.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::split::RowLimits;

/// Quality tier supplied by the deployment environment.
///
/// The tier is an opaque input to the row-limit policy: `Speed` applies
/// the configured sample ratio before row limits, `Accuracy` disables
/// subsampling entirely.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Subsample aggressively to keep searches fast.
    #[default]
    Speed,
    /// Use every available row.
    Accuracy,
}

/// Remote-search tuning knobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Maximum number of pulls performed against any streamed response.
    pub pull_max: usize,
    /// Per-pull receive timeout in milliseconds.
    pub pull_timeout_ms: u64,
    /// Time budget handed to the remote engine, in minutes.
    pub time_budget_minutes: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            pull_max: 1024,
            pull_timeout_ms: 60_000,
            time_budget_minutes: 5,
        }
    }
}

/// Dataset partitioning bounds and ratios.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SplitSettings {
    pub min_training_rows: usize,
    pub max_training_rows: usize,
    pub min_test_rows: usize,
    pub max_test_rows: usize,
    /// Fraction of rows retained when the quality tier allows subsampling.
    pub sample_ratio: f64,
    /// Fraction of retained rows assigned to the train partition.
    pub train_ratio: f64,
    pub quality: Quality,
}

impl Default for SplitSettings {
    fn default() -> Self {
        Self {
            min_training_rows: 100,
            max_training_rows: 100_000,
            min_test_rows: 100,
            max_test_rows: 100_000,
            sample_ratio: 0.2,
            train_ratio: 0.9,
            quality: Quality::default(),
        }
    }
}

impl SplitSettings {
    /// Derive the row-limit policy input from these settings.
    pub fn row_limits(&self) -> RowLimits {
        let sample_ratio = match self.quality {
            Quality::Speed => self.sample_ratio,
            Quality::Accuracy => 1.0,
        };
        RowLimits {
            min_training_rows: self.min_training_rows,
            max_training_rows: self.max_training_rows,
            min_test_rows: self.min_test_rows,
            max_test_rows: self.max_test_rows,
            sample_ratio,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub split: SplitSettings,
}

impl Config {
    /// Load configuration from files and environment.
    ///
    /// Configuration is loaded in order:
    /// 1. config/default.toml (base settings)
    /// 2. config/{PIPESEARCH_ENV}.toml (environment-specific)
    /// 3. Environment variables with PIPESEARCH prefix
    pub fn load() -> CoreResult<Self> {
        let env = std::env::var("PIPESEARCH_ENV").unwrap_or_else(|_| "development".to_string());

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("PIPESEARCH").separator("__"));

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| CoreError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> CoreResult<()> {
        if self.search.pull_max == 0 {
            return Err(CoreError::Config(
                "search.pull_max must be greater than 0".into(),
            ));
        }

        if self.search.pull_timeout_ms == 0 {
            return Err(CoreError::Config(
                "search.pull_timeout_ms must be greater than 0".into(),
            ));
        }

        if !(self.split.train_ratio > 0.0 && self.split.train_ratio <= 1.0) {
            return Err(CoreError::Config(
                "split.train_ratio must be within (0, 1]".into(),
            ));
        }

        if !(self.split.sample_ratio > 0.0 && self.split.sample_ratio <= 1.0) {
            return Err(CoreError::Config(
                "split.sample_ratio must be within (0, 1]".into(),
            ));
        }

        if self.split.min_training_rows > self.split.max_training_rows {
            return Err(CoreError::Config(
                "split.min_training_rows must not exceed split.max_training_rows".into(),
            ));
        }

        if self.split.min_test_rows > self.split.max_test_rows {
            return Err(CoreError::Config(
                "split.min_test_rows must not exceed split.max_test_rows".into(),
            ));
        }

        Ok(())
    }
}
