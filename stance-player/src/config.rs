//! Configuration for the feed playback scheduler
//!
//! Two layers, lowest priority first:
//! 1. Built-in defaults (code constants below)
//! 2. TOML file (`[scheduler]` and `[logging]` tables)
//!
//! Command-line overrides are applied on top by the binary via
//! [`ConfigOverrides`].

use crate::error::{Error, Result};
use serde::Deserialize;
use stance_common::config::{load_or_default, ConfigFileResolver, LoggingConfig};
use stance_common::time::millis_to_duration;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// How the progress ratio is produced from engine samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStrategy {
    /// Set the ratio directly on every reconciliation tick
    #[default]
    Sampled,
    /// Interpolate from the last anchor toward 1 over the remaining time
    Interpolated,
}

/// Scheduler tuning knobs
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Reconciliation tick period per mounted cell
    pub reconcile_interval_ms: u64,

    /// Delay between interruption close and intent restore
    pub interruption_settle_ms: u64,

    /// Previous ratio above this counts as "near the end" for loop-wrap detection
    pub loop_wrap_high: f64,

    /// New ratio below this counts as "restarted" for loop-wrap detection
    pub loop_wrap_low: f64,

    /// Pre-buffer cells that are mounted but not active
    pub preload_inactive: bool,

    /// Progress animator strategy
    pub progress_strategy: ProgressStrategy,

    /// Smallest ratio change that wakes progress observers
    pub progress_min_delta: f64,

    /// Cells mounted on each side of the active index
    pub render_window: usize,

    /// Height of one feed page in scroll units
    pub page_height: f64,

    /// Event bus buffer size
    pub event_bus_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_ms: 100,
            interruption_settle_ms: 100,
            loop_wrap_high: 0.95,
            loop_wrap_low: 0.05,
            preload_inactive: true,
            progress_strategy: ProgressStrategy::Sampled,
            progress_min_delta: 0.001,
            render_window: 2,
            page_height: 800.0,
            event_bus_capacity: 256,
        }
    }
}

impl SchedulerConfig {
    /// Reconciliation interval as Duration
    pub fn reconcile_interval(&self) -> Duration {
        millis_to_duration(self.reconcile_interval_ms)
    }

    /// Interruption settle delay as Duration
    pub fn interruption_settle(&self) -> Duration {
        millis_to_duration(self.interruption_settle_ms)
    }

    /// Reject values the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.reconcile_interval_ms == 0 {
            return Err(Error::Config(
                "reconcile_interval_ms must be greater than 0".to_string(),
            ));
        }
        for (name, value) in [
            ("loop_wrap_high", self.loop_wrap_high),
            ("loop_wrap_low", self.loop_wrap_low),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.loop_wrap_low >= self.loop_wrap_high {
            return Err(Error::Config(format!(
                "loop_wrap_low ({}) must be below loop_wrap_high ({})",
                self.loop_wrap_low, self.loop_wrap_high
            )));
        }
        if !(self.progress_min_delta >= 0.0 && self.progress_min_delta < 1.0) {
            return Err(Error::Config(format!(
                "progress_min_delta must be within [0, 1), got {}",
                self.progress_min_delta
            )));
        }
        if !(self.page_height.is_finite() && self.page_height > 0.0) {
            return Err(Error::Config(format!(
                "page_height must be positive, got {}",
                self.page_height
            )));
        }
        Ok(())
    }
}

/// Complete file configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the resolved TOML file, falling back to defaults
    ///
    /// # Configuration Priority
    ///
    /// 1. Command-line arguments (highest priority)
    /// 2. TOML file (command line path, `STANCE_CONFIG`, platform dir)
    /// 3. Built-in defaults (lowest priority)
    pub fn load(config_path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let resolver = ConfigFileResolver::new("stance-player");
        let mut config: Config = load_or_default(&resolver, config_path)?;
        overrides.apply(&mut config);
        config.scheduler.validate()?;

        info!(
            "Scheduler config: reconcile={}ms settle={}ms wrap=({}, {}) preload={} progress={:?} window={}",
            config.scheduler.reconcile_interval_ms,
            config.scheduler.interruption_settle_ms,
            config.scheduler.loop_wrap_low,
            config.scheduler.loop_wrap_high,
            config.scheduler.preload_inactive,
            config.scheduler.progress_strategy,
            config.scheduler.render_window,
        );
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        config.scheduler.validate()?;
        Ok(config)
    }
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub reconcile_interval_ms: Option<u64>,
    pub interruption_settle_ms: Option<u64>,
    pub progress_strategy: Option<ProgressStrategy>,
    pub log_level: Option<String>,
}

impl ConfigOverrides {
    fn apply(self, config: &mut Config) {
        if let Some(ms) = self.reconcile_interval_ms {
            config.scheduler.reconcile_interval_ms = ms;
        }
        if let Some(ms) = self.interruption_settle_ms {
            config.scheduler.interruption_settle_ms = ms;
        }
        if let Some(strategy) = self.progress_strategy {
            config.scheduler.progress_strategy = strategy;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
    }
}
