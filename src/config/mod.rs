//! # Worker Configuration
//!
//! Settings for a single pipeline worker. Every field has a default, so an
//! empty file (or no file at all) yields a usable dynamic-mode worker.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pipeworker_core::config::SettingsLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = SettingsLoader::new()
//!     .with_file("config/worker.yaml")
//!     .load()?;
//! println!("{} starts at {}", settings.name, settings.concurrency.starting);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::SettingsLoader;

/// Upscaling bound applied when none is configured
pub const DEFAULT_MAX_CONCURRENCY: usize = 1000;

/// Concurrency governor settings
///
/// In dynamic mode the ceiling starts at `starting` and is retuned once per
/// `window_ms`, never dropping below `min` or rising above `max`. With
/// `fixed_rate` the ceiling stays at `starting` for the worker's lifetime.
/// `min` is also the capacity of the internal queues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencySettings {
    pub starting: usize,
    pub min: usize,
    /// Upper bound for upscaling; `None` removes the bound
    pub max: Option<usize>,
    pub fixed_rate: bool,
    pub window_ms: u64,
}

impl Default for ConcurrencySettings {
    fn default() -> Self {
        Self {
            starting: 10,
            min: 5,
            max: Some(DEFAULT_MAX_CONCURRENCY),
            fixed_rate: false,
            window_ms: 10_000,
        }
    }
}

impl ConcurrencySettings {
    /// Constant ceiling of `concurrency`
    pub fn fixed(concurrency: usize) -> Self {
        Self {
            starting: concurrency,
            min: concurrency,
            max: None,
            fixed_rate: true,
            ..Self::default()
        }
    }

    /// Adaptive ceiling starting at `starting`, floored at `min`
    ///
    /// Upscaling is capped at [`DEFAULT_MAX_CONCURRENCY`], or at `starting`
    /// when that is higher.
    pub fn dynamic(starting: usize, min: usize, window_ms: u64) -> Self {
        Self {
            starting,
            min,
            max: Some(starting.max(DEFAULT_MAX_CONCURRENCY)),
            fixed_rate: false,
            window_ms,
            ..Self::default()
        }
    }

    pub fn with_max(mut self, max: Option<usize>) -> Self {
        self.max = max;
        self
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.min == 0 {
            return Err(ConfigurationError::invalid_value(
                "concurrency.min",
                self.min,
                "must be at least 1",
            ));
        }
        if self.starting == 0 {
            return Err(ConfigurationError::invalid_value(
                "concurrency.starting",
                self.starting,
                "must be at least 1",
            ));
        }
        if !self.fixed_rate && self.starting < self.min {
            return Err(ConfigurationError::invalid_value(
                "concurrency.starting",
                self.starting,
                format!("must not be below concurrency.min ({})", self.min),
            ));
        }
        // The bound only limits upscaling, which fixed-rate mode never does
        if let (false, Some(max)) = (self.fixed_rate, self.max) {
            if max < self.starting {
                return Err(ConfigurationError::invalid_value(
                    "concurrency.max",
                    max,
                    format!(
                        "must not be below concurrency.starting ({}); raise concurrency.max explicitly (default {}) or set it to null for no bound",
                        self.starting, DEFAULT_MAX_CONCURRENCY
                    ),
                ));
            }
        }
        if self.window_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "concurrency.window_ms",
                self.window_ms,
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Top-level worker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Worker name used in logs and metric labels
    pub name: String,
    pub concurrency: ConcurrencySettings,
    /// Forward failed messages to the error sink when one is configured
    pub write_to_error_sink: bool,
    /// Upper bound on the drain join during shutdown
    pub shutdown_timeout_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            name: "pipe-worker".to_string(),
            concurrency: ConcurrencySettings::default(),
            write_to_error_sink: true,
            shutdown_timeout_ms: 30_000,
        }
    }
}

impl WorkerSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_concurrency(mut self, concurrency: ConcurrencySettings) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_error_forwarding(mut self, enabled: bool) -> Self {
        self.write_to_error_sink = enabled;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigurationError::missing_field("name"));
        }
        self.concurrency.validate()
    }
}
