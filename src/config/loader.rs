//! Configuration Loader
//!
//! Layers an optional settings file under `PIPEWORKER__*` environment
//! variables using the `config` crate, then validates the result.
//!
//! Nested keys are separated by a double underscore:
//!
//! ```text
//! PIPEWORKER__NAME=orders
//! PIPEWORKER__CONCURRENCY__STARTING=20
//! PIPEWORKER__WRITE_TO_ERROR_SINK=false
//! ```

use std::path::PathBuf;

use config::{Config, Environment, File};
use tracing::debug;

use super::error::ConfigResult;
use super::WorkerSettings;

/// Default environment variable prefix
pub const DEFAULT_ENV_PREFIX: &str = "PIPEWORKER";

/// Builder-style settings loader
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    file: Option<PathBuf>,
    env_prefix: String,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self {
            file: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }

    /// Read this file before applying environment overrides.
    ///
    /// The format is inferred from the extension (`.yaml`, `.toml`, `.json`).
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Load and validate settings
    pub fn load(&self) -> ConfigResult<WorkerSettings> {
        let mut builder = Config::builder();
        if let Some(path) = &self.file {
            debug!(path = %path.display(), "Loading worker settings file");
            builder = builder.add_source(File::from(path.as_path()).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings: WorkerSettings = builder.build()?.try_deserialize()?;
        settings.validate()?;

        debug!(
            worker = %settings.name,
            starting = settings.concurrency.starting,
            min = settings.concurrency.min,
            fixed_rate = settings.concurrency.fixed_rate,
            "Worker settings loaded"
        );
        Ok(settings)
    }
}
