//! Configuration file discovery and TOML loading
//!
//! Bootstrap configuration follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config file in the platform config directory
//! 4. Built-in defaults (no file at all)
//!
//! A missing file is never fatal: callers log a warning and continue with
//! defaults. A file that exists but fails to parse is an error.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "STANCE_CONFIG";

/// Logging configuration shared by all binaries
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level or full filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Where a resolved config path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine,
    Environment,
    PlatformDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CommandLine => write!(f, "command line"),
            ConfigSource::Environment => write!(f, "environment"),
            ConfigSource::PlatformDefault => write!(f, "platform config dir"),
        }
    }
}

/// Resolves which config file (if any) a module should read
pub struct ConfigFileResolver {
    module_name: String,
    env_var: String,
}

impl ConfigFileResolver {
    /// Create a resolver for `module_name` using the default environment variable
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            env_var: CONFIG_ENV_VAR.to_string(),
        }
    }

    /// Override the environment variable consulted at priority 2
    pub fn with_env_var(mut self, env_var: &str) -> Self {
        self.env_var = env_var.to_string();
        self
    }

    /// Resolve the config path
    ///
    /// Returns `None` when no explicit path was given and the platform
    /// default file does not exist.
    pub fn resolve(&self, cli_arg: Option<&Path>) -> Option<(PathBuf, ConfigSource)> {
        if let Some(path) = cli_arg {
            return Some((path.to_path_buf(), ConfigSource::CommandLine));
        }

        if let Ok(path) = std::env::var(&self.env_var) {
            if !path.is_empty() {
                return Some((PathBuf::from(path), ConfigSource::Environment));
            }
        }

        let default_path = self.platform_default_path()?;
        if default_path.exists() {
            Some((default_path, ConfigSource::PlatformDefault))
        } else {
            debug!(
                "No config file for {} at {}",
                self.module_name,
                default_path.display()
            );
            None
        }
    }

    /// Platform config file location: `<config_dir>/stance/<module>.toml`
    pub fn platform_default_path(&self) -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("stance").join(format!("{}.toml", self.module_name)))
    }
}

/// Parse a TOML file into `T`
pub fn load_toml_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let parsed = toml::from_str(&content)?;
    info!("Loaded configuration from {}", path.display());
    Ok(parsed)
}

/// Load `T` from the resolved config file, or fall back to `T::default()`
///
/// An explicitly requested file (command line or environment) that does
/// not exist is a warning, not an error: the module still starts.
pub fn load_or_default<T: DeserializeOwned + Default>(
    resolver: &ConfigFileResolver,
    cli_arg: Option<&Path>,
) -> Result<T> {
    match resolver.resolve(cli_arg) {
        Some((path, source)) if path.exists() => {
            debug!("Config file {} (from {})", path.display(), source);
            load_toml_file(&path)
        }
        Some((path, source)) => {
            warn!(
                "Config file {} (from {}) not found, using built-in defaults",
                path.display(),
                source
            );
            Ok(T::default())
        }
        None => {
            info!("No config file found, using built-in defaults");
            Ok(T::default())
        }
    }
}
