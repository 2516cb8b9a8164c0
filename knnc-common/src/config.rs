//! Configuration loading and resolution
//!
//! The configuration file is resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. `KNNC_CONFIG` environment variable
//! 3. `<config dir>/knnc/config.toml`
//! 4. Compiled defaults (fallback)
//!
//! A missing file never aborts startup; it degrades to the compiled defaults
//! (see [`ConfigSource`]). A file that exists but does not parse is a configuration error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "KNNC_CONFIG";

/// Number of reference matches retained per query and feature
pub const DEFAULT_MAX_HITS: usize = 77;

/// Effectively "wait until done": one year
pub const DEFAULT_COMPLETION_TIMEOUT_SECS: u64 = 365 * 24 * 60 * 60;

/// Extra time granted to workers after a stop request
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 60;

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Classification engine settings
    pub classifier: ClassifierConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// Directory receiving exported reports (defaults to the working directory)
    pub output_dir: Option<PathBuf>,
}

/// `[classifier]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Capacity of the per-query best-match set
    pub max_hits: usize,

    /// Worker thread count; `None` derives it from available parallelism
    pub workers: Option<usize>,

    /// Measure name (`classCount`, `weightedByRank`, ...)
    pub measure: Option<String>,

    /// Feature names used when none are given on the command line
    pub features: Vec<String>,

    /// How long to wait for a run to finish before forcing a stop
    pub completion_timeout_secs: u64,

    /// How long to wait after a forced stop before giving up
    pub shutdown_grace_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_hits: DEFAULT_MAX_HITS,
            workers: None,
            measure: None,
            features: Vec::new(),
            completion_timeout_secs: DEFAULT_COMPLETION_TIMEOUT_SECS,
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE_SECS,
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Resolve which configuration file to read, if any
///
/// Returns the first candidate in priority order. The platform default is only
/// returned when it exists; explicit paths are returned as given so that a
/// missing explicit file can be reported.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    default_config_path().filter(|path| path.exists())
}

/// `<config dir>/knnc/config.toml` for the current platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("knnc").join("config.toml"))
}

/// Read and parse a TOML configuration file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    Ok(config)
}

/// Where the loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// No file was named and the platform default does not exist
    Defaults,

    /// A file was named but does not exist; compiled defaults were used
    Missing(PathBuf),

    /// Parsed from this file
    File(PathBuf),
}

impl ConfigSource {
    /// Log the outcome of loading
    ///
    /// Separate from loading because the log level itself comes from the file.
    pub fn log(&self) {
        match self {
            ConfigSource::Defaults => info!("No configuration file found, using compiled defaults"),
            ConfigSource::Missing(path) => warn!(
                "Configuration file {} not found, using compiled defaults",
                path.display()
            ),
            ConfigSource::File(path) => info!("Configuration loaded from {}", path.display()),
        }
    }
}

/// Load configuration with graceful degradation
///
/// Missing files fall back to compiled defaults; malformed files are errors.
pub fn load_or_default(cli_arg: Option<&Path>) -> Result<(TomlConfig, ConfigSource)> {
    let Some(path) = resolve_config_path(cli_arg) else {
        return Ok((TomlConfig::default(), ConfigSource::Defaults));
    };

    if !path.exists() {
        return Ok((TomlConfig::default(), ConfigSource::Missing(path)));
    }

    let config = load_toml_config(&path)?;
    Ok((config, ConfigSource::File(path)))
}
