//! Configuration loading and resolution
//!
//! Settings come from four sources, highest priority first:
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Compiled defaults
//!
//! The binary merges (1) and (2) through clap's `env` support and applies them
//! on top of the [`TomlConfig`] resolved here.
//!
//! A missing configuration file is never fatal: the resolver logs a warning and
//! falls back to compiled defaults. A file named explicitly (CLI or
//! `TDACMP_CONFIG`) must exist and parse.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "TDACMP_CONFIG";

/// Per-comparison solver budget (30 minutes)
pub const DEFAULT_TIMEOUT_SECS: u64 = 1800;

/// Backend whose diagrams every sibling is compared against
pub const DEFAULT_REFERENCE_BACKEND: &str = "Dipha";

/// Default external solver executable
pub const DEFAULT_SOLVER_PROGRAM: &str = "diagram-distance";

/// Distance algorithm requested from the external solver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SolverMethod {
    /// Approximate iterative auction algorithm
    #[default]
    Auction,
    /// Exact bottleneck matching
    Bottleneck,
}

impl SolverMethod {
    /// Mode flag passed to the solver process
    pub fn as_str(&self) -> &'static str {
        match self {
            SolverMethod::Auction => "auction",
            SolverMethod::Bottleneck => "bottleneck",
        }
    }
}

impl fmt::Display for SolverMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SolverMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auction" => Ok(SolverMethod::Auction),
            "bottleneck" => Ok(SolverMethod::Bottleneck),
            other => Err(format!(
                "unknown solver method '{}' (expected 'auction' or 'bottleneck')",
                other
            )),
        }
    }
}

/// Top-level configuration file
///
/// Every section and field is optional; absent values take compiled defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// External solver settings
    #[serde(default)]
    pub solver: SolverConfig,

    /// Batch comparison settings
    #[serde(default)]
    pub batch: BatchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// External solver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Solver executable (looked up in PATH when not absolute)
    #[serde(default = "default_solver_program")]
    pub program: String,

    /// Arguments inserted before the mode flag (e.g. a script path for an interpreter)
    #[serde(default)]
    pub args: Vec<String>,

    /// Distance algorithm
    #[serde(default)]
    pub method: SolverMethod,

    /// Wall-clock budget per comparison, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Relative precision passed to the auction solver
    #[serde(default)]
    pub relative_precision: Option<f64>,

    /// Persistence threshold passed to the bottleneck solver
    #[serde(default)]
    pub persistence_threshold: Option<f64>,

    /// Directory for interchange scratch files (system temp dir if unset)
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            program: default_solver_program(),
            args: Vec::new(),
            method: SolverMethod::default(),
            timeout_secs: default_timeout_secs(),
            relative_precision: None,
            persistence_threshold: None,
            scratch_dir: None,
        }
    }
}

impl SolverConfig {
    /// Per-comparison timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Scratch directory, falling back to the system temp dir
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Batch comparison configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Backend name tagging reference diagrams (file stem suffix)
    #[serde(default = "default_reference_backend")]
    pub reference_backend: String,

    /// Directory receiving JSON reports
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Number of dataset families compared concurrently
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// Drop pairs with infinite death before comparing
    #[serde(default = "default_finite_only")]
    pub finite_only: bool,

    /// Skip comparisons already present in an existing report
    #[serde(default)]
    pub resume: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            reference_backend: default_reference_backend(),
            output_dir: default_output_dir(),
            jobs: default_jobs(),
            finite_only: default_finite_only(),
            resume: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_solver_program() -> String {
    DEFAULT_SOLVER_PROGRAM.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_reference_backend() -> String {
    DEFAULT_REFERENCE_BACKEND.to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_jobs() -> usize {
    1
}

fn default_finite_only() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        let config: TomlConfig = toml::from_str(&content).map_err(|source| Error::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.solver.timeout_secs == 0 {
            return Err(Error::Config("solver.timeout_secs must be positive".to_string()));
        }
        if self.solver.program.trim().is_empty() {
            return Err(Error::Config("solver.program must not be empty".to_string()));
        }
        if let Some(p) = self.solver.relative_precision {
            if !(p > 0.0) {
                return Err(Error::Config(format!(
                    "solver.relative_precision must be positive, got {}",
                    p
                )));
            }
        }
        if let Some(t) = self.solver.persistence_threshold {
            if !(t >= 0.0) {
                return Err(Error::Config(format!(
                    "solver.persistence_threshold must be non-negative, got {}",
                    t
                )));
            }
        }
        if self.batch.jobs == 0 {
            return Err(Error::Config("batch.jobs must be at least 1".to_string()));
        }
        if self.batch.reference_backend.trim().is_empty() {
            return Err(Error::Config("batch.reference_backend must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Where a resolved configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Path given on the command line
    CommandLine(PathBuf),
    /// Path from `TDACMP_CONFIG`
    Environment(PathBuf),
    /// Per-user config file (`<config_dir>/tdacmp/config.toml`)
    UserFile(PathBuf),
    /// No file; compiled defaults
    Defaults,
}

/// Resolves which configuration file to load
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// Create a resolver; `cli_path` is the `--config` argument, if any
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self { cli_path }
    }

    /// Determine the configuration source without reading it
    pub fn source(&self) -> ConfigSource {
        if let Some(path) = &self.cli_path {
            return ConfigSource::CommandLine(path.clone());
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return ConfigSource::Environment(PathBuf::from(path));
            }
        }

        if let Some(path) = default_config_path() {
            if path.exists() {
                return ConfigSource::UserFile(path);
            }
        }

        ConfigSource::Defaults
    }

    /// Load the configuration following the priority order
    pub fn resolve(&self) -> Result<TomlConfig> {
        match self.source() {
            ConfigSource::CommandLine(path) | ConfigSource::Environment(path) => {
                debug!(path = %path.display(), "Loading explicit configuration file");
                TomlConfig::load(&path)
            }
            ConfigSource::UserFile(path) => match TomlConfig::load(&path) {
                Ok(config) => {
                    debug!(path = %path.display(), "Loaded user configuration file");
                    Ok(config)
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Ignoring unusable user configuration file, using defaults"
                    );
                    Ok(TomlConfig::default())
                }
            },
            ConfigSource::Defaults => {
                warn!("No configuration file found, using compiled defaults");
                Ok(TomlConfig::default())
            }
        }
    }
}

/// Per-user configuration file location for the platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tdacmp").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.solver.method, SolverMethod::Auction);
        assert_eq!(config.solver.timeout_secs, 1800);
        assert_eq!(config.batch.reference_backend, "Dipha");
        assert_eq!(config.batch.jobs, 1);
        assert!(config.batch.finite_only);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            [solver]
            method = "bottleneck"
            timeout_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.solver.method, SolverMethod::Bottleneck);
        assert_eq!(config.solver.timeout(), Duration::from_secs(5));
        assert_eq!(config.solver.program, DEFAULT_SOLVER_PROGRAM);
        assert_eq!(config.batch.reference_backend, DEFAULT_REFERENCE_BACKEND);
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("auction".parse::<SolverMethod>(), Ok(SolverMethod::Auction));
        assert_eq!(" Bottleneck ".parse::<SolverMethod>(), Ok(SolverMethod::Bottleneck));
        assert!("lexico".parse::<SolverMethod>().is_err());
        assert_eq!(SolverMethod::Bottleneck.to_string(), "bottleneck");
    }

    #[test]
    fn test_validation_rejects_zero_timeout_and_jobs() {
        let mut config = TomlConfig::default();
        config.solver.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = TomlConfig::default();
        config.batch.jobs = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = TomlConfig::default();
        config.solver.relative_precision = Some(0.0);
        assert!(config.validate().is_err());
    }
}
