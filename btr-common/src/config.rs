//! Configuration loading and resolution
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `BTR_CONFIG` environment variable
//! 3. User config file (`~/.config/buildtrace/config.toml`)
//! 4. System config file (`/etc/buildtrace/config.toml`)
//! 5. Compiled defaults (fallback)
//!
//! A missing file is not fatal: a warning is logged and defaults are used.
//! Individual settings can then be overridden through `BTR_BUCKET`,
//! `BTR_STORAGE_ROOT`, `BTR_BIND` and `BTR_LOG_LEVEL`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{Error, Result};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "BTR_CONFIG";

/// Failed-job handling toward the queue transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Report failed jobs as delivered so the transport does not redeliver
    #[default]
    Acknowledge,
    /// Reject failed jobs so the transport redelivers (and eventually dead-letters)
    Redeliver,
}

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub diff: DiffConfig,
    pub metrics: MetricsConfig,
    pub anomaly: AnomalyConfig,
    pub worker: WorkerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, e.g. "127.0.0.1:5740"
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5740".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Bucket receiving `results/{job_id}.json`, with or without scheme
    pub bucket: String,
    /// Local directory backing the filesystem blob store
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: "gs://buildtrace".to_string(),
            root: default_storage_root(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// Exclusive center distance for "near" descriptions of added objects
    pub nearby_threshold: f64,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self { nearby_threshold: 5.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Number of recent durations kept for percentile estimation
    pub duration_window: usize,
    /// Maximum retained job records; 0 keeps every record
    pub max_job_records: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            duration_window: 1000,
            max_job_records: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Alert when failed/total exceeds this ratio
    pub failure_rate_threshold: f64,
    /// Alert when running/total exceeds this ratio
    pub stalled_threshold: f64,
    /// Alert when the last job's additions exceed this multiple of the average
    pub spike_multiplier: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.10,
            stalled_threshold: 0.20,
            spike_multiplier: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub failure_policy: FailurePolicy,
    /// In-process queue capacity (messages)
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::Acknowledge,
            queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing level when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Check thresholds and sizes
    pub fn validate(&self) -> Result<()> {
        check_non_negative("diff.nearby_threshold", self.diff.nearby_threshold)?;
        check_non_negative("anomaly.failure_rate_threshold", self.anomaly.failure_rate_threshold)?;
        check_non_negative("anomaly.stalled_threshold", self.anomaly.stalled_threshold)?;
        check_non_negative("anomaly.spike_multiplier", self.anomaly.spike_multiplier)?;

        if self.metrics.duration_window == 0 {
            return Err(Error::Config("metrics.duration_window must be at least 1".to_string()));
        }
        if self.worker.queue_capacity == 0 {
            return Err(Error::Config("worker.queue_capacity must be at least 1".to_string()));
        }
        if self.storage.bucket.trim().is_empty() {
            return Err(Error::Config("storage.bucket must not be empty".to_string()));
        }
        Ok(())
    }

    /// Apply `BTR_*` environment overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(bucket) = std::env::var("BTR_BUCKET") {
            self.storage.bucket = bucket;
        }
        if let Ok(root) = std::env::var("BTR_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(root);
        }
        if let Ok(bind) = std::env::var("BTR_BIND") {
            self.server.bind = bind;
        }
        if let Ok(level) = std::env::var("BTR_LOG_LEVEL") {
            self.logging.level = level;
        }
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::Config(format!(
            "{} must be a finite, non-negative number (got {})",
            name, value
        )));
    }
    Ok(())
}

/// Parse a TOML config file
pub fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Write a TOML config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

/// Locate the config file following the priority order
///
/// Returns `None` when no candidate exists.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    // Priority 3: User config file
    if let Some(user_config) = dirs::config_dir().map(|d| d.join("buildtrace").join("config.toml")) {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    // Priority 4: System config file
    let system_config = PathBuf::from("/etc/buildtrace/config.toml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Load configuration with graceful degradation
///
/// A named file that does not exist logs a warning and falls back to
/// defaults; a file that exists but cannot be parsed is an error. Environment
/// overrides are applied last and the result is validated.
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let mut config = match resolve_config_path(cli_arg) {
        Some(path) if path.exists() => {
            info!("Loading configuration from {}", path.display());
            read_toml_config(&path)?
        }
        Some(path) => {
            warn!("Config file {} not found, using defaults", path.display());
            TomlConfig::default()
        }
        None => {
            info!("No config file found, using compiled defaults");
            TomlConfig::default()
        }
    };

    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

/// OS-dependent default blob storage root
fn default_storage_root() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("buildtrace").join("blobs"))
        .unwrap_or_else(|| PathBuf::from("./buildtrace_data/blobs"))
}
