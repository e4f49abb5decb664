// serptrace-runner/src/config.rs
// ============================================================================
// Module: Runner Configuration
// Description: TOML + environment configuration loading and validation.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file (default `serptrace.toml`,
//! overridable via the `SERPTRACE_CONFIG` environment variable), then a
//! small set of scheduler fields may be overridden individually from their
//! own environment variables, and finally validated. Out-of-range values
//! fail the load rather than being silently clamped.

use std::env;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_CONFIG_NAME: &str = "serptrace.toml";
const CONFIG_ENV_VAR: &str = "SERPTRACE_CONFIG";

const MIN_MAX_RETRIES: u32 = 0;
const MAX_MAX_RETRIES: u32 = 10;
const MIN_RETRY_DELAY_MS: u64 = 1000;
const MAX_RETRY_DELAY_MS: u64 = 600_000;
const MIN_AUDIT_SAMPLE_PERCENT: u8 = 1;
const MAX_AUDIT_SAMPLE_PERCENT: u8 = 100;

/// Top-level runner configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    /// Cron expression driving the scheduler (default `"0 * * * *"`).
    #[serde(default = "default_cron_expression")]
    pub cron_expression: String,
    /// IANA timezone name the cron expression is evaluated in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Trigger a run immediately when the scheduler starts.
    #[serde(default = "default_run_on_start")]
    pub run_on_start: bool,
    /// Maximum retry attempts per stage beyond the first (0..=10).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed delay between stage retry attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Directory the collector writes JSON result files into.
    #[serde(default = "default_collector_output_dir")]
    pub collector_output_dir: String,
    /// Percentage of annotated results drawn into the manual audit sample.
    #[serde(default = "default_manual_audit_sample_percent")]
    pub manual_audit_sample_percent: u8,
    /// Persistent storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Dataset export configuration.
    #[serde(default)]
    pub export: ExportConfig,
    /// Transparency report configuration.
    #[serde(default)]
    pub report: ReportConfig,
    /// Argv for the external collector command, absent selects a no-op port.
    #[serde(default)]
    pub collector_command: Option<Vec<String>>,
    /// Argv for the external annotation command, absent selects a no-op port.
    #[serde(default)]
    pub annotation_command: Option<Vec<String>>,
    /// Argv for the external metrics command, absent selects a no-op port.
    #[serde(default)]
    pub metrics_command: Option<Vec<String>>,
}

/// Persistent storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// `SQLite` database file path.
    #[serde(default = "default_storage_path")]
    pub path: String,
    /// Busy timeout applied to the `SQLite` connection, in milliseconds.
    #[serde(default = "default_storage_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { path: default_storage_path(), busy_timeout_ms: default_storage_busy_timeout_ms() }
    }
}

/// Dataset export configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// Directory exported Parquet files are written under.
    #[serde(default = "default_export_output_dir")]
    pub output_dir: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { output_dir: default_export_output_dir() }
    }
}

/// Transparency report configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    /// Directory the Markdown transparency report is written under.
    #[serde(default = "default_report_output_dir")]
    pub output_dir: String,
    /// Optional override for the benchmark query metadata file path.
    #[serde(default)]
    pub benchmark_queries_path: Option<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { output_dir: default_report_output_dir(), benchmark_queries_path: None }
    }
}

fn default_cron_expression() -> String {
    "0 * * * *".to_owned()
}
fn default_timezone() -> String {
    "UTC".to_owned()
}
const fn default_run_on_start() -> bool {
    true
}
const fn default_max_retries() -> u32 {
    3
}
const fn default_retry_delay_ms() -> u64 {
    10_000
}
fn default_collector_output_dir() -> String {
    "data/serp".to_owned()
}
const fn default_manual_audit_sample_percent() -> u8 {
    5
}
fn default_storage_path() -> String {
    "data/serptrace.sqlite3".to_owned()
}
const fn default_storage_busy_timeout_ms() -> u64 {
    5000
}
fn default_export_output_dir() -> String {
    "exports".to_owned()
}
fn default_report_output_dir() -> String {
    "reports".to_owned()
}

impl RunnerConfig {
    /// Loads configuration from disk, applies environment overrides, and
    /// validates the result.
    ///
    /// `path` takes precedence; otherwise the `SERPTRACE_CONFIG` environment
    /// variable is consulted, falling back to `serptrace.toml` in the
    /// current directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed, or
    /// fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path);
        let content = std::fs::read_to_string(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        let mut config: Self = toml::from_str(&content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies scheduler environment variable overrides, when present.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = env::var("SCHEDULER_CRON_EXPRESSION") {
            self.cron_expression = value;
        }
        if let Ok(value) = env::var("SCHEDULER_TIMEZONE") {
            self.timezone = value;
        }
        if let Ok(value) = env::var("SCHEDULER_RUN_ON_START") {
            self.run_on_start = parse_env_bool("SCHEDULER_RUN_ON_START", &value)?;
        }
        if let Ok(value) = env::var("SCHEDULER_MAX_RETRIES") {
            self.max_retries = value.parse().map_err(|_unused| ConfigError::InvalidEnvOverride {
                field: "SCHEDULER_MAX_RETRIES",
                value: value.clone(),
            })?;
        }
        if let Ok(value) = env::var("SCHEDULER_RETRY_DELAY_MS") {
            self.retry_delay_ms = value.parse().map_err(|_unused| ConfigError::InvalidEnvOverride {
                field: "SCHEDULER_RETRY_DELAY_MS",
                value: value.clone(),
            })?;
        }
        if let Ok(value) = env::var("COLLECTOR_OUTPUT_DIR") {
            self.collector_output_dir = value;
        }
        Ok(())
    }

    /// Validates range constraints, failing closed on out-of-range values.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries < MIN_MAX_RETRIES || self.max_retries > MAX_MAX_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "max_retries must be between {MIN_MAX_RETRIES} and {MAX_MAX_RETRIES}"
            )));
        }
        if self.retry_delay_ms < MIN_RETRY_DELAY_MS || self.retry_delay_ms > MAX_RETRY_DELAY_MS {
            return Err(ConfigError::Invalid(format!(
                "retry_delay_ms must be between {MIN_RETRY_DELAY_MS} and {MAX_RETRY_DELAY_MS}"
            )));
        }
        if self.manual_audit_sample_percent < MIN_AUDIT_SAMPLE_PERCENT
            || self.manual_audit_sample_percent > MAX_AUDIT_SAMPLE_PERCENT
        {
            return Err(ConfigError::Invalid(format!(
                "manual_audit_sample_percent must be between {MIN_AUDIT_SAMPLE_PERCENT} and \
                 {MAX_AUDIT_SAMPLE_PERCENT}"
            )));
        }
        if self.cron_expression.trim().is_empty() {
            return Err(ConfigError::Invalid("cron_expression must be non-empty".to_owned()));
        }
        if self.timezone.trim().is_empty() {
            return Err(ConfigError::Invalid("timezone must be non-empty".to_owned()));
        }
        Ok(())
    }
}

fn resolve_path(path: Option<&Path>) -> PathBuf {
    if let Some(path) = path {
        return path.to_path_buf();
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        return PathBuf::from(env_path);
    }
    PathBuf::from(DEFAULT_CONFIG_NAME)
}

fn parse_env_bool(field: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride { field, value: value.to_owned() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("serptrace.toml");
        std::fs::write(&path, contents).expect("write config");
        path
    }

    #[test]
    fn defaults_apply_for_empty_file() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = write_config(&dir, "");
        let config = RunnerConfig::load(Some(&path)).expect("load config");
        assert_eq!(config.cron_expression, "0 * * * *");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.manual_audit_sample_percent, 5);
        assert!(config.collector_command.is_none());
    }

    #[test]
    fn rejects_out_of_range_max_retries() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = write_config(&dir, "max_retries = 99\n");
        let result = RunnerConfig::load(Some(&path));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_missing_file() {
        let result = RunnerConfig::load(Some(Path::new("/nonexistent/serptrace.toml")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
