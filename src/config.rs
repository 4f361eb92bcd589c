//! Engine configuration.
//!
//! Configuration can come from:
//! - A JSON or YAML file
//! - Environment variables (`WORKFLOWS_*`), which override the file

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::parser::decode;

const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_READ_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_EXECUTION_TIMEOUT_MS: u64 = 60_000;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory scanned by the registry loader
    pub workflows_dir: PathBuf,

    /// Upper bound on jobs running at once in a [`JobPool`](crate::JobPool)
    pub max_concurrent_jobs: usize,

    /// Used when an HTTP task does not set `connectionTimeOut`
    pub default_connection_timeout_ms: u64,

    /// Used when an HTTP task does not set `readTimeOut`
    pub default_read_timeout_ms: u64,

    /// Used when a CLI task does not set `executionTimeOut`
    pub default_execution_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workflows_dir: PathBuf::from("./workflows"),
            max_concurrent_jobs: 16,
            default_connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            default_read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            default_execution_timeout_ms: DEFAULT_EXECUTION_TIMEOUT_MS,
        }
    }
}

impl EngineConfig {
    /// Load configuration: optional file first, then environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Read a JSON or YAML config file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let value = decode(&content)
            .with_context(|| format!("Failed to decode config file: {}", path.display()))?;
        serde_json::from_value(value)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = var("WORKFLOWS_DIR") {
            self.workflows_dir = PathBuf::from(dir);
        }
        if let Some(jobs) = parsed(&var, "WORKFLOWS_MAX_CONCURRENT_JOBS") {
            self.max_concurrent_jobs = jobs;
        }
        if let Some(ms) = parsed(&var, "WORKFLOWS_CONNECTION_TIMEOUT_MS") {
            self.default_connection_timeout_ms = ms;
        }
        if let Some(ms) = parsed(&var, "WORKFLOWS_READ_TIMEOUT_MS") {
            self.default_read_timeout_ms = ms;
        }
        if let Some(ms) = parsed(&var, "WORKFLOWS_EXECUTION_TIMEOUT_MS") {
            self.default_execution_timeout_ms = ms;
        }
    }

    /// A zero timeout means unset and gives the built-in default.
    pub fn connection_timeout(&self) -> Duration {
        millis_or(self.default_connection_timeout_ms, DEFAULT_CONNECTION_TIMEOUT_MS)
    }

    pub fn read_timeout(&self) -> Duration {
        millis_or(self.default_read_timeout_ms, DEFAULT_READ_TIMEOUT_MS)
    }

    pub fn execution_timeout(&self) -> Duration {
        millis_or(self.default_execution_timeout_ms, DEFAULT_EXECUTION_TIMEOUT_MS)
    }
}

fn millis_or(ms: u64, fallback: u64) -> Duration {
    Duration::from_millis(if ms == 0 { fallback } else { ms })
}

fn parsed<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable config override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrent_jobs, 16);
        assert_eq!(config.read_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "workflows_dir: /etc/workflows\nmax_concurrent_jobs: 4").unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.workflows_dir, PathBuf::from("/etc/workflows"));
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.default_execution_timeout_ms, 60_000);
    }

    #[test]
    fn test_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"default_read_timeout_ms": 500}}"#).unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.read_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("WORKFLOWS_DIR", "/srv/workflows"),
            ("WORKFLOWS_MAX_CONCURRENT_JOBS", "not-a-number"),
            ("WORKFLOWS_EXECUTION_TIMEOUT_MS", "1500"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.workflows_dir, PathBuf::from("/srv/workflows"));
        assert_eq!(config.max_concurrent_jobs, 16);
        assert_eq!(config.execution_timeout(), Duration::from_millis(1500));
    }

    #[test]
    fn test_zero_timeouts_fall_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_connection_timeout_ms: 0\ndefault_read_timeout_ms: 0").unwrap();
        let mut config = EngineConfig::from_file(file.path()).unwrap();

        let vars: HashMap<&str, &str> = [("WORKFLOWS_EXECUTION_TIMEOUT_MS", "0")].into_iter().collect();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.default_execution_timeout_ms, 0);
        assert_eq!(config.connection_timeout(), Duration::from_secs(10));
        assert_eq!(config.read_timeout(), Duration::from_secs(30));
        assert_eq!(config.execution_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(EngineConfig::from_file(Path::new("/nonexistent/engine.yaml")).is_err());
    }
}
