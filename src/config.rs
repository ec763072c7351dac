//! Filter pass configuration.
//!
//! A [`FilterConfig`] is passed explicitly into every engine entry point.
//! It can be loaded from a JSON file and overlaid with environment
//! variables set by whatever launches the engine:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `HPF_KERNEL_SIZE` | `kernel_size` |
//! | `HPF_NUM_THREADS` (falls back to `OMP_NUM_THREADS`) | `threads` |
//! | `HPF_NUM_PROCESSES` | `processes` |
//! | `HPF_WORKER_TIMEOUT_SECS` | `worker_timeout` |

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::Variant;
use crate::error::{FilterError, Result};
use crate::filters::kernel::validate_kernel_size;

pub const ENV_KERNEL_SIZE: &str = "HPF_KERNEL_SIZE";
pub const ENV_NUM_THREADS: &str = "HPF_NUM_THREADS";
pub const ENV_OMP_NUM_THREADS: &str = "OMP_NUM_THREADS";
pub const ENV_NUM_PROCESSES: &str = "HPF_NUM_PROCESSES";
pub const ENV_WORKER_TIMEOUT: &str = "HPF_WORKER_TIMEOUT_SECS";

/// Failures while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value '{value}' for {var}")]
    Env { var: &'static str, value: String },
}

/// Parameters of one filter pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub variant: Variant,
    /// Odd side length in `3..=11`.
    pub kernel_size: usize,
    /// Worker threads for the shared-memory variant.
    pub threads: usize,
    /// Cooperating processes (coordinator included) for the distributed variant.
    pub processes: usize,
    /// Deadline for the whole gather, measured from the first wait. When it
    /// passes, the lowest missing band fails and ranks still running are
    /// abandoned: they finish detached and their replies are dropped. `None`
    /// waits until every worker has replied or exited.
    #[serde(rename = "worker_timeout_secs", with = "opt_secs")]
    pub worker_timeout: Option<Duration>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            variant: Variant::Sequential,
            kernel_size: 3,
            threads: 1,
            processes: 1,
            worker_timeout: None,
        }
    }
}

impl FilterConfig {
    pub fn new(variant: Variant, kernel_size: usize) -> Self {
        Self {
            variant,
            kernel_size,
            ..Default::default()
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_processes(mut self, processes: usize) -> Self {
        self.processes = processes;
        self
    }

    pub fn with_worker_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout = Some(timeout);
        self
    }

    /// Set the concurrency degree of whichever variant is selected.
    pub fn with_workers(self, workers: usize) -> Self {
        match self.variant {
            Variant::Sequential => self,
            Variant::SharedMemory => self.with_threads(workers),
            Variant::Distributed => self.with_processes(workers),
        }
    }

    /// Concurrency degree of the selected variant.
    pub fn workers(&self) -> usize {
        match self.variant {
            Variant::Sequential => 1,
            Variant::SharedMemory => self.threads,
            Variant::Distributed => self.processes,
        }
    }

    /// Check every parameter the selected variant uses.
    pub fn validate(&self) -> Result<()> {
        self.validate_for(self.variant)
    }

    /// Check every parameter `variant` uses, whatever variant is selected.
    /// Engines call this before any computation starts.
    pub fn validate_for(&self, variant: Variant) -> Result<()> {
        validate_kernel_size(self.kernel_size)?;
        match variant {
            Variant::Sequential => {}
            Variant::SharedMemory if self.threads == 0 => {
                return Err(FilterError::invalid("threads", "must be at least 1"));
            }
            Variant::Distributed if self.processes == 0 => {
                return Err(FilterError::invalid("processes", "must be at least 1"));
            }
            _ => {}
        }
        if self.worker_timeout == Some(Duration::ZERO) {
            return Err(FilterError::invalid("worker_timeout", "must be positive"));
        }
        Ok(())
    }

    pub fn from_json_file(path: &Path) -> std::result::Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) -> std::result::Result<(), ConfigError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Overlay values from an arbitrary lookup (the environment in production).
    pub fn apply_vars<F>(&mut self, lookup: F) -> std::result::Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_KERNEL_SIZE) {
            self.kernel_size = parse_var(ENV_KERNEL_SIZE, &v)?;
        }
        if let Some(v) = lookup(ENV_NUM_THREADS) {
            self.threads = parse_var(ENV_NUM_THREADS, &v)?;
        } else if let Some(v) = lookup(ENV_OMP_NUM_THREADS) {
            self.threads = parse_var(ENV_OMP_NUM_THREADS, &v)?;
        }
        if let Some(v) = lookup(ENV_NUM_PROCESSES) {
            self.processes = parse_var(ENV_NUM_PROCESSES, &v)?;
        }
        if let Some(v) = lookup(ENV_WORKER_TIMEOUT) {
            let secs: f64 = parse_var(ENV_WORKER_TIMEOUT, &v)?;
            let timeout = Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::Env {
                var: ENV_WORKER_TIMEOUT,
                value: v.clone(),
            })?;
            self.worker_timeout = Some(timeout);
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, value: &str) -> std::result::Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var,
        value: value.to_string(),
    })
}

mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs: Option<f64> = Option::deserialize(d)?;
        secs.map(|s| Duration::try_from_secs_f64(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_is_valid() {
        let config = FilterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.workers(), 1);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = FilterConfig::new(Variant::SharedMemory, 3).with_threads(0);
        assert!(config.validate().unwrap_err().is_invalid_parameter());

        let config = FilterConfig::new(Variant::Distributed, 3).with_processes(0);
        assert!(config.validate().unwrap_err().is_invalid_parameter());

        // Unused degrees are not checked.
        let config = FilterConfig::new(Variant::Sequential, 3).with_threads(0);
        assert!(config.validate().is_ok());
        assert!(config
            .validate_for(Variant::SharedMemory)
            .unwrap_err()
            .is_invalid_parameter());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = FilterConfig::new(Variant::Distributed, 3)
            .with_processes(2)
            .with_worker_timeout(Duration::ZERO);
        match config.validate() {
            Err(FilterError::InvalidParameter { name, .. }) => assert_eq!(name, "worker_timeout"),
            other => panic!("expected InvalidParameter, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_even_kernel() {
        let config = FilterConfig::new(Variant::Sequential, 4);
        assert!(config.validate().unwrap_err().is_invalid_parameter());
    }

    #[test]
    fn test_with_workers_targets_variant() {
        let shared = FilterConfig::new(Variant::SharedMemory, 3).with_workers(6);
        assert_eq!(shared.threads, 6);
        assert_eq!(shared.workers(), 6);

        let dist = FilterConfig::new(Variant::Distributed, 3).with_workers(3);
        assert_eq!(dist.processes, 3);
        assert_eq!(dist.threads, 1);
    }

    #[test]
    fn test_env_overlay() {
        let mut config = FilterConfig::default();
        config
            .apply_vars(lookup(&[
                ("HPF_KERNEL_SIZE", "7"),
                ("OMP_NUM_THREADS", "4"),
                ("HPF_NUM_PROCESSES", " 3 "),
                ("HPF_WORKER_TIMEOUT_SECS", "2.5"),
            ]))
            .unwrap();

        assert_eq!(config.kernel_size, 7);
        assert_eq!(config.threads, 4);
        assert_eq!(config.processes, 3);
        assert_eq!(config.worker_timeout, Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_hpf_threads_wins_over_omp() {
        let mut config = FilterConfig::default();
        config
            .apply_vars(lookup(&[("HPF_NUM_THREADS", "2"), ("OMP_NUM_THREADS", "8")]))
            .unwrap();
        assert_eq!(config.threads, 2);
    }

    #[test]
    fn test_env_rejects_garbage() {
        let mut config = FilterConfig::default();
        let err = config
            .apply_vars(lookup(&[("HPF_NUM_THREADS", "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "HPF_NUM_THREADS", .. }));
    }

    #[test]
    fn test_json_file_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"variant": "distributed", "kernel_size": 5, "processes": 4, "worker_timeout_secs": 1.0}}"#
        )
        .unwrap();

        let config = FilterConfig::from_json_file(file.path()).unwrap();

        assert_eq!(config.variant, Variant::Distributed);
        assert_eq!(config.kernel_size, 5);
        assert_eq!(config.processes, 4);
        assert_eq!(config.threads, 1);
        assert_eq!(config.worker_timeout, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_json_file_errors() {
        let missing = FilterConfig::from_json_file(Path::new("/nonexistent/hpf.json"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let bad = FilterConfig::from_json_file(file.path());
        assert!(matches!(bad, Err(ConfigError::Parse { .. })));
    }
}
