//! Run configuration.
//!
//! A `RunConfig` is everything a client fixes before `run()`: event count,
//! worker count, global seed, logging, and the output directory for the run
//! summary. It loads from YAML; CLI flags override individual fields.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::ConfigurationError;

/// Immutable configuration for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Explicit number of events to process. When absent the count comes
    /// from the pipeline's bounded readers.
    #[serde(default)]
    pub events: Option<u64>,

    /// Worker count: a positive number, or -1 for hardware concurrency.
    #[serde(default = "default_threads")]
    pub threads: i64,

    /// Global random seed; every per-event stream derives from it.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Tracing filter directive (e.g. "info", "conductor=debug").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Where the run summary JSON is written. Nothing is written when unset.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Diagnostic floating-point-exception tracking. Accepted and logged;
    /// never changes results.
    #[serde(default)]
    pub track_fpes: bool,

    /// Ordered mode: events are the contiguous range [0, N). Must be
    /// disabled to admit streaming readers.
    #[serde(default = "default_ordered")]
    pub ordered: bool,
}

fn default_threads() -> i64 {
    1
}
fn default_seed() -> u64 {
    42
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_ordered() -> bool {
    true
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            events: None,
            threads: default_threads(),
            seed: default_seed(),
            log_level: default_log_level(),
            output_dir: None,
            track_fpes: false,
            ordered: default_ordered(),
        }
    }
}

impl RunConfig {
    /// Load a configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse a configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse config YAML")
    }

    /// Resolve `threads` into a concrete worker count.
    ///
    /// -1 maps to the machine's available parallelism; anything else
    /// non-positive is a configuration error.
    pub fn resolved_workers(&self) -> Result<usize, ConfigurationError> {
        match self.threads {
            -1 => Ok(std::thread::available_parallelism()
                .map(usize::from)
                .unwrap_or(1)),
            n if n >= 1 => Ok(n as usize),
            n => Err(ConfigurationError::InvalidThreadCount { threads: n }),
        }
    }
}
