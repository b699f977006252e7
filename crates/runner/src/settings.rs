//! Layered runner settings: defaults, optional file, `JOBPOOL_*` environment.
//!
//! CLI flags are applied on top by `main`.

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use jobpool_core::domain::queue::{
    DEFAULT_INPUT_CAPACITY, DEFAULT_OUTPUT_CAPACITY, DEFAULT_WORKER_COUNT,
};
use jobpool_core::PoolConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "JOBPOOL";
const DEFAULT_JOBS: u32 = 5;
const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub worker_count: usize,
    pub input_capacity: usize,
    pub output_capacity: usize,
    /// Jobs submitted by the session (values `1..=jobs`)
    pub jobs: u32,
    pub drain_timeout_ms: u64,
    pub log_format: String,
    pub log_dir: Option<PathBuf>,
}

impl Settings {
    /// Load settings from defaults, an optional file, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::builder(path)?
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    fn builder(path: Option<&Path>) -> Result<ConfigBuilder<DefaultState>> {
        let mut builder = Config::builder()
            .set_default("worker_count", DEFAULT_WORKER_COUNT as u64)?
            .set_default("input_capacity", DEFAULT_INPUT_CAPACITY as u64)?
            .set_default("output_capacity", DEFAULT_OUTPUT_CAPACITY as u64)?
            .set_default("jobs", u64::from(DEFAULT_JOBS))?
            .set_default("drain_timeout_ms", DEFAULT_DRAIN_TIMEOUT_MS)?
            .set_default("log_format", "pretty")?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        Ok(builder)
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(self.worker_count, self.input_capacity, self.output_capacity)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}
