// src/config.rs
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::cron::CronParser;
use crate::retry::RetryPolicy;
use crate::utils::constants::{
    BASE_RETRY_DELAY_SECS, BROADCAST_QUEUE, FAILS_DIR, MAX_RETRIES, RELAY_QUEUE, RELAY_SCHEDULE,
    SUCCESS_DIR,
};

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct QueueConfig {
    pub name: String,
    pub concurrency: usize,
    #[serde(default)]
    pub priority: usize,
}

impl QueueConfig {
    pub fn new(name: impl Into<String>, concurrency: usize, priority: usize) -> Self {
        Self {
            name: name.into(),
            concurrency,
            priority,
        }
    }

    pub fn from_configs(configs: Vec<(&str, usize, usize)>) -> Vec<Self> {
        configs
            .into_iter()
            .map(|(name, concurrency, priority)| Self::new(name, concurrency, priority))
            .collect()
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay_secs: BASE_RETRY_DELAY_SECS,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_secs(self.base_delay_secs))
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub fails_dir: PathBuf,
    pub success_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            fails_dir: PathBuf::from(FAILS_DIR),
            success_dir: PathBuf::from(SUCCESS_DIR),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// Six-field cron expression, fixed periods only.
    pub schedule: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            schedule: RELAY_SCHEDULE.to_string(),
        }
    }
}

/// Knobs of the simulated transmitter used when no real transport is wired.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub latency_ms: u64,
    pub success_ratio: f64,
    /// Chance that a broadcast attempt is rejected as if the recipient were blocked.
    pub block_ratio: f64,
    pub blocked: Vec<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            latency_ms: 2000,
            success_ratio: 0.5,
            block_ratio: 0.5,
            blocked: Vec::new(),
        }
    }
}

impl SimulationConfig {
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub queues: Vec<QueueConfig>,
    pub redis_url: Option<String>,
    pub retry: RetryConfig,
    pub storage: StorageConfig,
    pub relay: RelayConfig,
    pub simulation: SimulationConfig,
    pub poll_interval_ms: u64,
    pub promote_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queues: QueueConfig::from_configs(vec![(BROADCAST_QUEUE, 4, 1), (RELAY_QUEUE, 4, 2)]),
            redis_url: None,
            retry: RetryConfig::default(),
            storage: StorageConfig::default(),
            relay: RelayConfig::default(),
            simulation: SimulationConfig::default(),
            poll_interval_ms: 500,
            promote_interval_ms: 1000,
        }
    }
}

impl Config {
    /// Reads a TOML file. Missing keys fall back to their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// `REDIS_URL` from the environment wins over the file.
    pub fn redis_url(&self) -> Option<String> {
        std::env::var("REDIS_URL")
            .ok()
            .filter(|url| !url.is_empty())
            .or_else(|| self.redis_url.clone())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn promote_interval(&self) -> Duration {
        Duration::from_millis(self.promote_interval_ms)
    }

    pub fn relay_period(&self) -> Result<Duration> {
        CronParser::interval(&self.relay.schedule)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, ratio) in [
            ("simulation.success_ratio", self.simulation.success_ratio),
            ("simulation.block_ratio", self.simulation.block_ratio),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                bail!("{name} must be between 0 and 1, got {ratio}");
            }
        }
        if let Some(queue) = self.queues.iter().find(|q| q.concurrency == 0) {
            bail!("queue {:?} has zero concurrency", queue.name);
        }
        if self.poll_interval_ms == 0 || self.promote_interval_ms == 0 {
            bail!("poll and promote intervals must be non-zero");
        }
        self.relay_period()?;
        Ok(())
    }
}
