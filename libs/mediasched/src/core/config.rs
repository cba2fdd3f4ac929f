// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Scheduler configuration, loadable from `mediasched.yaml`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{Result, SchedulerError};

/// Worker threads are never fewer than this; worker 0 is reserved for
/// dedicated work and at least one more thread must serve everything else.
pub const MIN_WORKER_THREADS: usize = 2;

/// Thread masks are 64 bits wide.
pub const MAX_THREADS_PER_TASK: usize = 64;

fn default_max_tasks() -> usize {
    1024
}

fn default_worker_wait_timeout_ms() -> u64 {
    1000
}

fn default_hw_event_poll_interval_ms() -> u64 {
    1000
}

fn default_busy_retry_interval_ms() -> u64 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of worker threads. `0` uses the available parallelism.
    #[serde(default)]
    pub worker_threads: usize,

    /// Task pool size. Submissions beyond it fail with `PoolExhausted`.
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,

    /// Upper bound on how long an idle worker sleeps before re-checking.
    #[serde(default = "default_worker_wait_timeout_ms")]
    pub worker_wait_timeout_ms: u64,

    /// How long the hardware listener waits for one event.
    #[serde(default = "default_hw_event_poll_interval_ms")]
    pub hw_event_poll_interval_ms: u64,

    /// How long a task that reported `Busy` is held back when no hardware
    /// event arrives.
    #[serde(default = "default_busy_retry_interval_ms")]
    pub busy_retry_interval_ms: u64,

    /// Start the hardware listener together with the worker pool.
    #[serde(default)]
    pub start_hw_listener: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            max_tasks: default_max_tasks(),
            worker_wait_timeout_ms: default_worker_wait_timeout_ms(),
            hw_event_poll_interval_ms: default_hw_event_poll_interval_ms(),
            busy_retry_interval_ms: default_busy_retry_interval_ms(),
            start_hw_listener: false,
        }
    }
}

impl SchedulerConfig {
    /// Configuration file name.
    pub const FILE_NAME: &'static str = "mediasched.yaml";

    pub const ENV_WORKER_THREADS: &'static str = "MEDIASCHED_WORKER_THREADS";
    pub const ENV_MAX_TASKS: &'static str = "MEDIASCHED_MAX_TASKS";
    pub const ENV_HW_LISTENER: &'static str = "MEDIASCHED_HW_LISTENER";

    /// Load configuration from a YAML file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SchedulerError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            SchedulerError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        tracing::info!("Loaded scheduler config from {}", path.display());
        Ok(config)
    }

    /// Load `mediasched.yaml` from a directory, returning defaults if it is
    /// missing or unparseable.
    pub fn load_or_default(dir: &Path) -> Self {
        let path = dir.join(Self::FILE_NAME);
        if !path.exists() {
            tracing::debug!("No {} found in {}, using defaults", Self::FILE_NAME, dir.display());
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Apply `MEDIASCHED_*` environment overrides.
    pub fn apply_env_overrides(mut self) -> Result<Self> {
        if let Some(threads) = env_parse::<usize>(Self::ENV_WORKER_THREADS)? {
            self.worker_threads = threads;
        }
        if let Some(max_tasks) = env_parse::<usize>(Self::ENV_MAX_TASKS)? {
            self.max_tasks = max_tasks;
        }
        if let Some(listen) = env_parse::<bool>(Self::ENV_HW_LISTENER)? {
            self.start_hw_listener = listen;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_threads != 0 && self.worker_threads < MIN_WORKER_THREADS {
            return Err(SchedulerError::Configuration(format!(
                "worker_threads must be 0 (auto) or at least {}, got {}",
                MIN_WORKER_THREADS, self.worker_threads
            )));
        }
        if self.max_tasks == 0 {
            return Err(SchedulerError::Configuration(
                "max_tasks must be at least 1".into(),
            ));
        }
        if self.worker_wait_timeout_ms == 0 || self.hw_event_poll_interval_ms == 0 {
            return Err(SchedulerError::Configuration(
                "wait timeouts must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Worker count with `0` resolved against the host.
    pub fn resolved_worker_threads(&self) -> usize {
        let threads = if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(MIN_WORKER_THREADS)
        } else {
            self.worker_threads
        };
        threads.clamp(MIN_WORKER_THREADS, MAX_THREADS_PER_TASK)
    }

    pub fn worker_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_wait_timeout_ms)
    }

    pub fn hw_event_poll_interval(&self) -> Duration {
        Duration::from_millis(self.hw_event_poll_interval_ms)
    }

    pub fn busy_retry_interval(&self) -> Duration {
        Duration::from_millis(self.busy_retry_interval_ms)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            SchedulerError::Configuration(format!("{}={:?}: {}", name, raw, e))
        }),
        Err(_) => Ok(None),
    }
}
