//! Pool configuration.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::PoolError;

/// Queue backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    /// Strict FIFO.
    #[default]
    Fifo,
    /// Priority first, FIFO within a priority.
    Priority,
}

/// Queue size limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxQueue {
    /// No limit.
    #[default]
    Unbounded,
    /// At most this many queued tasks. `0` disables queueing.
    Limit(usize),
    /// `max_threads` squared.
    Auto,
}

/// Options of a [`NovaPool`](crate::core::NovaPool).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Default worker entry for tasks that do not name one.
    pub filename: Option<String>,
    /// Lower bound on workers kept by the pool manager.
    pub min_threads: usize,
    /// Upper bound on workers kept by the pool manager.
    pub max_threads: usize,
    /// Idle time after which a worker without work is torn down, in ms.
    /// `0` disables idle teardown.
    pub idle_timeout_ms: u64,
    /// Queue size limit.
    pub max_queue: MaxQueue,
    /// Usage ceiling: concurrent tasks one worker accepts.
    pub concurrent_tasks_per_worker: usize,
    /// Teardown timeout in ms; `None` waits indefinitely.
    pub terminate_timeout_ms: Option<u64>,
    /// Queue backend.
    pub queue: QueueKind,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let cpus = num_cpus::get().max(1);
        Self {
            filename: None,
            min_threads: (cpus / 2).max(1),
            max_threads: cpus,
            idle_timeout_ms: 0,
            max_queue: MaxQueue::Unbounded,
            concurrent_tasks_per_worker: 1,
            terminate_timeout_ms: None,
            queue: QueueKind::Fifo,
        }
    }
}

impl PoolConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default worker entry.
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Set the thread bounds.
    #[must_use]
    pub const fn with_threads(mut self, min_threads: usize, max_threads: usize) -> Self {
        self.min_threads = min_threads;
        self.max_threads = max_threads;
        self
    }

    /// Set the idle timeout.
    #[must_use]
    pub const fn with_idle_timeout_ms(mut self, idle_timeout_ms: u64) -> Self {
        self.idle_timeout_ms = idle_timeout_ms;
        self
    }

    /// Set the queue limit.
    #[must_use]
    pub const fn with_max_queue(mut self, max_queue: MaxQueue) -> Self {
        self.max_queue = max_queue;
        self
    }

    /// Set the usage ceiling.
    #[must_use]
    pub const fn with_concurrent_tasks_per_worker(mut self, ceiling: usize) -> Self {
        self.concurrent_tasks_per_worker = ceiling;
        self
    }

    /// Set the teardown timeout.
    #[must_use]
    pub const fn with_terminate_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.terminate_timeout_ms = Some(timeout_ms);
        self
    }

    /// Select the queue backend.
    #[must_use]
    pub const fn with_queue(mut self, queue: QueueKind) -> Self {
        self.queue = queue;
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] describing the first bad value.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_threads == 0 {
            return Err(PoolError::InvalidConfig("max_threads must be greater than 0".into()));
        }
        if self.min_threads > self.max_threads {
            return Err(PoolError::InvalidConfig(format!(
                "min_threads ({}) must not exceed max_threads ({})",
                self.min_threads, self.max_threads
            )));
        }
        if self.concurrent_tasks_per_worker == 0 {
            return Err(PoolError::InvalidConfig(
                "concurrent_tasks_per_worker must be greater than 0".into(),
            ));
        }
        if self.filename.as_deref().is_some_and(str::is_empty) {
            return Err(PoolError::FileNameNotProvided);
        }
        Ok(())
    }

    /// Resolved queue limit; `None` means unbounded.
    #[must_use]
    pub const fn queue_limit(&self) -> Option<usize> {
        match self.max_queue {
            MaxQueue::Unbounded => None,
            MaxQueue::Limit(limit) => Some(limit),
            MaxQueue::Auto => Some(self.max_threads.saturating_mul(self.max_threads)),
        }
    }

    /// Idle timeout, `None` when disabled.
    #[must_use]
    pub const fn idle_timeout(&self) -> Option<Duration> {
        match self.idle_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Teardown timeout, `None` to wait indefinitely.
    #[must_use]
    pub fn terminate_timeout(&self) -> Option<Duration> {
        self.terminate_timeout_ms.map(Duration::from_millis)
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] on parse failure or any
    /// validation error.
    pub fn from_json_str(input: &str) -> Result<Self, PoolError> {
        let cfg: Self = serde_json::from_str(input)
            .map_err(|e| PoolError::InvalidConfig(format!("parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by `NOVA_POOL_*` variables, after loading a
    /// `.env` file if one exists.
    ///
    /// Recognized: `NOVA_POOL_FILENAME`, `NOVA_POOL_MIN_THREADS`,
    /// `NOVA_POOL_MAX_THREADS`, `NOVA_POOL_IDLE_TIMEOUT_MS`,
    /// `NOVA_POOL_MAX_QUEUE` (`auto` or a number),
    /// `NOVA_POOL_CONCURRENT_TASKS_PER_WORKER`,
    /// `NOVA_POOL_TERMINATE_TIMEOUT_MS`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if a variable does not parse or
    /// the result fails validation.
    pub fn from_env() -> Result<Self, PoolError> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        if let Ok(filename) = env::var("NOVA_POOL_FILENAME") {
            cfg.filename = Some(filename);
        }
        if let Some(v) = parse_env("NOVA_POOL_MIN_THREADS")? {
            cfg.min_threads = v;
        }
        if let Some(v) = parse_env("NOVA_POOL_MAX_THREADS")? {
            cfg.max_threads = v;
        }
        if let Some(v) = parse_env("NOVA_POOL_IDLE_TIMEOUT_MS")? {
            cfg.idle_timeout_ms = v;
        }
        if let Ok(raw) = env::var("NOVA_POOL_MAX_QUEUE") {
            cfg.max_queue = if raw.eq_ignore_ascii_case("auto") {
                MaxQueue::Auto
            } else {
                MaxQueue::Limit(parse_value("NOVA_POOL_MAX_QUEUE", &raw)?)
            };
        }
        if let Some(v) = parse_env("NOVA_POOL_CONCURRENT_TASKS_PER_WORKER")? {
            cfg.concurrent_tasks_per_worker = v;
        }
        if let Some(v) = parse_env("NOVA_POOL_TERMINATE_TIMEOUT_MS")? {
            cfg.terminate_timeout_ms = Some(v);
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, PoolError> {
    env::var(key)
        .ok()
        .map(|raw| parse_value(key, &raw))
        .transpose()
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, PoolError> {
    raw.trim()
        .parse()
        .map_err(|_| PoolError::InvalidConfig(format!("{key}: cannot parse `{raw}`")))
}
