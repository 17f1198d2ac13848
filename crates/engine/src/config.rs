use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use autopilot_core::error::CoreError;

/// Engine tuning loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-attempt generation timeout.
    pub generation_timeout: Duration,
    /// Pause between generation attempts.
    pub generation_retry_delay: Duration,
    /// Total generation attempts (first try plus retries).
    pub generation_max_attempts: u32,
    /// Generated items below this confidence are dropped.
    pub min_confidence: f64,
    /// Executor tasks per process.
    pub worker_concurrency: usize,
    pub queue_poll_interval: Duration,
    /// Age after which a `QUEUED` Run is handed to the queue again.
    pub queue_redeliver_after: Duration,
    /// Age after which a `RUNNING` Run is swept to `FAILED(timeout)`.
    pub stuck_run_timeout: Duration,
    pub stuck_run_sweep_interval: Duration,
    /// In-process queue buffer size.
    pub queue_capacity: usize,
    /// Gate evaluations a bus trigger gets before its failure is recorded.
    pub trigger_max_attempts: u32,
    pub trigger_retry_delay: Duration,
}

/// Two retries on transient generation errors.
pub const DEFAULT_GENERATION_ATTEMPTS: u32 = 3;

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            generation_timeout: Duration::from_secs(60),
            generation_retry_delay: Duration::from_millis(500),
            generation_max_attempts: DEFAULT_GENERATION_ATTEMPTS,
            min_confidence: 0.6,
            worker_concurrency: 4,
            queue_poll_interval: Duration::from_secs(5),
            queue_redeliver_after: Duration::from_secs(30),
            stuck_run_timeout: Duration::from_secs(1800),
            stuck_run_sweep_interval: Duration::from_secs(60),
            queue_capacity: 1024,
            trigger_max_attempts: 3,
            trigger_retry_delay: Duration::from_secs(2),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default |
    /// |---------------------------------|---------|
    /// | `GENERATION_TIMEOUT_SECS`       | `60`    |
    /// | `GENERATION_RETRY_DELAY_MS`     | `500`   |
    /// | `MIN_CONFIDENCE`                | `0.6`   |
    /// | `WORKER_CONCURRENCY`            | `4`     |
    /// | `QUEUE_POLL_INTERVAL_SECS`      | `5`     |
    /// | `QUEUE_REDELIVER_AFTER_SECS`    | `30`    |
    /// | `STUCK_RUN_TIMEOUT_SECS`        | `1800`  |
    /// | `STUCK_RUN_SWEEP_INTERVAL_SECS` | `60`    |
    /// | `TRIGGER_MAX_ATTEMPTS`          | `3`     |
    /// | `TRIGGER_RETRY_DELAY_MS`        | `2000`  |
    pub fn from_env() -> Result<Self, CoreError> {
        let config = Self {
            generation_timeout: Duration::from_secs(env_or("GENERATION_TIMEOUT_SECS", 60)?),
            generation_retry_delay: Duration::from_millis(env_or(
                "GENERATION_RETRY_DELAY_MS",
                500,
            )?),
            generation_max_attempts: DEFAULT_GENERATION_ATTEMPTS,
            min_confidence: env_or("MIN_CONFIDENCE", 0.6)?,
            worker_concurrency: env_or("WORKER_CONCURRENCY", 4)?,
            queue_poll_interval: Duration::from_secs(env_or("QUEUE_POLL_INTERVAL_SECS", 5)?),
            queue_redeliver_after: Duration::from_secs(env_or("QUEUE_REDELIVER_AFTER_SECS", 30)?),
            stuck_run_timeout: Duration::from_secs(env_or("STUCK_RUN_TIMEOUT_SECS", 1800)?),
            stuck_run_sweep_interval: Duration::from_secs(env_or(
                "STUCK_RUN_SWEEP_INTERVAL_SECS",
                60,
            )?),
            queue_capacity: 1024,
            trigger_max_attempts: env_or("TRIGGER_MAX_ATTEMPTS", 3)?,
            trigger_retry_delay: Duration::from_millis(env_or("TRIGGER_RETRY_DELAY_MS", 2000)?),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(CoreError::Validation(
                "MIN_CONFIDENCE must be between 0 and 1".into(),
            ));
        }
        if self.worker_concurrency == 0 {
            return Err(CoreError::Validation(
                "WORKER_CONCURRENCY must be at least 1".into(),
            ));
        }
        if self.generation_max_attempts == 0 {
            return Err(CoreError::Validation(
                "generation attempts must be at least 1".into(),
            ));
        }
        if self.trigger_max_attempts == 0 {
            return Err(CoreError::Validation(
                "TRIGGER_MAX_ATTEMPTS must be at least 1".into(),
            ));
        }
        // tokio::time::interval panics on a zero period.
        let durations = [
            ("GENERATION_TIMEOUT_SECS", self.generation_timeout),
            ("QUEUE_POLL_INTERVAL_SECS", self.queue_poll_interval),
            ("STUCK_RUN_TIMEOUT_SECS", self.stuck_run_timeout),
            ("STUCK_RUN_SWEEP_INTERVAL_SECS", self.stuck_run_sweep_interval),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(CoreError::Validation(format!("{name} must be greater than 0")));
        }
        Ok(())
    }
}

/// Parse `name` from the environment, or return `default` when it is unset.
pub fn env_or<T: FromStr>(name: &str, default: T) -> Result<T, CoreError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CoreError::Validation(format!("{name} has an invalid value '{raw}'"))),
        Err(_) => Ok(default),
    }
}

/// A path from the environment. Unset and blank values are both `None`.
pub fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from)
}
