use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level config (autopost.toml + AUTOPOST_* env overrides).
///
/// Every knob has a documented default so an empty file is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AutopostConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file holding both the job queue and the analytics tables.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between due-job polls. Minute-level precision is the goal;
    /// 30 s keeps worst-case delay well inside that.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Publish attempts before a job is terminally failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay added to scheduled_at when a failed attempt is retried.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,
    /// Upper bound on a single publisher call.
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            max_attempts: default_max_attempts(),
            retry_backoff_secs: default_retry_backoff(),
            publish_timeout_secs: default_publish_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Seconds between competitor snapshot cycles.
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,
    /// Upper bound on a single metrics fetch.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// Published posts (paired with a nearby snapshot) required before
    /// best-time recommendations use observed data instead of the
    /// per-platform default table.
    #[serde(default = "default_min_publish_samples")]
    pub min_publish_samples: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            snapshot_interval_secs: default_snapshot_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
            min_publish_samples: default_min_publish_samples(),
        }
    }
}

#[derive(Debug, Error)]
#[error("Configuration error: {0}")]
pub struct ConfigError(String);

impl AutopostConfig {
    /// Load from `path` (or `autopost.toml` in the working directory),
    /// then apply `AUTOPOST_SECTION__KEY` environment overrides, e.g.
    /// `AUTOPOST_SCHEDULER__MAX_ATTEMPTS=5`.
    ///
    /// The section separator is a double underscore; key names keep
    /// their own single underscores.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let path = config_path.unwrap_or("autopost.toml");

        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("AUTOPOST_").split("__"))
            .extract()
            .map_err(|e| ConfigError(e.to_string()))
    }
}

fn default_db_path() -> String {
    "data/autopost.db".to_string()
}

fn default_poll_interval() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    300
}

fn default_publish_timeout() -> u64 {
    30
}

fn default_snapshot_interval() -> u64 {
    3600
}

fn default_fetch_timeout() -> u64 {
    15
}

fn default_min_publish_samples() -> usize {
    5
}
