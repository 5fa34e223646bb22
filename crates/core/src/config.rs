use config::{Config, Environment, Map};
use serde::Deserialize;
use std::time::Duration;

use crate::bucket::{bucket_count, MAX_WINDOW_BUCKETS};
use crate::error::{Error, Result};

const SECS_PER_DAY: f64 = 86_400.0;

/// Settings as they appear in the environment (`REDIS_*`).
///
/// Durations are expressed the way operators already set them: retention and
/// resolution in (fractional) days, timeouts in milliseconds.
#[derive(Debug, Deserialize, Clone)]
struct RawSettings {
    host: String,
    port: u16,
    db: i64,
    ttl: f64,
    resolution: f64,
    max_retries: u32,
    retry_backoff_ms: u64,
    query_timeout_ms: u64,
    write_timeout_ms: u64,
}

/// Validated cache configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    /// How far back queries must still see data. Also the bucket TTL.
    pub retention: Duration,
    /// Bucket width.
    pub resolution: Duration,
    /// Connection attempts before giving up.
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub query_timeout: Duration,
    pub write_timeout: Duration,
}

impl CacheConfig {
    /// Load configuration from `REDIS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::load(Environment::with_prefix("REDIS"))
    }

    /// Load configuration from an explicit variable map instead of the process
    /// environment. Keys use the same `REDIS_*` names.
    pub fn from_source(vars: Map<String, String>) -> Result<Self> {
        Self::load(Environment::with_prefix("REDIS").source(Some(vars)))
    }

    fn load(env: Environment) -> Result<Self> {
        let defaults = Self::default();
        let raw: RawSettings = Config::builder()
            .set_default("host", defaults.host.clone())?
            .set_default("port", i64::from(defaults.port))?
            .set_default("db", defaults.db)?
            .set_default("ttl", 7.0_f64)?
            .set_default("resolution", 1.0_f64)?
            .set_default("max_retries", i64::from(defaults.max_retries))?
            .set_default("retry_backoff_ms", 1000_i64)?
            .set_default("query_timeout_ms", 100_i64)?
            .set_default("write_timeout_ms", 100_i64)?
            .add_source(env)
            .build()?
            .try_deserialize()?;

        let config = Self {
            host: raw.host,
            port: raw.port,
            db: raw.db,
            retention: days("REDIS_TTL", raw.ttl)?,
            resolution: days("REDIS_RESOLUTION", raw.resolution)?,
            max_retries: raw.max_retries,
            retry_backoff: Duration::from_millis(raw.retry_backoff_ms),
            query_timeout: Duration::from_millis(raw.query_timeout_ms),
            write_timeout: Duration::from_millis(raw.write_timeout_ms),
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the retention window.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Set the bucket resolution.
    pub fn with_resolution(mut self, resolution: Duration) -> Self {
        self.resolution = resolution;
        self
    }

    /// Set the connection retry budget and backoff.
    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }

    /// Set the query and post-write wait bounds.
    pub fn with_timeouts(mut self, query: Duration, write: Duration) -> Self {
        self.query_timeout = query;
        self.write_timeout = write;
        self
    }

    /// Check the invariants the bucketing scheme relies on.
    pub fn validate(&self) -> Result<()> {
        if self.resolution.is_zero() {
            return Err(Error::config("resolution must be greater than zero"));
        }
        if self.resolution > Duration::from_secs(SECS_PER_DAY as u64) {
            return Err(Error::config(format!(
                "resolution {:?} exceeds one day; buckets are aligned to the calendar day",
                self.resolution
            )));
        }
        if self.retention < self.resolution {
            return Err(Error::config(format!(
                "retention {:?} is shorter than resolution {:?}",
                self.retention, self.resolution
            )));
        }
        let buckets = bucket_count(self.retention, self.resolution);
        if buckets > MAX_WINDOW_BUCKETS {
            return Err(Error::config(format!(
                "retention {:?} at resolution {:?} spans {} buckets, more than {}",
                self.retention, self.resolution, buckets, MAX_WINDOW_BUCKETS
            )));
        }
        if self.max_retries == 0 {
            return Err(Error::config("max_retries must be at least 1"));
        }
        Ok(())
    }

    /// Connection URL for the backing Redis instance.
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 6379,
            db: 0,
            retention: Duration::from_secs(7 * 86_400),
            resolution: Duration::from_secs(86_400),
            max_retries: 10,
            retry_backoff: Duration::from_secs(1),
            query_timeout: Duration::from_millis(100),
            write_timeout: Duration::from_millis(100),
        }
    }
}

fn days(name: &str, value: f64) -> Result<Duration> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::config(format!("{} must be a non-negative number of days, got {}", name, value)));
    }
    Duration::try_from_secs_f64(value * SECS_PER_DAY)
        .map_err(|e| Error::config(format!("{} of {} days is out of range: {}", name, value, e)))
}
