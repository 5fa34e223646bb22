//! Time bucketing and bucket key derivation.
//!
//! A user's interactions are spread over fixed-width buckets. Each bucket is
//! named by the epoch second of its floored start, and stored under
//! `"<user>:<bucket>"`. Reconstructing the recent set means walking back over
//! every bucket the retention window touches.

use chrono::{DateTime, TimeDelta, Timelike, Utc};
use std::time::Duration;

use crate::config::CacheConfig;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Upper bound on the buckets a single query visits.
pub const MAX_WINDOW_BUCKETS: u32 = 10_000;

/// Round `instant` down to the closest multiple of `resolution`, counted from
/// the start of its UTC day.
///
/// Resolutions longer than a day cannot be represented relative to the day,
/// so they floor to midnight.
pub fn floor(instant: DateTime<Utc>, resolution: Duration) -> DateTime<Utc> {
    let resolution = resolution.as_nanos();
    if resolution == 0 {
        return instant;
    }
    // Leap seconds report nanos >= 1e9.
    let subsec = u128::from(instant.nanosecond().min(999_999_999));
    let into_day = u128::from(instant.num_seconds_from_midnight()) * NANOS_PER_SEC + subsec;
    let remainder = (into_day % resolution) as i64;
    instant - TimeDelta::nanoseconds(remainder)
}

/// Whole seconds since the Unix epoch, truncated toward negative infinity.
pub fn epoch_seconds(instant: DateTime<Utc>) -> i64 {
    instant.timestamp()
}

/// Store key for one user's bucket.
pub fn bucket_key(user_id: &str, bucket: i64) -> String {
    format!("{}:{}", user_id, bucket)
}

/// Number of buckets a query must visit so the whole retention window is
/// covered, including the oldest partially covered bucket.
pub fn bucket_count(retention: Duration, resolution: Duration) -> u32 {
    let resolution = resolution.as_nanos();
    if resolution == 0 {
        return 1;
    }
    let spans = retention.as_nanos() / resolution;
    u32::try_from(spans).unwrap_or(u32::MAX - 1) + 1
}

/// Bucketing parameters shared by the read and write paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketScheme {
    retention: Duration,
    resolution: Duration,
}

impl BucketScheme {
    pub fn new(retention: Duration, resolution: Duration) -> Self {
        Self {
            retention,
            resolution,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn resolution(&self) -> Duration {
        self.resolution
    }

    /// Bucket id containing `now`.
    pub fn bucket_at(&self, now: DateTime<Utc>) -> i64 {
        epoch_seconds(floor(now, self.resolution))
    }

    /// Key of the bucket writes at `now` land in.
    pub fn current_key(&self, user_id: &str, now: DateTime<Utc>) -> String {
        bucket_key(user_id, self.bucket_at(now))
    }

    /// Keys of every bucket visible at `now`, newest first. Never more than
    /// [`MAX_WINDOW_BUCKETS`].
    pub fn window_keys(&self, user_id: &str, now: DateTime<Utc>) -> Vec<String> {
        let step = TimeDelta::from_std(self.resolution).unwrap_or(TimeDelta::MAX);
        let count = bucket_count(self.retention, self.resolution).min(MAX_WINDOW_BUCKETS);
        (0..count)
            .map_while(|delta| {
                let offset = step.checked_mul(i32::try_from(delta).ok()?)?;
                let at = now.checked_sub_signed(offset)?;
                Some(bucket_key(user_id, self.bucket_at(at)))
            })
            .collect()
    }
}

impl From<&CacheConfig> for BucketScheme {
    fn from(config: &CacheConfig) -> Self {
        Self::new(config.retention, config.resolution)
    }
}
