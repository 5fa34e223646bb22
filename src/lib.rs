#![deny(unused)]
//! Interaction cache - time-windowed, per-user deduplication of interactions.
//!
//! Interactions are recorded in fixed-width time buckets held in Redis sets,
//! each expiring one retention window after its latest write. Lookups union
//! every bucket in the window. Writes run in the background and reads are
//! bounded by a timeout, so a slow or absent store degrades results instead of
//! failing callers.

pub mod blocking;
pub mod cache;
pub mod query;
pub mod telemetry;
pub mod write;

pub use blocking::{BlockingUserCache, Interaction};
pub use cache::UserCache;
pub use telemetry::configure_tracing;

pub use interaction_cache_core::{
    BatchWrite, BucketScheme, BucketStore, CacheConfig, Clock, Error, ManualClock, Result,
    SystemClock,
};
pub use interaction_cache_store::{InMemoryBucketStore, RedisBucketStore};
