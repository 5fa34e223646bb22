#![deny(unused)]
//! Core types, traits, and error definitions for the interaction cache.
//!
//! This crate holds the pure parts of the cache: bucketing arithmetic, the key
//! scheme, configuration, and the store contract the engine talks to.

pub mod bucket;
pub mod clock;
pub mod config;
pub mod error;
pub mod traits;

pub use bucket::BucketScheme;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use error::{Error, Result};
pub use traits::{BatchWrite, BucketStore};
