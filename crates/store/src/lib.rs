#![deny(unused)]
//! Backing stores for the interaction cache.
//!
//! This crate provides the Redis bucket store with its memoized connection
//! manager, and an in-memory store that emulates Redis set and expiry
//! semantics.

pub mod connection;
pub mod memory;
pub mod redis;

pub use connection::{ConnectionManager, Connector};
pub use memory::InMemoryBucketStore;
pub use self::redis::{RedisBucketStore, RedisConnector};
