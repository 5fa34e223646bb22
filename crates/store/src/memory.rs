//! In-memory bucket store using DashMap.
//!
//! Emulates Redis set semantics and per-key expiry against an injected clock,
//! so bucket lifetimes can be exercised without a running server.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use interaction_cache_core::{
    traits::{BatchWrite, BucketStore},
    Clock, Error, Result, SystemClock,
};

#[derive(Debug, Clone, Default)]
struct StoredSet {
    members: HashSet<String>,
    /// `None` means the key never expires.
    expires_at: Option<DateTime<Utc>>,
}

impl StoredSet {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn expire_after(&mut self, now: DateTime<Utc>, ttl: Duration) {
        self.expires_at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl));
    }
}

/// Concurrent in-memory set store with clock-driven key expiry.
#[derive(Debug)]
pub struct InMemoryBucketStore {
    sets: DashMap<String, StoredSet>,
    clock: Arc<dyn Clock>,
    online: AtomicBool,
}

impl InMemoryBucketStore {
    /// Create a store that expires keys against `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sets: DashMap::new(),
            clock,
            online: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: while offline, probes fail and every command errors.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.sets.iter().filter(|r| !r.value().is_expired(now)).count()
    }

    /// Check if the store holds no live keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining time to live of `key`, if it is live and has an expiry.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let entry = self.sets.get(key)?;
        if entry.is_expired(now) {
            return None;
        }
        entry.expires_at.and_then(|at| (at - now).to_std().ok())
    }

    /// Drop every key.
    pub fn clear(&self) {
        self.sets.clear();
    }

    fn check_online(&self, op: &'static str, key: &str) -> Result<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::store_operation(op, key, "store offline"))
        }
    }
}

impl Default for InMemoryBucketStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl BucketStore for InMemoryBucketStore {
    async fn ping(&self) -> Result<bool> {
        Ok(self.online.load(Ordering::SeqCst))
    }

    async fn add_member(&self, key: &str, member: &str) -> Result<bool> {
        self.check_online("SADD", key)?;
        let now = self.clock.now();

        let mut entry = self.sets.entry(key.to_string()).or_default();
        if entry.is_expired(now) {
            *entry = StoredSet::default();
        }

        tracing::trace!(key, member, "Adding member to in-memory set");
        Ok(entry.members.insert(member.to_string()))
    }

    async fn members(&self, key: &str) -> Result<HashSet<String>> {
        self.check_online("SMEMBERS", key)?;
        let now = self.clock.now();

        Ok(self
            .sets
            .get(key)
            .filter(|r| !r.is_expired(now))
            .map(|r| r.members.clone())
            .unwrap_or_default())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.check_online("EXPIRE", key)?;
        let now = self.clock.now();

        if let Some(mut entry) = self.sets.get_mut(key) {
            if !entry.is_expired(now) {
                entry.expire_after(now, ttl);
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn add_members(&self, key: &str, members: &[String], ttl: Duration) -> Result<BatchWrite> {
        self.check_online("SADD", key)?;
        let now = self.clock.now();

        // Applied under one entry guard, with no await in between.
        let mut entry = self.sets.entry(key.to_string()).or_default();
        if entry.is_expired(now) {
            *entry = StoredSet::default();
        }
        let mut added = 0;
        for member in members {
            if entry.members.insert(member.clone()) {
                added += 1;
            }
        }
        entry.expire_after(now, ttl);

        Ok(BatchWrite {
            added,
            ..Default::default()
        })
    }
}
