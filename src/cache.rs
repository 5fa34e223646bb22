//! Per-call orchestration of the read and write paths.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use interaction_cache_core::{
    BucketScheme, BucketStore, CacheConfig, Clock, Error, Result, SystemClock,
};
use interaction_cache_store::RedisBucketStore;

use crate::{query, write};

/// Time-bucketed, best-effort cache of the interactions each user has
/// produced within the retention window.
///
/// Cloning is cheap; clones share the store and its connection.
#[derive(Clone)]
pub struct UserCache {
    store: Arc<dyn BucketStore>,
    clock: Arc<dyn Clock>,
    scheme: BucketScheme,
    query_timeout: Duration,
    write_timeout: Duration,
}

impl UserCache {
    /// Create a cache over `store` using the bucketing and timeouts in `config`.
    pub fn new(store: Arc<dyn BucketStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            scheme: BucketScheme::from(config),
            query_timeout: config.query_timeout,
            write_timeout: config.write_timeout,
        }
    }

    /// Create a Redis-backed cache. No connection is opened until first use.
    pub fn connect(config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        let store = RedisBucketStore::new(config)?;
        tracing::info!(url = %config.redis_url(), "Initializing Redis interaction cache");
        Ok(Self::new(Arc::new(store), config))
    }

    /// Create a Redis-backed cache configured from `REDIS_*` variables.
    pub fn from_env() -> Result<Self> {
        Self::connect(&CacheConfig::from_env()?)
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn scheme(&self) -> &BucketScheme {
        &self.scheme
    }

    /// Check that the backing store answers.
    pub async fn ping(&self) -> Result<bool> {
        self.store.ping().await
    }

    /// Interaction ids visible for `user_id` right now, without recording.
    pub async fn query(&self, user_id: &str) -> Result<HashSet<String>> {
        query::query(self.store.as_ref(), &self.scheme, user_id, self.clock.now()).await
    }

    /// Record `interaction_ids` for `user_id` and wait for the write to finish.
    pub async fn record(&self, user_id: &str, interaction_ids: &[String]) -> usize {
        write::record(
            self.store.as_ref(),
            &self.scheme,
            user_id,
            interaction_ids,
            self.clock.now(),
        )
        .await
    }

    /// Look up a user's recent interactions, optionally recording new ones.
    ///
    /// The write is dispatched first and runs in the background while the
    /// query is awaited for at most the query timeout; a slow query yields no
    /// stored ids rather than an error. The write is then given up to the write
    /// timeout before the call stops waiting for it. The result always
    /// contains `interaction_ids`, persisted or not.
    ///
    /// Only a failure to connect to the store fails the call.
    pub async fn interact(
        &self,
        user_id: &str,
        interaction_ids: &[String],
        should_record: bool,
    ) -> Result<HashSet<String>> {
        let now = self.clock.now();

        // Dropped at return, so no write outlives the call. A write is one
        // store operation, so aborting it cannot separate adds from the TTL.
        let mut writes = JoinSet::new();
        if should_record && !interaction_ids.is_empty() {
            let store = self.store.clone();
            let scheme = self.scheme;
            let user = user_id.to_string();
            let ids = interaction_ids.to_vec();
            writes.spawn(async move { write::record(store.as_ref(), &scheme, &user, &ids, now).await });
        }

        let lookup = query::query(self.store.as_ref(), &self.scheme, user_id, now);
        let mut visible = match tokio::time::timeout(self.query_timeout, lookup).await {
            Ok(result) => result?,
            Err(_) => {
                let e = Error::QueryTimeout(self.query_timeout.as_millis() as u64);
                metrics::counter!("interaction_cache_query_timeouts_total").increment(1);
                tracing::warn!(user = user_id, error = %e, "Serving without stored interactions");
                HashSet::new()
            }
        };

        if !writes.is_empty() {
            match tokio::time::timeout(self.write_timeout, writes.join_next()).await {
                Ok(Some(Ok(added))) => {
                    tracing::debug!(user = user_id, added, "Cached interactions");
                }
                Ok(Some(Err(e))) => {
                    tracing::error!(user = user_id, error = %e, "Interaction write task failed");
                }
                Ok(None) => {}
                Err(_) => {
                    let e = Error::WriteTimeout(self.write_timeout.as_millis() as u64);
                    metrics::counter!("interaction_cache_write_timeouts_total").increment(1);
                    tracing::warn!(
                        user = user_id,
                        interactions = ?interaction_ids,
                        error = %e,
                        "Failed to cache interaction"
                    );
                }
            }
        }

        visible.extend(interaction_ids.iter().cloned());
        Ok(visible)
    }
}

impl std::fmt::Debug for UserCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCache")
            .field("clock", &self.clock)
            .field("scheme", &self.scheme)
            .field("query_timeout", &self.query_timeout)
            .field("write_timeout", &self.write_timeout)
            .finish_non_exhaustive()
    }
}
