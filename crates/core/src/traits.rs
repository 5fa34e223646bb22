//! Contracts for the backing store.

use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;

use crate::error::{Error, Result};

/// Per-command outcome of [`BucketStore::add_members`].
#[derive(Debug, Default)]
pub struct BatchWrite {
    /// Members that were not already in the set.
    pub added: usize,
    /// Members whose add failed, with the reason.
    pub failed: Vec<(String, Error)>,
    /// Set when the TTL refresh failed.
    pub expire_error: Option<Error>,
}

/// Set-valued key store with native per-key expiry.
///
/// Implementations must make `add_member` and `expire` atomic per key; no
/// locking is done above this trait.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Liveness probe.
    async fn ping(&self) -> Result<bool>;

    /// Add `member` to the set at `key`, creating the set if absent.
    /// Returns `true` if the member was not already present.
    async fn add_member(&self, key: &str, member: &str) -> Result<bool>;

    /// Full member set at `key`; empty if the key is absent or expired.
    async fn members(&self, key: &str) -> Result<HashSet<String>>;

    /// Set or refresh the TTL on `key`. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Add every member to the set at `key`, then reset its TTL to `ttl`.
    ///
    /// A failed add does not stop the rest, and the TTL refresh is attempted
    /// regardless. The default issues one command after another, so a caller
    /// dropping the future part way can leave members without a TTL. Stores
    /// that can send the batch as a single operation should override it.
    async fn add_members(&self, key: &str, members: &[String], ttl: Duration) -> Result<BatchWrite> {
        let mut batch = BatchWrite::default();
        for member in members {
            match self.add_member(key, member).await {
                Ok(true) => batch.added += 1,
                Ok(false) => {}
                Err(e) => batch.failed.push((member.clone(), e)),
            }
        }
        batch.expire_error = self.expire(key, ttl).await.err();
        Ok(batch)
    }
}
