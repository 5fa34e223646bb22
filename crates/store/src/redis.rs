//! Redis implementation of BucketStore.

use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client, ErrorKind, RedisError};
use std::collections::HashSet;
use std::time::Duration;

use interaction_cache_core::{
    traits::{BatchWrite, BucketStore},
    CacheConfig, Error, Result,
};

use crate::connection::{ConnectionManager, Connector};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Opens multiplexed Redis connections.
pub struct RedisConnector {
    client: Client,
}

impl RedisConnector {
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| Error::config(format!("Invalid Redis URL {}: {}", url, e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Connector for RedisConnector {
    type Connection = MultiplexedConnection;
    type Error = RedisError;

    async fn connect(&self) -> std::result::Result<MultiplexedConnection, RedisError> {
        match tokio::time::timeout(CONNECT_TIMEOUT, self.client.get_multiplexed_async_connection()).await {
            Ok(conn) => conn,
            Err(_) => Err(RedisError::from((ErrorKind::IoError, "connect timed out"))),
        }
    }

    async fn ping(&self, conn: &mut MultiplexedConnection) -> std::result::Result<bool, RedisError> {
        let pong: String = redis::cmd("PING").query_async(conn).await?;
        Ok(pong == "PONG")
    }
}

/// Redis-backed bucket store.
///
/// Buckets are Redis sets; expiry is Redis-native. The multiplexed connection
/// is shared by every in-flight command.
pub struct RedisBucketStore {
    connections: ConnectionManager<RedisConnector>,
}

impl RedisBucketStore {
    /// Create a store for the instance described by `config`.
    pub fn new(config: &CacheConfig) -> Result<Self> {
        Self::from_url(&config.redis_url(), config.max_retries, config.retry_backoff)
    }

    /// Create a store from an explicit URL and retry policy.
    pub fn from_url(url: &str, max_retries: u32, retry_backoff: Duration) -> Result<Self> {
        let connector = RedisConnector::new(url)?;
        Ok(Self {
            connections: ConnectionManager::new(connector, max_retries, retry_backoff),
        })
    }

    /// A live connection, for callers that need raw commands.
    pub async fn connection(&self) -> Result<MultiplexedConnection> {
        self.connections.acquire().await
    }
}

#[async_trait]
impl BucketStore for RedisBucketStore {
    /// One check, without the connection retry loop, so an unreachable
    /// server reports `false` promptly.
    async fn ping(&self) -> Result<bool> {
        Ok(self.connections.check_once().await)
    }

    async fn add_member(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.connections.acquire().await?;
        let added: i64 = conn
            .sadd(key, member)
            .await
            .map_err(|e| Error::store_operation("SADD", key, e))?;
        Ok(added > 0)
    }

    async fn members(&self, key: &str) -> Result<HashSet<String>> {
        let mut conn = self.connections.acquire().await?;
        conn.smembers(key)
            .await
            .map_err(|e| Error::store_operation("SMEMBERS", key, e))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.connections.acquire().await?;
        conn.expire(key, ttl_seconds(ttl))
            .await
            .map_err(|e| Error::store_operation("EXPIRE", key, e))
    }

    async fn add_members(&self, key: &str, members: &[String], ttl: Duration) -> Result<BatchWrite> {
        let mut conn = self.connections.acquire().await?;

        // Non-atomic pipeline: the server runs every command even when one
        // fails, and once sent the EXPIRE lands with the adds.
        let mut pipe = redis::pipe();
        for member in members {
            pipe.sadd(key, member);
        }
        pipe.expire(key, ttl_seconds(ttl));

        let replies: Vec<i64> = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::store_operation("SADD", key, e))?;
        let added = replies.iter().take(members.len()).filter(|n| **n > 0).count();

        Ok(BatchWrite {
            added,
            ..Default::default()
        })
    }
}

/// A zero TTL would delete the key outright.
fn ttl_seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_url() {
        let err = RedisBucketStore::from_url("not a url", 1, Duration::ZERO)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_unreachable_store_exhausts_retries() {
        // Nothing listens on port 1.
        let store = RedisBucketStore::from_url("redis://127.0.0.1:1/0", 2, Duration::from_millis(10)).unwrap();

        let err = store.members("u1:0").await.unwrap_err();

        assert!(matches!(err, Error::Connection { attempts: 2, .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_ping_unreachable_store_is_false() {
        let store = RedisBucketStore::from_url("redis://127.0.0.1:1/0", 10, Duration::from_secs(1)).unwrap();
        let start = std::time::Instant::now();

        assert!(!store.ping().await.unwrap());
        // One connect attempt, not the whole retry budget.
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_ttl_seconds_never_zero() {
        assert_eq!(ttl_seconds(Duration::ZERO), 1);
        assert_eq!(ttl_seconds(Duration::from_millis(2500)), 2);
        assert_eq!(ttl_seconds(Duration::MAX), i64::MAX);
    }
}
