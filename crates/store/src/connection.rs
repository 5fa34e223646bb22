//! Memoized, health-checked store connections.
//!
//! The connection is cached on the owning store and re-validated with a
//! liveness probe each time it is handed out. When the probe fails, a new
//! connection is opened, retrying with a fixed backoff until the retry budget
//! runs out.

use async_trait::async_trait;
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::Mutex;

use interaction_cache_core::{Error, Result};

/// Opens and probes connections to a backing store.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Shareable connection handle.
    type Connection: Clone + Send + Sync + 'static;
    /// Transport error.
    type Error: Display + Send;

    /// Open a new connection.
    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error>;

    /// Liveness probe on an open connection.
    async fn ping(&self, conn: &mut Self::Connection) -> std::result::Result<bool, Self::Error>;
}

#[derive(Debug)]
struct Slot<T> {
    generation: u64,
    conn: Option<T>,
}

/// Caches one connection and replaces it when it stops answering.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    slot: Mutex<Slot<C::Connection>>,
    max_retries: u32,
    backoff: Duration,
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager. No connection is opened until the first `acquire`.
    pub fn new(connector: C, max_retries: u32, backoff: Duration) -> Self {
        Self {
            connector,
            slot: Mutex::new(Slot {
                generation: 0,
                conn: None,
            }),
            max_retries: max_retries.max(1),
            backoff,
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Return a live connection, reconnecting if the cached one is gone.
    ///
    /// Fails with [`Error::Connection`] once `max_retries` attempts have failed.
    pub async fn acquire(&self) -> Result<C::Connection> {
        let (seen, cached) = {
            let slot = self.slot.lock().await;
            (slot.generation, slot.conn.clone())
        };

        if let Some(mut conn) = cached {
            if matches!(self.connector.ping(&mut conn).await, Ok(true)) {
                return Ok(conn);
            }
            tracing::debug!(generation = seen, "Cached connection failed liveness probe");
        }

        // Reconnect under the lock so concurrent callers open one connection.
        let mut slot = self.slot.lock().await;
        if slot.generation != seen {
            if let Some(conn) = slot.conn.clone() {
                return Ok(conn);
            }
        }

        slot.conn = None;
        let conn = self.connect_with_retry().await?;
        slot.generation += 1;
        slot.conn = Some(conn.clone());
        Ok(conn)
    }

    /// Single liveness check, without retries or backoff.
    ///
    /// Pings the cached connection, or opens one if there is none; a new
    /// connection that answers is kept for later `acquire` calls.
    pub async fn check_once(&self) -> bool {
        let (seen, cached) = {
            let slot = self.slot.lock().await;
            (slot.generation, slot.conn.clone())
        };
        if let Some(mut conn) = cached {
            if matches!(self.connector.ping(&mut conn).await, Ok(true)) {
                return true;
            }
        }

        let mut slot = self.slot.lock().await;
        if slot.generation != seen && slot.conn.is_some() {
            return true;
        }

        metrics::counter!("interaction_cache_connect_attempts_total").increment(1);
        let mut conn = match self.connector.connect().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "Cache health check could not connect");
                return false;
            }
        };
        if !matches!(self.connector.ping(&mut conn).await, Ok(true)) {
            return false;
        }
        slot.generation += 1;
        slot.conn = Some(conn);
        true
    }

    async fn connect_with_retry(&self) -> Result<C::Connection> {
        let mut last_error = String::new();

        for attempt in 1..=self.max_retries {
            metrics::counter!("interaction_cache_connect_attempts_total").increment(1);

            match self.connector.connect().await {
                Ok(mut conn) => match self.connector.ping(&mut conn).await {
                    Ok(true) => {
                        tracing::info!(attempt, "Cache connection established");
                        return Ok(conn);
                    }
                    Ok(false) => last_error = "liveness probe failed".to_string(),
                    Err(e) => last_error = e.to_string(),
                },
                Err(e) => last_error = e.to_string(),
            }

            tracing::error!(
                attempt,
                max_retries = self.max_retries,
                error = %last_error,
                "Cache connection failed"
            );

            if attempt < self.max_retries {
                tokio::time::sleep(self.backoff).await;
            }
        }

        Err(Error::connection(self.max_retries, last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    /// Hands out numbered connections; the first `refuse` attempts fail and
    /// connections numbered below `dead_below` fail their probe.
    struct FakeConnector {
        attempts: AtomicU32,
        refuse: u32,
        dead_below: AtomicU32,
    }

    impl FakeConnector {
        fn new(refuse: u32) -> Self {
            Self {
                attempts: AtomicU32::new(0),
                refuse,
                dead_below: AtomicU32::new(0),
            }
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        type Connection = u32;
        type Error = String;

        async fn connect(&self) -> std::result::Result<u32, String> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.refuse {
                Err("connection refused".to_string())
            } else {
                Ok(n)
            }
        }

        async fn ping(&self, conn: &mut u32) -> std::result::Result<bool, String> {
            Ok(*conn >= self.dead_below.load(Ordering::SeqCst))
        }
    }

    const BACKOFF: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_connection_is_memoized() {
        let manager = ConnectionManager::new(FakeConnector::new(0), 10, BACKOFF);

        let first = manager.acquire().await.unwrap();
        let second = manager.acquire().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(manager.connector().attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_backoff_until_available() {
        let manager = ConnectionManager::new(FakeConnector::new(3), 10, BACKOFF);
        let start = Instant::now();

        let conn = manager.acquire().await.unwrap();

        assert_eq!(conn, 4);
        assert_eq!(manager.connector().attempts(), 4);
        assert_eq!(start.elapsed(), BACKOFF * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_after_retry_budget() {
        let manager = ConnectionManager::new(FakeConnector::new(u32::MAX), 3, BACKOFF);
        let start = Instant::now();

        let err = manager.acquire().await.unwrap_err();

        match err {
            Error::Connection { attempts, reason } => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("refused"));
            }
            other => panic!("Expected connection error, got {:?}", other),
        }
        assert_eq!(manager.connector().attempts(), 3);
        // No sleep after the final attempt.
        assert_eq!(start.elapsed(), BACKOFF * 2);
    }

    #[tokio::test]
    async fn test_reconnects_when_probe_fails() {
        let manager = ConnectionManager::new(FakeConnector::new(0), 10, BACKOFF);
        assert_eq!(manager.acquire().await.unwrap(), 1);

        manager.connector().dead_below.store(2, Ordering::SeqCst);

        assert_eq!(manager.acquire().await.unwrap(), 2);
        assert_eq!(manager.acquire().await.unwrap(), 2);
        assert_eq!(manager.connector().attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_once_makes_a_single_attempt() {
        let manager = ConnectionManager::new(FakeConnector::new(u32::MAX), 10, BACKOFF);
        let start = Instant::now();

        assert!(!manager.check_once().await);

        assert_eq!(manager.connector().attempts(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_check_once_keeps_new_connection() {
        let manager = ConnectionManager::new(FakeConnector::new(0), 10, BACKOFF);

        assert!(manager.check_once().await);
        assert!(manager.check_once().await);
        assert_eq!(manager.acquire().await.unwrap(), 1);
        assert_eq!(manager.connector().attempts(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_acquirers_share_one_reconnect() {
        let manager = std::sync::Arc::new(ConnectionManager::new(FakeConnector::new(0), 10, BACKOFF));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.acquire().await.unwrap() })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 1);
        }
        assert_eq!(manager.connector().attempts(), 1);
    }
}
