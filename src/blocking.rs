//! Synchronous facade over [`UserCache`].

use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::runtime::Runtime;

use interaction_cache_core::{CacheConfig, Error, Result};

use crate::cache::UserCache;

/// Interaction ids supplied with a lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Interaction {
    #[default]
    None,
    One(String),
    Many(Vec<String>),
}

impl Interaction {
    /// Flatten into a list. An empty single id counts as no id.
    pub fn into_ids(self) -> Vec<String> {
        match self {
            Self::None => Vec::new(),
            Self::One(id) if id.is_empty() => Vec::new(),
            Self::One(id) => vec![id],
            Self::Many(ids) => ids,
        }
    }
}

impl From<&str> for Interaction {
    fn from(id: &str) -> Self {
        Self::One(id.to_string())
    }
}

impl From<String> for Interaction {
    fn from(id: String) -> Self {
        Self::One(id)
    }
}

impl From<Vec<String>> for Interaction {
    fn from(ids: Vec<String>) -> Self {
        Self::Many(ids)
    }
}

impl From<Vec<&str>> for Interaction {
    fn from(ids: Vec<&str>) -> Self {
        Self::Many(ids.into_iter().map(String::from).collect())
    }
}

impl<T: Into<Interaction>> From<Option<T>> for Interaction {
    fn from(id: Option<T>) -> Self {
        id.map(Into::into).unwrap_or_default()
    }
}

/// Blocking entry point for callers without an async runtime.
///
/// Calls are driven on a single-threaded runtime that is built on first use
/// and kept, so the store connection survives from one call to the next. A
/// current-thread runtime only makes progress inside a call; nothing runs in
/// the background between calls. Clones share the runtime, and calls are
/// serialized on it.
#[derive(Debug, Clone)]
pub struct BlockingUserCache {
    cache: UserCache,
    runtime: Arc<Mutex<Option<Runtime>>>,
}

impl BlockingUserCache {
    pub fn new(cache: UserCache) -> Self {
        Self {
            cache,
            runtime: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a Redis-backed cache configured from `REDIS_*` variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(UserCache::from_env()?))
    }

    /// Create a Redis-backed cache from `config`.
    pub fn connect(config: &CacheConfig) -> Result<Self> {
        Ok(Self::new(UserCache::connect(config)?))
    }

    pub fn inner(&self) -> &UserCache {
        &self.cache
    }

    /// Interactions `user_id` produced within the retention window, plus any
    /// supplied in `interaction`. When `should_record` is set the supplied ids
    /// are also stored. Order is unspecified.
    pub fn user_interactions(
        &self,
        user_id: &str,
        interaction: impl Into<Interaction>,
        should_record: bool,
    ) -> Result<Vec<String>> {
        let ids = interaction.into().into_ids();
        let visible = self.block_on(self.cache.interact(user_id, &ids, should_record))??;
        Ok(visible.into_iter().collect())
    }

    /// Check that the backing store answers.
    pub fn ping(&self) -> Result<bool> {
        self.block_on(self.cache.ping())?
    }

    fn block_on<F: Future>(&self, future: F) -> Result<F::Output> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(Error::Runtime(
                "blocking cache called from inside an async runtime; use UserCache::interact".into(),
            ));
        }
        let mut runtime = self
            .runtime
            .lock()
            .map_err(|_| Error::Runtime("blocking cache runtime lock poisoned".into()))?;
        if runtime.is_none() {
            let built = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| Error::Runtime(format!("Failed to build runtime: {}", e)))?;
            *runtime = Some(built);
        }
        match runtime.as_ref() {
            Some(runtime) => Ok(runtime.block_on(future)),
            None => Err(Error::Runtime("blocking cache runtime unavailable".into())),
        }
    }
}
