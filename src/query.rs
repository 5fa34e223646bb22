//! Read path: union of every bucket inside the retention window.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashSet;

use interaction_cache_core::{BucketScheme, BucketStore, Result};

/// Interaction ids visible for `user_id` at `now`.
///
/// Bucket fetches are independent and issued together. A connection failure
/// fails the query; any other failed fetch is logged and skipped.
pub async fn query(
    store: &dyn BucketStore,
    scheme: &BucketScheme,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<HashSet<String>> {
    let keys = scheme.window_keys(user_id, now);
    let fetches = keys.iter().map(|key| async move { (key, store.members(key).await) });

    let mut found = HashSet::new();
    for (key, fetched) in join_all(fetches).await {
        match fetched {
            Ok(members) => found.extend(members),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                metrics::counter!("interaction_cache_store_errors_total", "op" => "SMEMBERS").increment(1);
                tracing::error!(key = %key, error = %e, "Failed to read interaction bucket");
            }
        }
    }

    tracing::trace!(user = user_id, buckets = keys.len(), found = found.len(), "Queried interaction buckets");
    Ok(found)
}
