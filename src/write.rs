//! Write path: add to the current bucket and push its expiry out.

use chrono::{DateTime, Utc};

use interaction_cache_core::{BucketScheme, BucketStore};

/// Record `interaction_ids` in the bucket containing `now`, then reset that
/// bucket's TTL to the full retention window.
///
/// The adds and the TTL refresh go to the store as one batch. Every id is
/// attempted even if earlier ones fail, and the TTL refresh is attempted once
/// regardless. Failures are logged, never returned. Returns the number of ids
/// that were new to the bucket.
pub async fn record(
    store: &dyn BucketStore,
    scheme: &BucketScheme,
    user_id: &str,
    interaction_ids: &[String],
    now: DateTime<Utc>,
) -> usize {
    let key = scheme.current_key(user_id, now);

    let batch = match store.add_members(&key, interaction_ids, scheme.retention()).await {
        Ok(batch) => batch,
        Err(e) => {
            metrics::counter!("interaction_cache_store_errors_total", "op" => "WRITE").increment(1);
            tracing::error!(key = %key, interactions = ?interaction_ids, error = %e, "Failed to cache interactions");
            return 0;
        }
    };

    for (id, e) in &batch.failed {
        metrics::counter!("interaction_cache_store_errors_total", "op" => "SADD").increment(1);
        tracing::error!(key = %key, interaction = %id, error = %e, "Failed to cache interaction");
    }
    if let Some(e) = &batch.expire_error {
        metrics::counter!("interaction_cache_store_errors_total", "op" => "EXPIRE").increment(1);
        tracing::error!(key = %key, error = %e, "Failed to extend TTL of bucket");
    }

    batch.added
}
