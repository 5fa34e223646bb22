//! Tracing subscriber setup for processes embedding the cache.

use interaction_cache_core::{Error, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global stdout subscriber filtered by `RUST_LOG`.
///
/// `LOG_FORMAT=json` switches to JSON lines. Fails if a global subscriber is
/// already installed.
pub fn configure_tracing() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,interaction_cache=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };

    installed.map_err(|e| Error::Runtime(format!("Failed to install tracing subscriber: {}", e)))
}
