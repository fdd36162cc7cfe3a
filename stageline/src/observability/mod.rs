//! Tracing setup for hosts and tests.
//!
//! The engine only emits `tracing` events; it never installs a subscriber.
//! These helpers install one for callers that have none.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs a human-readable subscriber.
///
/// Filtering follows `RUST_LOG`, defaulting to `info`. Does nothing if a
/// global subscriber is already set.
pub fn init_tracing() {
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let _ = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter())
        .try_init();
}

/// Installs a subscriber writing one JSON object per event.
pub fn init_json_tracing() {
    let fmt_layer = tracing_subscriber::fmt::layer().json().with_current_span(false);
    let _ = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter())
        .try_init();
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
