//! Tracing subscriber setup.
//!
//! Retryflow only emits `tracing` events; installing a subscriber is left
//! to the application. These helpers cover the common cases. All of them
//! honour `RUST_LOG` and are safe to call more than once.

use tracing_subscriber::EnvFilter;

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Installs a human-readable fmt subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("info"))
        .with_target(false)
        .try_init();
}

/// Installs a JSON fmt subscriber.
pub fn init_json_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("info"))
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

/// Installs a debug-level subscriber writing through the test harness.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("retryflow=debug"))
        .with_test_writer()
        .try_init();
}
