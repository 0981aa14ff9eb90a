//! Tracing setup for the harness.
//!
//! One stderr layer filtered by `RUST_LOG` (default `warn`). Initialization is
//! idempotent so parallel tests and nested fixtures can all call it.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the stderr tracing subscriber.
///
/// Respects `RUST_LOG`; safe to call any number of times (subsequent calls are
/// no-ops).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .try_init();
}
