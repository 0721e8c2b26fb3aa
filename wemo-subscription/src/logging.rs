//! Opt-in tracing setup for binaries and examples embedding the registry.
//!
//! Library code only emits `tracing` events; applications that already
//! install their own subscriber should skip this.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a compact stderr subscriber honoring `WEMO_LOG` (defaults to
/// `info`).
///
/// Calling it twice, or alongside another global subscriber, is harmless;
/// the second initialization is dropped.
pub fn init() {
    let filter = EnvFilter::try_from_env("WEMO_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
