//! Tracing subscriber setup
//!
//! Library code only emits `tracing` events; binaries and tests decide
//! where they go. `RUST_LOG` wins over the verbosity flag when set.

use tracing_subscriber::EnvFilter;

/// Install a global `fmt` subscriber.
///
/// Safe to call more than once: later calls are ignored, which keeps
/// test binaries that initialise logging per test from panicking.
pub fn init(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
