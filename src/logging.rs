//! Logging bootstrap for binaries embedding this crate as a library.
//!
//! The crate itself only emits `tracing` events; it never installs a
//! subscriber on its own (a library shouldn't steal stderr out from under
//! its caller). This mirrors `init_logging_for` in `runtime/core.rs`,
//! trimmed to the part that doesn't depend on a filesystem layout:
//! callers that want console output wire this up once at process start.
use tracing_subscriber::EnvFilter;

/// Install a `tracing-subscriber` formatter reading `RUST_LOG` (defaulting
/// to `info`). Safe to call more than once; later calls are no-ops.
pub fn init_default_subscriber() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
