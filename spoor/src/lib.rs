//! Tracing bootstrap shared by tests, benches and the helper binaries.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default: `info`).
///
/// Output goes through the test writer, so `cargo test` captures it per-test.
/// Calling this more than once is fine; only the first call does anything.
pub fn init() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Like [`init`], but writes to stderr; for binaries whose stdout is a protocol channel.
pub fn init_stderr() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
