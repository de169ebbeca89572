#![forbid(unsafe_code)]

//! Test logging.
//!
//! Installs a compact `tracing-subscriber` writer that goes through the test
//! harness's captured output. The filter comes from `RUST_LOG` and defaults
//! to `warn`. Safe to call from every test; only the first call installs.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

static INSTALLED: OnceLock<bool> = OnceLock::new();

/// Install the test subscriber. Returns whether this process ended up with
/// our subscriber (false if another global subscriber was set first).
pub fn init_test_logging() -> bool {
    *INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .compact()
            .try_init()
            .is_ok()
    })
}
