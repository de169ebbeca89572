//! Structured logging hooks.
//!
//! With the `tracing` feature, the `tracing` event macros are re-exported so
//! downstream crates can log through `livebus_core::debug!` and friends
//! without naming `tracing` directly. Without it, this module is empty.
//!
//! The `tracing-json` feature adds [`init_json_subscriber`], which installs a
//! global JSON subscriber filtered by `RUST_LOG` (default `info`).

#[cfg(feature = "tracing")]
pub use tracing::{debug, error, info, trace, warn};

/// Install a JSON-formatting global subscriber honoring `RUST_LOG`.
///
/// Returns `false` if a global subscriber was already installed.
#[cfg(feature = "tracing-json")]
pub fn init_json_subscriber() -> bool {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}

#[cfg(all(test, feature = "tracing-json"))]
mod tests {
    use super::*;

    #[test]
    fn second_init_reports_existing_subscriber() {
        let _ = init_json_subscriber();
        assert!(!init_json_subscriber());
    }
}
