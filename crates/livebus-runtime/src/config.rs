#![forbid(unsafe_code)]

//! Bus configuration.
//!
//! # Environment
//!
//! [`BusConfig::from_env`] reads:
//!
//! | Variable | Field | Accepted |
//! |----------|-------|----------|
//! | `LIVEBUS_ACTIVATION_STATE` | `activation_threshold` | `initialized`, `created`, `started`, `resumed` |
//! | `LIVEBUS_MAX_STATE_POLLS` | `max_state_polls` | integer ≥ 1 |
//! | `LIVEBUS_COMPACT_THRESHOLD` | `compact_threshold` | integer |
//!
//! Unparseable values keep the default and log a warning.

use livebus_core::LivenessState;
use tracing::warn;

/// Configuration shared by every subscription on a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// Minimum liveness state for delivery. Default: `Created`.
    pub activation_threshold: LivenessState,
    /// Upper bound on re-polling a source whose state keeps changing while
    /// a transition is being handled. Default: 8.
    pub max_state_polls: u32,
    /// Removed registry slots tolerated before compaction. Default: 32.
    pub compact_threshold: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            activation_threshold: LivenessState::Created,
            max_state_polls: 8,
            compact_threshold: 32,
        }
    }
}

impl BusConfig {
    /// Set the activation threshold.
    ///
    /// `Destroyed` is terminal and can never gate delivery; it is raised to
    /// `Initialized`.
    #[must_use]
    pub fn with_activation_threshold(mut self, threshold: LivenessState) -> Self {
        self.activation_threshold = threshold.max(LivenessState::Initialized);
        self
    }

    /// Set the re-poll bound (at least 1).
    #[must_use]
    pub fn with_max_state_polls(mut self, polls: u32) -> Self {
        self.max_state_polls = polls.max(1);
        self
    }

    /// Set the tombstone count that triggers registry compaction.
    #[must_use]
    pub fn with_compact_threshold(mut self, threshold: usize) -> Self {
        self.compact_threshold = threshold;
        self
    }

    /// Defaults overridden by `LIVEBUS_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Defaults overridden through a custom environment lookup.
    #[must_use]
    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = get_env("LIVEBUS_ACTIVATION_STATE") {
            match raw.parse::<LivenessState>() {
                Ok(state) => config = config.with_activation_threshold(state),
                Err(err) => warn!(%err, "ignoring LIVEBUS_ACTIVATION_STATE"),
            }
        }
        if let Some(raw) = get_env("LIVEBUS_MAX_STATE_POLLS") {
            match raw.trim().parse::<u32>() {
                Ok(polls) => config = config.with_max_state_polls(polls),
                Err(err) => warn!(%err, value = %raw, "ignoring LIVEBUS_MAX_STATE_POLLS"),
            }
        }
        if let Some(raw) = get_env("LIVEBUS_COMPACT_THRESHOLD") {
            match raw.trim().parse::<usize>() {
                Ok(threshold) => config = config.with_compact_threshold(threshold),
                Err(err) => warn!(%err, value = %raw, "ignoring LIVEBUS_COMPACT_THRESHOLD"),
            }
        }
        config
    }
}
