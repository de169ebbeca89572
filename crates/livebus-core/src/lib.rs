#![forbid(unsafe_code)]

//! Core: liveness contracts, the owning-context executor, and context errors.
//!
//! # Role in livebus
//! `livebus-core` defines the collaborators the dispatch engine depends on
//! but does not own. The runtime (`livebus-runtime`) consumes these traits;
//! applications implement them for their own lifecycles and event loops.
//!
//! # Primary responsibilities
//! - **LivenessSource / LivenessObserver**: an external state machine that
//!   decides whether a consumer may currently receive values.
//! - **OwningExecutor**: the single logical context that serializes dispatch,
//!   plus the hand-off used by cross-thread publishes.
//! - **LifecycleRegistry / LoopExecutor**: small reference implementations of
//!   both contracts, usable in tests and simple applications.
//!
//! # How it fits in the system
//! The bus never inspects a lifecycle directly. It asks a [`LivenessSource`]
//! for its [`LivenessState`] and receives transitions through a
//! [`LivenessObserver`]; every authoritative mutation is checked against an
//! [`OwningExecutor`].

pub mod error;
pub mod executor;
pub mod liveness;
pub mod logging;

pub use error::ContextError;
pub use executor::{LoopExecutor, OwningExecutor, Task, ensure_owning_context};
pub use liveness::{
    LifecycleRegistry, LivenessObserver, LivenessSource, LivenessState, ObserverKey, SourceId,
};

// Re-export tracing macros at crate root for ergonomic use.
#[cfg(feature = "tracing")]
pub use logging::{debug, error, info, trace, warn};
