#![forbid(unsafe_code)]

//! Runtime: the versioned single-value bus and its delivery engine.
//!
//! # Role in livebus
//! `livebus-runtime` owns the value, its version, and the subscriber table.
//! It depends on `livebus-core` for the liveness and executor contracts and
//! on nothing application-specific.
//!
//! # Primary responsibilities
//! - **LiveBus**: publish on the owning context, coalesced publish from any
//!   thread, liveness-gated and optionally sticky delivery.
//! - **BusHub**: named buses created on first use.
//! - **BusConfig**: activation threshold and engine bounds, with env overrides.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use livebus_core::{LifecycleRegistry, LivenessState, LoopExecutor};
//! use livebus_runtime::{LiveBus, SubscriberId};
//!
//! let executor = Arc::new(LoopExecutor::for_current_thread());
//! let bus: LiveBus<u32> = LiveBus::new(executor);
//! let screen = Arc::new(LifecycleRegistry::new());
//!
//! bus.subscribe_sticky(SubscriberId::next(), screen.clone(), |v| println!("got {v}"))
//!     .unwrap();
//! bus.publish(5).unwrap(); // screen not created yet: held back
//! screen.move_to(LivenessState::Resumed); // sticky replay prints "got 5"
//! ```

pub mod config;
pub mod error;
pub mod hub;
pub mod reactive;

pub use config::BusConfig;
pub use error::BusError;
pub use hub::BusHub;
pub use reactive::{
    Callback, LiveBus, PendingSlot, Snapshot, SubscriberId, SubscriptionInfo, Version,
};
