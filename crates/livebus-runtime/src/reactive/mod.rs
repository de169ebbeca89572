#![forbid(unsafe_code)]

//! Versioned single-value bus.
//!
//! - [`LiveBus`]: shared current value with a monotonic [`Version`] and
//!   liveness-gated delivery to subscribers.
//! - [`Registry`]: insertion-ordered subscriber table that tolerates
//!   mutation during iteration.
//! - [`PendingSlot`]: last-writer-wins buffer for publishes from other
//!   threads.
//!
//! # Architecture
//!
//! The bus handle wraps an `Arc`, so clones share one value. Subscribers are
//! plain callbacks keyed by [`SubscriberId`]; each one bound to a liveness
//! source is driven by an adapter registered with that source. Callbacks run
//! on the owning context with no bus lock held.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per publish; publishes are never
//!    de-duplicated by value.
//! 2. Subscribers are visited in registration order within a pass.
//! 3. A subscriber removed mid-pass is not visited again; one added mid-pass
//!    is visited by the restarted pass.
//! 4. A destroyed liveness source leaves no subscriber behind.

mod adapter;
pub mod live_bus;
pub mod pending;
pub mod registry;
pub mod subscription;

pub use live_bus::{LiveBus, Snapshot, SubscriptionInfo};
pub use pending::PendingSlot;
pub use registry::{Cursor, Registry};
pub use subscription::{Callback, SubscriberId, Version};
