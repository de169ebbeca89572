#![forbid(unsafe_code)]

//! Versioned single-value bus with liveness-gated delivery.
//!
//! # Design
//!
//! [`LiveBus<T>`] holds one current value and a version that increases by
//! exactly one per publish. Subscribers are delivered the current value when
//! they are active and have not yet seen its version. Three pieces of state
//! are kept apart:
//!
//! - the **snapshot** (value + version) behind an `RwLock`, readable from any
//!   thread as one unit;
//! - the **engine state** (registry, dispatch flags) behind a mutex that is
//!   never held across a callback; queries from other threads take it only
//!   briefly;
//! - the **pending slot** used to coalesce publishes from other threads.
//!
//! # Dispatch
//!
//! A dispatch request that arrives while a pass is running (from a callback
//! that publishes, subscribes, or flips liveness) only marks the pass
//! invalidated. The running loop notices, abandons its pass, and starts a
//! fresh broadcast from the first registry entry. It stops once a pass
//! completes without invalidation. Per-record version checks make the
//! restarted pass skip everyone already served.
//!
//! # Failure Modes
//!
//! - **Wrong context**: owning-context operations return
//!   [`BusError::NotOwningContext`] without touching state.
//! - **Panicking subscriber**: the panic propagates to the publishing caller;
//!   the dispatching flag is reset on unwind so later publishes still run.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use livebus_core::{LivenessSource, OwningExecutor, SourceId, Task, ensure_owning_context};
use tracing::{debug, trace, warn};

use super::adapter::LivenessAdapter;
use super::pending::PendingSlot;
use super::registry::{Cursor, Registry};
use super::subscription::{Binding, Callback, SubscriberId, SubscriptionRecord, Version};
use crate::config::BusConfig;
use crate::error::BusError;

/// The current value and its version, read as one unit.
#[derive(Debug)]
pub struct Snapshot<T> {
    /// Last published value, or `None` if nothing was ever published.
    pub value: Option<Arc<T>>,
    /// Version of `value`; [`Version::START`] when unset.
    pub version: Version,
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            version: self.version,
        }
    }
}

/// Point-in-time view of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionInfo {
    /// Last version delivered to the subscriber.
    pub last_seen: Version,
    /// Whether the subscriber may currently receive values.
    pub active: bool,
    /// Whether it replays the latest value on activation.
    pub sticky: bool,
    /// The liveness source it is bound to, if any.
    pub source: Option<SourceId>,
}

struct EngineState<T> {
    registry: Registry<SubscriberId, SubscriptionRecord<T>>,
    dispatching: bool,
    invalidated: bool,
    active_count: usize,
    next_epoch: u64,
}

pub(super) struct BusInner<T> {
    executor: Arc<dyn OwningExecutor>,
    config: BusConfig,
    current: RwLock<Snapshot<T>>,
    state: Mutex<EngineState<T>>,
    pending: PendingSlot<T>,
}

impl<T> BusInner<T> {
    fn lock_state(&self) -> MutexGuard<'_, EngineState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_current(&self) -> Snapshot<T> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn compact_if_idle(&self, state: &mut EngineState<T>) {
        if !state.dispatching && state.registry.tombstones() > self.config.compact_threshold {
            state.registry.compact();
        }
    }
}

impl<T> Drop for BusInner<T> {
    /// Detach every remaining subscriber so its source releases the adapter.
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        let ids: Vec<SubscriberId> = state.registry.keys().collect();
        for id in ids {
            if let Some(mut record) = state.registry.remove(&id) {
                record.binding.detach();
            }
        }
    }
}

/// Flip `record.active`, keeping the active count in step.
///
/// Returns whether the flag changed.
fn set_active<T>(record: &mut SubscriptionRecord<T>, active_count: &mut usize, active: bool) -> bool {
    if record.active == active {
        return false;
    }
    record.active = active;
    if active {
        *active_count += 1;
    } else {
        *active_count -= 1;
    }
    true
}

/// Clears the dispatching flag when a dispatch loop exits, including by
/// unwinding out of a subscriber callback.
struct DispatchGuard<'a, T> {
    inner: &'a BusInner<T>,
}

impl<T> Drop for DispatchGuard<'_, T> {
    fn drop(&mut self) {
        let mut state = self.inner.lock_state();
        state.dispatching = false;
        state.invalidated = false;
        self.inner.compact_if_idle(&mut state);
    }
}

/// A shared, versioned single-value bus.
///
/// Cloning a `LiveBus` creates a new handle to the **same** bus.
///
/// # Invariants
///
/// 1. `version` increases by exactly 1 per successful publish.
/// 2. A subscriber is never delivered the same version twice.
/// 3. Only active subscribers receive values.
/// 4. At most one cross-thread value is buffered; newer replaces older.
pub struct LiveBus<T> {
    pub(super) inner: Arc<BusInner<T>>,
}

impl<T> Clone for LiveBus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for LiveBus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let version = self.inner.read_current().version;
        let state = self.inner.lock_state();
        f.debug_struct("LiveBus")
            .field("version", &version)
            .field("subscriber_count", &state.registry.len())
            .field("active_count", &state.active_count)
            .field("pending", &self.inner.pending.is_occupied())
            .finish()
    }
}

impl<T: Send + Sync + 'static> LiveBus<T> {
    /// Create a bus with no value.
    #[must_use]
    pub fn new(executor: Arc<dyn OwningExecutor>) -> Self {
        Self::with_config(executor, BusConfig::default(), None)
    }

    /// Create a bus holding `value` at [`Version::FIRST`].
    #[must_use]
    pub fn with_value(executor: Arc<dyn OwningExecutor>, value: T) -> Self {
        Self::with_config(executor, BusConfig::default(), Some(value))
    }

    /// Create a bus with explicit configuration and optional initial value.
    #[must_use]
    pub fn with_config(
        executor: Arc<dyn OwningExecutor>,
        config: BusConfig,
        initial: Option<T>,
    ) -> Self {
        let snapshot = match initial {
            Some(value) => Snapshot {
                value: Some(Arc::new(value)),
                version: Version::FIRST,
            },
            None => Snapshot {
                value: None,
                version: Version::START,
            },
        };
        Self {
            inner: Arc::new(BusInner {
                executor,
                config,
                current: RwLock::new(snapshot),
                state: Mutex::new(EngineState {
                    registry: Registry::new(),
                    dispatching: false,
                    invalidated: false,
                    active_count: 0,
                    next_epoch: 0,
                }),
                pending: PendingSlot::new(),
            }),
        }
    }

    pub(super) fn from_inner(inner: Arc<BusInner<T>>) -> Self {
        Self { inner }
    }

    pub(super) fn downgrade(&self) -> WeakBus<T> {
        Arc::downgrade(&self.inner)
    }

    pub(super) fn is_owning_context(&self) -> bool {
        self.inner.executor.is_owning_context()
    }

    pub(super) fn post(&self, task: Task) {
        self.inner.executor.post(task);
    }

    /// The configuration this bus was built with.
    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Subscribe `id`, gated by `source`. Receives only values published
    /// while it is active.
    ///
    /// Re-subscribing the same id to the same source is a no-op; to a
    /// different source it is [`BusError::ConflictingRegistration`]. A source
    /// that is already destroyed is ignored.
    pub fn subscribe<F>(
        &self,
        id: SubscriberId,
        source: Arc<dyn LivenessSource>,
        callback: F,
    ) -> Result<(), BusError>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.register_bound(id, source, false, Arc::new(callback))
    }

    /// Like [`subscribe`](Self::subscribe), but also replays the latest
    /// unseen value whenever the subscriber becomes active.
    pub fn subscribe_sticky<F>(
        &self,
        id: SubscriberId,
        source: Arc<dyn LivenessSource>,
        callback: F,
    ) -> Result<(), BusError>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.register_bound(id, source, true, Arc::new(callback))
    }

    /// Subscribe `id` without a liveness source. The subscriber is active
    /// immediately and stays registered until [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe_forever<F>(
        &self,
        id: SubscriberId,
        sticky: bool,
        callback: F,
    ) -> Result<(), BusError>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        ensure_owning_context(self.inner.executor.as_ref(), "subscribe_forever")?;
        let epoch = {
            let mut state = self.inner.lock_state();
            let epoch = state.next_epoch;
            state.next_epoch += 1;
            let record = SubscriptionRecord::new(Arc::new(callback), Binding::Always, epoch, sticky);
            if let Some(existing) = state.registry.insert_if_absent(id, record) {
                if existing.binding.source_id().is_some() {
                    return Err(BusError::ConflictingRegistration { subscriber: id });
                }
                return Ok(());
            }
            epoch
        };
        debug!(%id, sticky, "subscribed without liveness source");
        self.active_state_changed(id, epoch, true);
        Ok(())
    }

    fn register_bound(
        &self,
        id: SubscriberId,
        source: Arc<dyn LivenessSource>,
        sticky: bool,
        callback: Callback<T>,
    ) -> Result<(), BusError> {
        ensure_owning_context(self.inner.executor.as_ref(), "subscribe")?;
        let source_id = source.id();
        if source.current_state().is_terminal() {
            debug!(%id, source = source_id.get(), "liveness source already destroyed; ignoring subscription");
            return Ok(());
        }

        let epoch = {
            let mut state = self.inner.lock_state();
            let epoch = state.next_epoch;
            state.next_epoch += 1;
            let record = SubscriptionRecord::new(
                callback,
                Binding::liveness(Arc::clone(&source)),
                epoch,
                sticky,
            );
            if let Some(existing) = state.registry.insert_if_absent(id, record) {
                if !existing.binding.is_attached_to(source_id) {
                    return Err(BusError::ConflictingRegistration { subscriber: id });
                }
                return Ok(());
            }
            epoch
        };

        let adapter = Arc::new(LivenessAdapter::new(
            self.downgrade(),
            id,
            epoch,
            Arc::clone(&source),
        ));
        let key = source.add_observer(adapter.clone());
        let attached = {
            let mut state = self.inner.lock_state();
            match state.registry.get_mut(&id) {
                Some(record) if record.epoch == epoch => {
                    if let Binding::Liveness { key: slot, .. } = &mut record.binding {
                        *slot = Some(key);
                    }
                    true
                }
                _ => false,
            }
        };
        if !attached {
            // Removed while attaching (e.g. the source replayed `Destroyed`).
            source.remove_observer(key);
            return Ok(());
        }

        debug!(%id, source = source_id.get(), sticky, "subscribed");
        adapter.catch_up();
        Ok(())
    }

    /// Remove `id`. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> Result<bool, BusError> {
        ensure_owning_context(self.inner.executor.as_ref(), "unsubscribe")?;
        Ok(self.remove_record(id, None))
    }

    /// Remove every subscriber bound to `source`. Returns how many.
    pub fn unsubscribe_all(&self, source: SourceId) -> Result<usize, BusError> {
        ensure_owning_context(self.inner.executor.as_ref(), "unsubscribe_all")?;
        let ids: Vec<SubscriberId> = self
            .inner
            .lock_state()
            .registry
            .iter()
            .filter(|(_, record)| record.binding.is_attached_to(source))
            .map(|(id, _)| id)
            .collect();
        Ok(ids
            .into_iter()
            .filter(|id| self.remove_record(*id, None))
            .count())
    }

    /// Remove `id` if present and, when `epoch` is given, still from that
    /// registration. The record is detached from its source outside the lock.
    pub(super) fn remove_record(&self, id: SubscriberId, epoch: Option<u64>) -> bool {
        let mut record = {
            let mut state = self.inner.lock_state();
            let current = state
                .registry
                .get(&id)
                .is_some_and(|record| epoch.is_none_or(|e| record.epoch == e));
            if !current {
                return false;
            }
            let EngineState {
                registry,
                active_count,
                ..
            } = &mut *state;
            let Some(mut record) = registry.remove(&id) else {
                return false;
            };
            set_active(&mut record, active_count, false);
            self.inner.compact_if_idle(&mut state);
            record
        };
        record.binding.detach();
        debug!(%id, "unsubscribed");
        true
    }

    /// Publish `value` as the next version and deliver it to every active
    /// subscriber that has not seen it. Returns the new version.
    pub fn publish(&self, value: T) -> Result<Version, BusError> {
        ensure_owning_context(self.inner.executor.as_ref(), "publish")?;
        let version = {
            let mut current = self
                .inner
                .current
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            current.version = current.version.next();
            current.value = Some(Arc::new(value));
            current.version
        };
        debug!(%version, "published");
        self.dispatch(None);
        Ok(version)
    }

    /// Publish from any thread.
    ///
    /// The value is buffered and one publish is scheduled on the owning
    /// context. Calls made before that publish runs replace the buffered
    /// value instead of scheduling again. Returns whether this call
    /// scheduled the publish.
    pub fn publish_async(&self, value: T) -> bool {
        if !self.inner.pending.offer(value) {
            trace!("coalesced into pending publish");
            return false;
        }
        let bus = self.clone();
        self.inner
            .executor
            .post(Box::new(move || bus.drain_pending()));
        true
    }

    fn drain_pending(&self) {
        let Some(value) = self.inner.pending.take() else {
            return;
        };
        if let Err(err) = self.publish(value) {
            warn!(%err, "deferred publish dropped");
        }
    }

    /// The last published value, if any. Callable from any thread.
    #[must_use]
    pub fn value(&self) -> Option<Arc<T>> {
        self.inner.read_current().value
    }

    /// The current version. Callable from any thread.
    #[must_use]
    pub fn version(&self) -> Version {
        self.inner.read_current().version
    }

    /// Value and version as one consistent read.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot<T> {
        self.inner.read_current()
    }

    /// Whether any subscriber is registered.
    #[must_use]
    pub fn has_subscribers(&self) -> bool {
        !self.inner.lock_state().registry.is_empty()
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock_state().registry.len()
    }

    /// Whether any registered subscriber is currently active.
    #[must_use]
    pub fn has_active_subscribers(&self) -> bool {
        self.inner.lock_state().active_count > 0
    }

    /// Delivery state of `id`, if registered.
    #[must_use]
    pub fn subscription(&self, id: SubscriberId) -> Option<SubscriptionInfo> {
        let state = self.inner.lock_state();
        state.registry.get(&id).map(|record| SubscriptionInfo {
            last_seen: record.last_seen,
            active: record.active,
            sticky: record.sticky,
            source: record.binding.source_id(),
        })
    }

    /// Apply an activity change for `id` from registration `epoch`.
    ///
    /// Becoming active replays the current value to sticky subscribers.
    pub(super) fn active_state_changed(&self, id: SubscriberId, epoch: u64, active: bool) {
        let replay = {
            let mut state = self.inner.lock_state();
            let EngineState {
                registry,
                active_count,
                ..
            } = &mut *state;
            let Some(record) = registry.get_mut(&id).filter(|r| r.epoch == epoch) else {
                return;
            };
            if !set_active(record, active_count, active) {
                return;
            }
            active && record.sticky
        };
        if replay {
            trace!(%id, "sticky replay");
            self.dispatch(Some(id));
        }
    }

    /// Run the notify loop, for `initiator` alone or for everyone.
    fn dispatch(&self, initiator: Option<SubscriberId>) {
        {
            let mut state = self.inner.lock_state();
            if state.dispatching {
                state.invalidated = true;
                return;
            }
            state.dispatching = true;
        }
        let _guard = DispatchGuard { inner: &self.inner };

        let mut initiator = initiator;
        loop {
            self.inner.lock_state().invalidated = false;
            if let Some(id) = initiator.take() {
                self.consider_notify(id);
            } else {
                let mut cursor = Cursor::start();
                loop {
                    let next = self.inner.lock_state().registry.advance(&mut cursor);
                    let Some(id) = next else {
                        break;
                    };
                    self.consider_notify(id);
                    if self.inner.lock_state().invalidated {
                        break;
                    }
                }
            }
            if !self.inner.lock_state().invalidated {
                break;
            }
            trace!("dispatch pass invalidated; restarting");
        }
    }

    /// Deliver the current value to `id` if it is active, still eligible,
    /// and behind the current version.
    fn consider_notify(&self, id: SubscriberId) {
        let threshold = self.inner.config.activation_threshold;
        let (callback, value, version) = {
            let mut state = self.inner.lock_state();
            let EngineState {
                registry,
                active_count,
                ..
            } = &mut *state;
            let Some(record) = registry.get_mut(&id) else {
                return;
            };
            if !record.active {
                return;
            }
            if !record.binding.should_be_active(threshold) {
                set_active(record, active_count, false);
                return;
            }
            let snapshot = self.inner.read_current();
            if !record.is_behind(snapshot.version) {
                return;
            }
            let Some(value) = snapshot.value else {
                return;
            };
            record.last_seen = snapshot.version;
            (Arc::clone(&record.callback), value, snapshot.version)
        };
        trace!(%id, %version, "delivering");
        callback(&value);
    }
}

/// Weak handle used by liveness adapters so a source never keeps a bus alive.
pub(super) type WeakBus<T> = Weak<BusInner<T>>;
