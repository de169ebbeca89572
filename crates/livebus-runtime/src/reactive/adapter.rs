#![forbid(unsafe_code)]

//! Bridges liveness transitions into a bus subscription.
//!
//! One [`LivenessAdapter`] is registered with the source per liveness-bound
//! subscription. It holds the bus weakly and tags every change with the
//! registration epoch, so transitions that arrive after the subscriber was
//! removed or re-registered are dropped.
//!
//! # Transition handling
//!
//! | Observed state | Action |
//! |----------------|--------|
//! | `Destroyed` | remove the subscription and detach |
//! | at or above threshold | mark active (sticky subscribers replay) |
//! | below threshold | mark inactive |
//!
//! After applying a change the source is polled again; if its state moved
//! during the change (a subscriber callback driving the lifecycle), the new
//! state is applied too. Polling stops once the state settles or after
//! `max_state_polls` rounds, in which case the source's own next
//! notification finishes the job.

use std::sync::Arc;

use livebus_core::{LivenessObserver, LivenessSource, LivenessState};
use tracing::{debug, trace, warn};

use super::live_bus::{LiveBus, WeakBus};
use super::subscription::SubscriberId;

pub(super) struct LivenessAdapter<T> {
    bus: WeakBus<T>,
    id: SubscriberId,
    epoch: u64,
    source: Arc<dyn LivenessSource>,
}

impl<T: Send + Sync + 'static> LivenessAdapter<T> {
    pub(super) fn new(
        bus: WeakBus<T>,
        id: SubscriberId,
        epoch: u64,
        source: Arc<dyn LivenessSource>,
    ) -> Self {
        Self {
            bus,
            id,
            epoch,
            source,
        }
    }

    /// Apply the source's current state right after registration.
    pub(super) fn catch_up(&self) {
        self.on_state_changed(self.source.current_state());
    }

    fn rebound(&self) -> Self {
        Self {
            bus: self.bus.clone(),
            id: self.id,
            epoch: self.epoch,
            source: Arc::clone(&self.source),
        }
    }
}

impl<T: Send + Sync + 'static> LivenessObserver for LivenessAdapter<T> {
    fn on_state_changed(&self, state: LivenessState) {
        let Some(inner) = self.bus.upgrade() else {
            return;
        };
        let bus = LiveBus::from_inner(inner);
        if !bus.is_owning_context() {
            trace!(id = %self.id, %state, "liveness change off the owning context; re-posting");
            let hop = self.rebound();
            bus.post(Box::new(move || hop.catch_up()));
            return;
        }
        bus.apply_liveness(self.id, self.epoch, self.source.as_ref(), state);
    }
}

impl<T: Send + Sync + 'static> LiveBus<T> {
    /// Fold a liveness transition (and any that follow while it is handled)
    /// into the subscription's activity.
    fn apply_liveness(
        &self,
        id: SubscriberId,
        epoch: u64,
        source: &dyn LivenessSource,
        state: LivenessState,
    ) {
        let threshold = self.config().activation_threshold;
        let max_polls = self.config().max_state_polls;
        let mut current = state;
        let mut previous = None;
        let mut polls = 0;
        while previous != Some(current) {
            if current.is_terminal() {
                if self.remove_record(id, Some(epoch)) {
                    debug!(%id, "liveness source destroyed; subscription removed");
                }
                return;
            }
            if polls == max_polls {
                warn!(%id, state = %current, polls, "liveness source still changing; waiting for its next transition");
                return;
            }
            polls += 1;
            previous = Some(current);
            self.active_state_changed(id, epoch, current.is_at_least(threshold));
            current = source.current_state();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BusConfig;
    use livebus_core::{LifecycleRegistry, LoopExecutor, ObserverKey, SourceId};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source that advances one state every time it is queried, forever
    /// toggling between `Started` and `Resumed`.
    struct Flapping {
        id: SourceId,
        queries: AtomicUsize,
    }

    impl LivenessSource for Flapping {
        fn id(&self) -> SourceId {
            self.id
        }
        fn current_state(&self) -> LivenessState {
            if self.queries.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                LivenessState::Started
            } else {
                LivenessState::Resumed
            }
        }
        fn add_observer(&self, _observer: Arc<dyn LivenessObserver>) -> ObserverKey {
            ObserverKey::from_raw(0)
        }
        fn remove_observer(&self, _key: ObserverKey) {}
    }

    #[test]
    fn destroyed_removes_subscription() {
        let executor = Arc::new(LoopExecutor::for_current_thread());
        let bus: LiveBus<u32> = LiveBus::new(executor);
        let lifecycle = Arc::new(LifecycleRegistry::new());
        let id = SubscriberId::next();
        bus.subscribe(id, lifecycle.clone(), |_| {}).unwrap();
        assert_eq!(lifecycle.observer_count(), 1);

        lifecycle.move_to(LivenessState::Destroyed);
        assert!(!bus.has_subscribers());
        assert_eq!(lifecycle.observer_count(), 0);
    }

    #[test]
    fn stale_epoch_is_ignored() {
        let executor = Arc::new(LoopExecutor::for_current_thread());
        let bus: LiveBus<u32> = LiveBus::new(executor);
        let lifecycle = Arc::new(LifecycleRegistry::with_state(LivenessState::Resumed));
        let id = SubscriberId::next();
        bus.subscribe(id, lifecycle.clone(), |_| {}).unwrap();

        let stale = LivenessAdapter::new(bus.downgrade(), id, u64::MAX, lifecycle.clone());
        stale.on_state_changed(LivenessState::Initialized);
        assert!(bus.subscription(id).unwrap().active);
        stale.on_state_changed(LivenessState::Destroyed);
        assert!(bus.has_subscribers());
    }

    #[test]
    fn dropped_bus_is_ignored() {
        let executor = Arc::new(LoopExecutor::for_current_thread());
        let lifecycle = Arc::new(LifecycleRegistry::with_state(LivenessState::Resumed));
        let bus: LiveBus<u32> = LiveBus::new(executor);
        bus.subscribe(SubscriberId::next(), lifecycle.clone(), |_| {})
            .unwrap();
        drop(bus);
        lifecycle.move_to(LivenessState::Started);
        lifecycle.move_to(LivenessState::Destroyed);
    }

    #[test]
    fn repoll_is_bounded() {
        let executor = Arc::new(LoopExecutor::for_current_thread());
        let config = BusConfig::default().with_max_state_polls(3);
        let bus: LiveBus<u32> = LiveBus::with_config(executor, config, Some(1));
        let source = Arc::new(Flapping {
            id: SourceId::next(),
            queries: AtomicUsize::new(0),
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = SubscriberId::next();
        bus.subscribe_sticky(id, source.clone(), move |v| sink.lock().unwrap().push(*v))
            .unwrap();

        // Already active, so each round costs exactly one re-poll.
        let before = source.queries.load(Ordering::SeqCst);
        bus.apply_liveness(id, 0, source.as_ref(), LivenessState::Started);
        assert_eq!(source.queries.load(Ordering::SeqCst) - before, 3);
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn below_threshold_deactivates() {
        let executor = Arc::new(LoopExecutor::for_current_thread());
        let config = BusConfig::default().with_activation_threshold(LivenessState::Started);
        let bus: LiveBus<u32> = LiveBus::with_config(executor, config, None);
        let lifecycle = Arc::new(LifecycleRegistry::with_state(LivenessState::Created));
        let id = SubscriberId::next();
        bus.subscribe(id, lifecycle.clone(), |_| {}).unwrap();
        assert!(!bus.subscription(id).unwrap().active);

        lifecycle.move_to(LivenessState::Resumed);
        assert!(bus.subscription(id).unwrap().active);
        lifecycle.move_to(LivenessState::Created);
        assert!(!bus.subscription(id).unwrap().active);
        assert!(!bus.has_active_subscribers());
    }
}
