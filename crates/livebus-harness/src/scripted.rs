#![forbid(unsafe_code)]

//! Liveness source with scripted behavior.
//!
//! Unlike `LifecycleRegistry`, a [`ScriptedSource`] lets a test decide when
//! observers hear about a change:
//!
//! | Call | State | Observers |
//! |------|-------|-----------|
//! | [`set_state`](ScriptedSource::set_state) | changed | not notified |
//! | [`emit`](ScriptedSource::emit) | changed | notified with the new state |
//! | [`script`](ScriptedSource::script) | changes on later queries | not notified |
//!
//! Scripted states are consumed one per `current_state` query, which models
//! a lifecycle that moves while a transition is being handled.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use livebus_core::{LivenessObserver, LivenessSource, LivenessState, ObserverKey, SourceId};

struct ScriptedInner {
    state: LivenessState,
    script: VecDeque<LivenessState>,
    observers: BTreeMap<ObserverKey, Arc<dyn LivenessObserver>>,
    next_key: u64,
}

/// Test liveness source.
pub struct ScriptedSource {
    id: SourceId,
    queries: AtomicUsize,
    inner: Mutex<ScriptedInner>,
}

impl fmt::Debug for ScriptedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("ScriptedSource")
            .field("id", &self.id)
            .field("state", &inner.state)
            .field("scripted", &inner.script.len())
            .field("observers", &inner.observers.len())
            .finish()
    }
}

impl ScriptedSource {
    /// Create a source in `state`.
    #[must_use]
    pub fn new(state: LivenessState) -> Arc<Self> {
        Arc::new(Self {
            id: SourceId::next(),
            queries: AtomicUsize::new(0),
            inner: Mutex::new(ScriptedInner {
                state,
                script: VecDeque::new(),
                observers: BTreeMap::new(),
                next_key: 0,
            }),
        })
    }

    /// Change the state without notifying anyone.
    pub fn set_state(&self, state: LivenessState) {
        self.lock().state = state;
    }

    /// Queue states that successive `current_state` queries move through.
    pub fn script(&self, states: impl IntoIterator<Item = LivenessState>) {
        self.lock().script.extend(states);
    }

    /// Change the state and notify every observer, outside the lock.
    ///
    /// Emitting `Destroyed` detaches all observers afterwards.
    pub fn emit(&self, state: LivenessState) {
        let observers: Vec<Arc<dyn LivenessObserver>> = {
            let mut inner = self.lock();
            inner.state = state;
            inner.observers.values().cloned().collect()
        };
        for observer in observers {
            observer.on_state_changed(state);
        }
        if state.is_terminal() {
            self.lock().observers.clear();
        }
    }

    /// Number of `current_state` queries so far.
    #[must_use]
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Number of scripted states not yet consumed.
    #[must_use]
    pub fn remaining_script(&self) -> usize {
        self.lock().script.len()
    }

    /// Number of attached observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptedInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LivenessSource for ScriptedSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn current_state(&self) -> LivenessState {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.lock();
        if let Some(next) = inner.script.pop_front() {
            inner.state = next;
        }
        inner.state
    }

    fn add_observer(&self, observer: Arc<dyn LivenessObserver>) -> ObserverKey {
        let mut inner = self.lock();
        let key = ObserverKey::from_raw(inner.next_key);
        inner.next_key += 1;
        inner.observers.insert(key, observer);
        key
    }

    fn remove_observer(&self, key: ObserverKey) {
        self.lock().observers.remove(&key);
    }
}
