//! Liveness states, sources, and a manually driven reference source.
//!
//! A liveness source is an external state machine (a screen, a session, a
//! worker) whose state decides whether its consumers may receive values.
//! The bus only needs three things from it: the current state, a way to be
//! told about transitions, and a stable identity.
//!
//! # Invariants
//!
//! 1. States are totally ordered:
//!    `Destroyed < Initialized < Created < Started < Resumed`.
//! 2. `Destroyed` is terminal. After a source reports it, no further
//!    observer callbacks fire.
//! 3. Sources never hold internal locks while invoking observers, so an
//!    observer may query or mutate the source re-entrantly.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// State of a liveness source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LivenessState {
    /// Terminal. The source will never become live again.
    Destroyed,
    /// Constructed but not yet created.
    Initialized,
    /// Created; the default minimum for delivery.
    Created,
    /// Started (visible).
    Started,
    /// Resumed (foreground, interactive).
    Resumed,
}

impl LivenessState {
    /// All states in ascending order.
    pub const ALL: [LivenessState; 5] = [
        Self::Destroyed,
        Self::Initialized,
        Self::Created,
        Self::Started,
        Self::Resumed,
    ];

    /// Whether `self` is at or above `threshold`.
    #[inline]
    #[must_use]
    pub fn is_at_least(self, threshold: LivenessState) -> bool {
        self >= threshold
    }

    /// Whether this is the terminal state.
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Destroyed
    }

    /// Lowercase name, as accepted by [`FromStr`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Destroyed => "destroyed",
            Self::Initialized => "initialized",
            Self::Created => "created",
            Self::Started => "started",
            Self::Resumed => "resumed",
        }
    }
}

impl fmt::Display for LivenessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A string did not name a [`LivenessState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStateError(pub String);

impl fmt::Display for ParseStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown liveness state: {}", self.0)
    }
}

impl std::error::Error for ParseStateError {}

impl FromStr for LivenessState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == lower)
            .ok_or_else(|| ParseStateError(s.to_string()))
    }
}

/// Stable identity of a liveness source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(u64);

impl SourceId {
    /// Allocate a process-unique id.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap an externally assigned id.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Handle returned by [`LivenessSource::add_observer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverKey(u64);

impl ObserverKey {
    /// Wrap a source-assigned key.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw key.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Receives every state transition of a source it is attached to.
pub trait LivenessObserver: Send + Sync {
    /// Called after the source moved to `state`.
    fn on_state_changed(&self, state: LivenessState);
}

/// An external liveness state machine.
pub trait LivenessSource: Send + Sync {
    /// Stable identity, used to bind and bulk-remove subscriptions.
    fn id(&self) -> SourceId;

    /// The state right now.
    fn current_state(&self) -> LivenessState;

    /// Attach an observer. Sources may, but need not, replay the current
    /// state to the new observer.
    fn add_observer(&self, observer: Arc<dyn LivenessObserver>) -> ObserverKey;

    /// Detach an observer. Unknown keys are ignored.
    fn remove_observer(&self, key: ObserverKey);
}

struct LifecycleInner {
    state: LivenessState,
    observers: BTreeMap<ObserverKey, Arc<dyn LivenessObserver>>,
    next_key: u64,
}

/// A liveness source driven by explicit [`move_to`](Self::move_to) calls.
///
/// Starts in [`LivenessState::Initialized`]. Observers are notified in
/// attachment order, outside the internal lock. An observer detached by an
/// earlier observer during the same notification is skipped.
pub struct LifecycleRegistry {
    id: SourceId,
    inner: Mutex<LifecycleInner>,
}

impl fmt::Debug for LifecycleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("LifecycleRegistry")
            .field("id", &self.id)
            .field("state", &inner.state)
            .field("observer_count", &inner.observers.len())
            .finish()
    }
}

impl Default for LifecycleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleRegistry {
    /// Create a source in the `Initialized` state.
    #[must_use]
    pub fn new() -> Self {
        Self::with_state(LivenessState::Initialized)
    }

    /// Create a source already in `state`.
    #[must_use]
    pub fn with_state(state: LivenessState) -> Self {
        Self {
            id: SourceId::next(),
            inner: Mutex::new(LifecycleInner {
                state,
                observers: BTreeMap::new(),
                next_key: 0,
            }),
        }
    }

    /// Move to `state` and notify observers.
    ///
    /// Returns `false` without notifying if the state is unchanged or the
    /// source was already destroyed. Moving to `Destroyed` detaches every
    /// observer after the final notification.
    pub fn move_to(&self, state: LivenessState) -> bool {
        let keys: Vec<ObserverKey> = {
            let mut inner = self.lock();
            if inner.state.is_terminal() || inner.state == state {
                return false;
            }
            inner.state = state;
            inner.observers.keys().copied().collect()
        };

        for key in keys {
            let observer = self.lock().observers.get(&key).cloned();
            if let Some(observer) = observer {
                observer.on_state_changed(state);
            }
        }

        if state.is_terminal() {
            self.lock().observers.clear();
        }
        true
    }

    /// Number of attached observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }

    fn lock(&self) -> MutexGuard<'_, LifecycleInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LivenessSource for LifecycleRegistry {
    fn id(&self) -> SourceId {
        self.id
    }

    fn current_state(&self) -> LivenessState {
        self.lock().state
    }

    fn add_observer(&self, observer: Arc<dyn LivenessObserver>) -> ObserverKey {
        let mut inner = self.lock();
        let key = ObserverKey(inner.next_key);
        inner.next_key += 1;
        if !inner.state.is_terminal() {
            inner.observers.insert(key, observer);
        }
        key
    }

    fn remove_observer(&self, key: ObserverKey) {
        self.lock().observers.remove(&key);
    }
}
