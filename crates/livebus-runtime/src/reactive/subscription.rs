#![forbid(unsafe_code)]

//! Per-subscriber delivery state.
//!
//! A [`SubscriptionRecord`] remembers the last version its subscriber saw,
//! whether it may currently receive values, whether it replays on
//! activation, and what it is bound to. The binding is a tagged variant
//! rather than a wrapper hierarchy: each kind answers the same three
//! questions (`is_attached_to`, `detach`, `should_be_active`).

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use livebus_core::{LivenessSource, LivenessState, ObserverKey, SourceId};

/// Subscriber callback. Receives the current value by reference.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Identity of a subscriber within a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
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

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber#{}", self.0)
    }
}

/// Monotonic identifier of a published value.
///
/// [`Version::START`] sits one below the first real version and means
/// "nothing published yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(i64);

impl Version {
    /// No value has been published.
    pub const START: Version = Version(-1);
    /// Version of the first value (or of an initial value).
    pub const FIRST: Version = Version(0);

    /// The version after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Whether a value exists at this version.
    #[must_use]
    pub const fn is_set(self) -> bool {
        self.0 >= 0
    }

    /// The raw counter.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_set() {
            write!(f, "v{}", self.0)
        } else {
            f.write_str("unset")
        }
    }
}

/// What a subscription's eligibility derives from.
pub(crate) enum Binding {
    /// Always eligible; removed only by explicit unsubscribe.
    Always,
    /// Eligible while the source is at or above the bus threshold.
    Liveness {
        source: Arc<dyn LivenessSource>,
        key: Option<ObserverKey>,
    },
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("Always"),
            Self::Liveness { source, key } => f
                .debug_struct("Liveness")
                .field("source", &source.id())
                .field("key", key)
                .finish(),
        }
    }
}

impl Binding {
    pub(crate) fn liveness(source: Arc<dyn LivenessSource>) -> Self {
        Self::Liveness { source, key: None }
    }

    pub(crate) fn source_id(&self) -> Option<SourceId> {
        match self {
            Self::Always => None,
            Self::Liveness { source, .. } => Some(source.id()),
        }
    }

    pub(crate) fn is_attached_to(&self, id: SourceId) -> bool {
        self.source_id() == Some(id)
    }

    /// Stop receiving transitions from the source.
    pub(crate) fn detach(&mut self) {
        if let Self::Liveness { source, key } = self {
            if let Some(key) = key.take() {
                source.remove_observer(key);
            }
        }
    }

    pub(crate) fn should_be_active(&self, threshold: LivenessState) -> bool {
        match self {
            Self::Always => true,
            Self::Liveness { source, .. } => source.current_state().is_at_least(threshold),
        }
    }
}

/// Delivery state for one subscriber.
pub(crate) struct SubscriptionRecord<T> {
    pub(crate) callback: Callback<T>,
    pub(crate) binding: Binding,
    /// Registration generation; late adapter callbacks carrying an older
    /// epoch are ignored.
    pub(crate) epoch: u64,
    pub(crate) last_seen: Version,
    pub(crate) active: bool,
    pub(crate) sticky: bool,
}

impl<T> SubscriptionRecord<T> {
    pub(crate) fn new(callback: Callback<T>, binding: Binding, epoch: u64, sticky: bool) -> Self {
        Self {
            callback,
            binding,
            epoch,
            last_seen: Version::START,
            active: false,
            sticky,
        }
    }

    /// Whether a delivery of `version` is due.
    pub(crate) fn is_behind(&self, version: Version) -> bool {
        self.last_seen < version
    }
}

impl<T> fmt::Debug for SubscriptionRecord<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRecord")
            .field("binding", &self.binding)
            .field("epoch", &self.epoch)
            .field("last_seen", &self.last_seen)
            .field("active", &self.active)
            .field("sticky", &self.sticky)
            .finish_non_exhaustive()
    }
}
