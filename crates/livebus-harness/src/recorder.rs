#![forbid(unsafe_code)]

//! Delivery recorders.
//!
//! Both recorders hand out callbacks that satisfy the bus's
//! `Fn(&T) + Send + Sync + 'static` bound and can be cloned freely; every
//! clone appends to the same storage.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::json;

fn lock<V>(m: &Mutex<V>) -> MutexGuard<'_, V> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Collects every value delivered to one subscriber.
pub struct Recorder<T> {
    values: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            values: Arc::clone(&self.values),
        }
    }
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self {
            values: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Recorder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Recorder").field(&*lock(&self.values)).finish()
    }
}

impl<T: Clone + Send + 'static> Recorder<T> {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A subscriber callback that records each delivered value.
    pub fn callback(&self) -> impl Fn(&T) + Send + Sync + 'static {
        let values = Arc::clone(&self.values);
        move |value: &T| lock(&values).push(value.clone())
    }

    /// Everything recorded so far, in delivery order.
    #[must_use]
    pub fn values(&self) -> Vec<T> {
        lock(&self.values).clone()
    }

    /// Number of deliveries.
    #[must_use]
    pub fn count(&self) -> usize {
        lock(&self.values).len()
    }

    /// The most recent delivery.
    #[must_use]
    pub fn last(&self) -> Option<T> {
        lock(&self.values).last().cloned()
    }

    /// Drain the recorded values.
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *lock(&self.values))
    }
}

/// One delivery in an [`EventLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedEvent {
    /// Position in the log, starting at 0.
    pub seq: u64,
    /// Label of the receiving subscriber.
    pub subscriber: String,
    /// `Debug` rendering of the delivered value.
    pub value: String,
}

/// Ordered delivery log shared by several subscribers.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<LoggedEvent>>>,
}

impl EventLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A callback that logs deliveries under `subscriber`.
    pub fn callback<T: fmt::Debug + 'static>(
        &self,
        subscriber: impl Into<String>,
    ) -> impl Fn(&T) + Send + Sync + 'static {
        let events = Arc::clone(&self.events);
        let subscriber = subscriber.into();
        move |value: &T| {
            let mut events = lock(&events);
            let seq = events.len() as u64;
            events.push(LoggedEvent {
                seq,
                subscriber: subscriber.clone(),
                value: format!("{value:?}"),
            });
        }
    }

    /// All events in delivery order.
    #[must_use]
    pub fn events(&self) -> Vec<LoggedEvent> {
        lock(&self.events).clone()
    }

    /// `(subscriber, value)` pairs in delivery order.
    #[must_use]
    pub fn pairs(&self) -> Vec<(String, String)> {
        lock(&self.events)
            .iter()
            .map(|e| (e.subscriber.clone(), e.value.clone()))
            .collect()
    }

    /// Values delivered to `subscriber`, in order.
    #[must_use]
    pub fn values_for(&self, subscriber: &str) -> Vec<String> {
        lock(&self.events)
            .iter()
            .filter(|e| e.subscriber == subscriber)
            .map(|e| e.value.clone())
            .collect()
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    /// Whether nothing was logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One JSON object per line: `{"seq":..,"subscriber":..,"value":..}`.
    #[must_use]
    pub fn to_jsonl(&self) -> String {
        let mut out = String::new();
        for event in lock(&self.events).iter() {
            let line = json!({
                "seq": event.seq,
                "subscriber": event.subscriber,
                "value": event.value,
            });
            out.push_str(&line.to_string());
            out.push('\n');
        }
        out
    }
}
