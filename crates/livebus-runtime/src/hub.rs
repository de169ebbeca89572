#![forbid(unsafe_code)]

//! Keyed collection of independent buses.
//!
//! A [`BusHub`] lazily creates one [`LiveBus`] per string key, each built
//! with the hub's executor and configuration. Lookups take a read lock and
//! only fall back to the write lock when the key is missing, re-checking
//! under it so concurrent first accesses agree on one bus.
//!
//! The value type is fixed by the first access to a key; asking for the same
//! key with another type is [`BusError::TypeMismatch`].

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use livebus_core::OwningExecutor;
use tracing::debug;

use crate::config::BusConfig;
use crate::error::BusError;
use crate::reactive::LiveBus;

struct HubEntry {
    bus: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl HubEntry {
    fn channel<T: Send + Sync + 'static>(&self, key: &str) -> Result<LiveBus<T>, BusError> {
        self.bus
            .downcast_ref::<LiveBus<T>>()
            .cloned()
            .ok_or_else(|| BusError::TypeMismatch {
                key: key.to_owned(),
                stored: self.type_name,
                requested: type_name::<T>(),
            })
    }
}

/// Buses addressed by name.
pub struct BusHub {
    executor: Arc<dyn OwningExecutor>,
    config: BusConfig,
    channels: RwLock<HashMap<String, HubEntry>>,
}

impl fmt::Debug for BusHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusHub")
            .field("config", &self.config)
            .field("keys", &self.keys())
            .finish_non_exhaustive()
    }
}

impl BusHub {
    /// Create an empty hub whose buses use the default configuration.
    #[must_use]
    pub fn new(executor: Arc<dyn OwningExecutor>) -> Self {
        Self::with_config(executor, BusConfig::default())
    }

    /// Create an empty hub whose buses use `config`.
    #[must_use]
    pub fn with_config(executor: Arc<dyn OwningExecutor>, config: BusConfig) -> Self {
        Self {
            executor,
            config,
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// The bus stored under `key`, created empty on first access.
    ///
    /// Callable from any thread. The returned handle shares state with every
    /// other handle for the same key.
    pub fn channel<T: Send + Sync + 'static>(&self, key: &str) -> Result<LiveBus<T>, BusError> {
        {
            let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = channels.get(key) {
                return entry.channel(key);
            }
        }

        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = channels.entry(key.to_owned()).or_insert_with(|| {
            debug!(key, value_type = type_name::<T>(), "channel created");
            HubEntry {
                bus: Arc::new(LiveBus::<T>::with_config(
                    Arc::clone(&self.executor),
                    self.config,
                    None,
                )),
                type_name: type_name::<T>(),
            }
        });
        entry.channel(key)
    }

    /// Whether a bus exists under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Forget the bus under `key`. Existing handles keep working but are no
    /// longer reachable through the hub. Returns whether a bus was removed.
    pub fn remove(&self, key: &str) -> bool {
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    /// Number of buses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the hub holds no buses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}
