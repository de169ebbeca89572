#![forbid(unsafe_code)]

//! Insertion-ordered registry that tolerates mutation during iteration.
//!
//! # Design
//!
//! Entries live in an append-only slot arena; a key→slot index gives O(1)
//! lookup. Removal leaves a tombstone instead of shifting, so a [`Cursor`]
//! (a plain slot position) stays valid across any number of inserts and
//! removals made while it is live:
//!
//! - inserts land after every existing slot, so an in-flight pass visits them;
//! - removed entries are tombstones, so a pass skips them.
//!
//! Tombstones are reclaimed by [`Registry::compact`], which renumbers slots
//! and therefore must only run while no cursor is in use.
//!
//! # Performance
//!
//! | Operation          | Complexity |
//! |--------------------|------------|
//! | `insert_if_absent` | O(1) amortized |
//! | `remove`           | O(1)       |
//! | `advance`          | O(tombstones skipped) |
//! | `compact`          | O(slots)   |

use std::collections::HashMap;
use std::hash::Hash;

/// Position of an in-progress pass over a [`Registry`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    next: usize,
}

impl Cursor {
    /// A cursor positioned before the first entry.
    #[must_use]
    pub const fn start() -> Self {
        Self { next: 0 }
    }
}

/// Insertion-ordered map with mutation-safe cursor iteration.
#[derive(Debug, Clone)]
pub struct Registry<K, V> {
    slots: Vec<Option<(K, V)>>,
    index: HashMap<K, usize>,
    tombstones: usize,
}

impl<K, V> Default for Registry<K, V> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
            tombstones: 0,
        }
    }
}

impl<K: Copy + Eq + Hash, V> Registry<K, V> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether there are no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of removed slots not yet reclaimed.
    #[must_use]
    pub fn tombstones(&self) -> usize {
        self.tombstones
    }

    /// Whether `key` has a live entry.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Borrow the entry for `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        let slot = *self.index.get(key)?;
        self.slots[slot].as_ref().map(|(_, v)| v)
    }

    /// Mutably borrow the entry for `key`.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let slot = *self.index.get(key)?;
        self.slots[slot].as_mut().map(|(_, v)| v)
    }

    /// Insert `value` under `key` unless an entry already exists.
    ///
    /// Returns the existing entry (and drops `value`) if `key` was present,
    /// or `None` after appending the new entry.
    pub fn insert_if_absent(&mut self, key: K, value: V) -> Option<&mut V> {
        if let Some(&slot) = self.index.get(&key) {
            return self.slots[slot].as_mut().map(|(_, v)| v);
        }
        self.index.insert(key, self.slots.len());
        self.slots.push(Some((key, value)));
        None
    }

    /// Remove and return the entry for `key`.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.index.remove(key)?;
        let (_, value) = self.slots[slot].take()?;
        self.tombstones += 1;
        Some(value)
    }

    /// Return the next live key at or after `cursor` and move past it.
    ///
    /// Entries inserted since the cursor was created are visited; entries
    /// removed before the cursor reaches them are skipped.
    pub fn advance(&self, cursor: &mut Cursor) -> Option<K> {
        while cursor.next < self.slots.len() {
            let slot = cursor.next;
            cursor.next += 1;
            if let Some((key, _)) = &self.slots[slot] {
                return Some(*key);
            }
        }
        None
    }

    /// Live keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.slots.iter().flatten().map(|(k, _)| *k)
    }

    /// Live entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> + '_ {
        self.slots.iter().flatten().map(|(k, v)| (*k, v))
    }

    /// Drop tombstones and renumber slots, preserving order.
    ///
    /// Invalidates every outstanding [`Cursor`].
    pub fn compact(&mut self) {
        if self.tombstones == 0 {
            return;
        }
        self.slots.retain(Option::is_some);
        self.index.clear();
        for (slot, (key, _)) in self.slots.iter().flatten().enumerate() {
            self.index.insert(*key, slot);
        }
        self.tombstones = 0;
    }
}
