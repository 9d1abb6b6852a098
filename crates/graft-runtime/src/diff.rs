#![forbid(unsafe_code)]

//! The keyed diff underlying incremental inflation.
//!
//! A [`TableDiff`] tracks one category of per-target state (child
//! objects, directive instances) across inflation passes. Each pass swaps
//! the previous pass's entries into a leftover table, re-adds the entries
//! that still exist, and finally tears down whatever was not claimed.
//!
//! # Invariants
//!
//! 1. **A pass starts clean**: [`TableDiff::begin`] requires the leftover
//!    table to be empty, i.e. the previous pass was committed. A violation
//!    is logged and the stale leftovers are discarded without teardown.
//!
//! 2. **First add wins**: a key added twice in one pass keeps the first
//!    entry; the second add reports [`Slot::Duplicate`] and changes
//!    nothing.
//!
//! 3. **Claimed leftovers survive**: adding a key present in the leftover
//!    table moves it to the current table, so [`TableDiff::commit`] never
//!    tears it down.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | `begin` with unclaimed leftovers | `error!`, leftovers dropped untorn |
//! | duplicate key within a pass | `Slot::Duplicate`, first entry kept |
//! | leftover reused under the same key with a different entry | `Slot::Replaced`, old entry returned for teardown |

use ahash::AHashMap;
use graft_core::Key;
use tracing::error;

/// Outcome of [`TableDiff::add`] for one key.
#[derive(Debug)]
pub enum Slot<V> {
    /// The key was not present in the previous pass.
    Fresh,
    /// The key existed before and the entry was carried over.
    Reused,
    /// The key existed before with a different entry; the old one is
    /// returned so the caller can tear it down.
    Replaced(V),
    /// The key was already added this pass; nothing changed.
    Duplicate,
}

/// Keyed entries diffed across update passes.
#[derive(Debug, Default)]
pub struct TableDiff<V> {
    leftovers: AHashMap<Key, V>,
    leftover_order: Vec<Key>,
    current: AHashMap<Key, V>,
    order: Vec<Key>,
}

impl<V> TableDiff<V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            leftovers: AHashMap::new(),
            leftover_order: Vec::new(),
            current: AHashMap::new(),
            order: Vec::new(),
        }
    }

    /// Start a pass: current entries become leftovers awaiting a claim.
    pub fn begin(&mut self) {
        if !self.leftovers.is_empty() {
            error!("diff pass started with uncommitted leftovers; discarding them");
            self.leftovers.clear();
            self.leftover_order.clear();
        }
        std::mem::swap(&mut self.leftovers, &mut self.current);
        std::mem::swap(&mut self.leftover_order, &mut self.order);
        self.current.clear();
        self.order.clear();
    }

    /// The unclaimed entry for `key` from the previous pass, if any.
    #[must_use]
    pub fn leftover(&self, key: &Key) -> Option<&V> {
        self.leftovers.get(key)
    }

    #[must_use]
    pub fn in_current(&self, key: &Key) -> bool {
        self.current.contains_key(key)
    }

    /// Record `value` under `key` for the current pass.
    ///
    /// `same` decides whether a leftover entry under the same key is the
    /// same entity and can simply be carried forward.
    pub fn add(&mut self, key: Key, value: V, same: impl FnOnce(&V, &V) -> bool) -> Slot<V> {
        if self.current.contains_key(&key) {
            return Slot::Duplicate;
        }
        let slot = match self.leftovers.remove(&key) {
            Some(old) if same(&old, &value) => Slot::Reused,
            Some(old) => Slot::Replaced(old),
            None => Slot::Fresh,
        };
        self.order.push(key.clone());
        self.current.insert(key, value);
        slot
    }

    /// Current entries in the order they were added this pass.
    pub fn current_in_order(&self) -> impl Iterator<Item = &V> {
        self.order.iter().filter_map(|key| self.current.get(key))
    }

    #[must_use]
    pub fn current_len(&self) -> usize {
        self.current.len()
    }

    /// End the pass: every unclaimed leftover is handed to `teardown` in
    /// its original insertion order.
    pub fn commit(&mut self, mut teardown: impl FnMut(Key, V)) {
        for key in self.leftover_order.drain(..) {
            if let Some(value) = self.leftovers.remove(&key) {
                teardown(key, value);
            }
        }
        self.leftovers.clear();
    }
}
