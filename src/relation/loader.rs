//! Bulk loading of a one-to-many relation.

use std::collections::hash_map::Entry;
use std::fmt;
use std::hash::Hash;

use rustc_hash::FxHashMap;
use tracing::debug;

use super::one_to_many::{OneToMany, SlotIndex};
use crate::map::InitialLoader;

/// Fills a new [`OneToMany`] at its root version.
///
/// Slots are assigned densely in injection order. The per-key counts are
/// written once, by [`finalize_initial_size`](Self::finalize_initial_size).
///
/// # Examples
///
/// ```rust
/// use fastcopy::OneToMany;
///
/// let mut loader = OneToMany::loader();
/// assert!(loader.initial_injection("team", "ana"));
/// assert!(loader.initial_injection("team", "bo"));
/// assert!(!loader.initial_injection("team", "ana"));
///
/// let relation = loader.finalize_initial_size();
/// assert_eq!(relation.get_count(&"team"), 2);
/// assert!(relation.contains(&"team", &"bo"));
/// ```
pub struct OneToManyLoader<K, V> {
    associations: InitialLoader<(K, usize), V>,
    counts: InitialLoader<K, usize>,
    tally: FxHashMap<K, usize>,
    slots: SlotIndex<K, V>,
}

impl<K, V> OneToManyLoader<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Hash + Eq + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        associations: InitialLoader<(K, usize), V>,
        counts: InitialLoader<K, usize>,
    ) -> Self {
        Self {
            associations,
            counts,
            tally: FxHashMap::default(),
            slots: SlotIndex::default(),
        }
    }

    /// Adds `value` to the values of `key`.
    ///
    /// Returns `false` and changes nothing if the association was already
    /// injected.
    pub fn initial_injection(&mut self, key: K, value: V) -> bool {
        let Entry::Vacant(vacant) = self.slots.entry((key.clone(), value.clone())) else {
            return false;
        };
        let count = self.tally.entry(key.clone()).or_default();
        let slot = *count;
        *count += 1;
        vacant.insert(slot);
        self.associations.initial_injection((key, slot), value);
        true
    }

    /// Writes the per-key counts and returns the mutable relation.
    #[must_use]
    pub fn finalize_initial_size(mut self) -> OneToMany<K, V> {
        let keys = self.tally.len();
        for (key, count) in self.tally {
            self.counts.initial_injection(key, count);
        }
        debug!(keys, associations = self.slots.len(), "finalized one-to-many load");
        OneToMany::from_parts(
            self.associations.finalize_initial_size(),
            self.counts.finalize_initial_size(),
            self.slots,
        )
    }
}

impl<K, V> fmt::Debug for OneToManyLoader<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("OneToManyLoader")
            .field("keys", &self.tally.len())
            .field("associations", &self.slots.len())
            .finish_non_exhaustive()
    }
}
