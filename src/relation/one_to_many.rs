//! Mutable and frozen one-to-many relations.

use std::collections::hash_map::Entry;
use std::fmt;
use std::hash::Hash;

use rustc_hash::FxHashMap;
use tracing::{debug, error};

use super::loader::OneToManyLoader;
use super::{Associations, STRUCTURE, all_slots_of, count_in, slots_of};
use crate::error::{InvariantViolation, LifecycleError, RangeError, SettingsError};
use crate::map::{Snapshot, VersionedMap};
use crate::settings::FamilySettings;
use crate::Version;

/// Reverse lookup from an association to its slot.
pub(crate) type SlotIndex<K, V> = FxHashMap<(K, V), usize>;

// =============================================================================
// OneToMany
// =============================================================================

/// The mutable version of a one-to-many relation.
///
/// Each key maps to a set of distinct values held in dense slots
/// `0..get_count(key)`. Slot order is insertion order until a removal moves
/// the last association into the freed slot.
pub struct OneToMany<K, V> {
    associations: VersionedMap<(K, usize), V>,
    counts: VersionedMap<K, usize>,
    slots: SlotIndex<K, V>,
}

impl<K, V> OneToMany<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Hash + Eq + Clone + Send + Sync + 'static,
{
    /// Creates an empty relation with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            associations: VersionedMap::new(),
            counts: VersionedMap::new(),
            slots: SlotIndex::default(),
        }
    }

    /// Creates an empty relation whose maps use `settings`.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingsError`] if `settings` does not validate.
    pub fn with_settings(settings: FamilySettings) -> Result<Self, SettingsError> {
        Ok(Self {
            associations: VersionedMap::with_settings(settings.clone())?,
            counts: VersionedMap::with_settings(settings)?,
            slots: SlotIndex::default(),
        })
    }

    /// Starts a bulk load with default settings.
    #[must_use]
    pub fn loader() -> OneToManyLoader<K, V> {
        OneToManyLoader::new(VersionedMap::loader(), VersionedMap::loader())
    }

    /// Starts a bulk load whose maps use `settings`.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingsError`] if `settings` does not validate.
    pub fn loader_with_settings(settings: FamilySettings) -> Result<OneToManyLoader<K, V>, SettingsError> {
        Ok(OneToManyLoader::new(
            VersionedMap::loader_with_settings(settings.clone())?,
            VersionedMap::loader_with_settings(settings)?,
        ))
    }

    pub(crate) const fn from_parts(
        associations: VersionedMap<(K, usize), V>,
        counts: VersionedMap<K, usize>,
        slots: SlotIndex<K, V>,
    ) -> Self {
        Self {
            associations,
            counts,
            slots,
        }
    }

    /// The version this relation writes to.
    #[must_use]
    pub fn version(&self) -> Version {
        self.associations.version()
    }

    /// Adds `value` to the values of `key`.
    ///
    /// Returns `false` and changes nothing if the association already exists.
    pub fn associate(&mut self, key: K, value: V) -> bool {
        let Entry::Vacant(vacant) = self.slots.entry((key.clone(), value.clone())) else {
            return false;
        };
        let slot = count_in(&self.counts, &key);
        vacant.insert(slot);
        self.associations.put((key.clone(), slot), value);
        self.counts.put(key, slot + 1);
        true
    }

    /// Removes `value` from the values of `key`.
    ///
    /// Returns `Ok(false)` if the association does not exist. Otherwise the
    /// key's last association moves into the freed slot and the count drops
    /// by one. Every precondition is checked before anything is changed.
    ///
    /// # Errors
    ///
    /// Returns an [`InvariantViolation`] if the relation's own bookkeeping is
    /// inconsistent. The relation is left untouched in that case.
    pub fn disassociate(&mut self, key: &K, value: &V) -> Result<bool, InvariantViolation> {
        let lookup = (key.clone(), value.clone());
        let Some(&slot) = self.slots.get(&lookup) else {
            return Ok(false);
        };

        let count = count_in(&self.counts, key);
        let Some(last) = count.checked_sub(1).filter(|last| slot <= *last) else {
            return Err(self.violation(format!("slot {slot} is outside the {count} populated slots")));
        };
        match self.associations.get(&(key.clone(), slot)) {
            Some(held) if *held == *value => {}
            Some(_) => return Err(self.violation(format!("slot {slot} holds a different value"))),
            None => return Err(self.violation(format!("slot {slot} is empty"))),
        }

        let tail = if slot == last {
            None
        } else {
            let Some(tail) = self.associations.get(&(key.clone(), last)) else {
                return Err(self.violation(format!("last slot {last} is empty")));
            };
            let tail_lookup = (key.clone(), V::clone(&tail));
            if self.slots.get(&tail_lookup) != Some(&last) {
                return Err(self.violation(format!("last slot {last} is missing from the slot index")));
            }
            Some((tail_lookup, tail))
        };

        if let Some((tail_lookup, tail)) = tail {
            self.associations.put_shared((key.clone(), slot), tail);
            self.slots.insert(tail_lookup, slot);
        }
        self.associations.remove(&(key.clone(), last));
        self.slots.remove(&lookup);
        if last == 0 {
            self.counts.remove(key);
        } else {
            self.counts.put(key.clone(), last);
        }
        Ok(true)
    }

    fn violation(&self, detail: String) -> InvariantViolation {
        error!(
            structure = STRUCTURE,
            version = %self.version(),
            %detail,
            "relation bookkeeping is inconsistent"
        );
        InvariantViolation::new(STRUCTURE, detail)
    }

    /// Returns `true` if `value` is associated with `key`.
    pub fn contains(&self, key: &K, value: &V) -> bool {
        self.slots.contains_key(&(key.clone(), value.clone()))
    }

    /// Number of values associated with `key`.
    pub fn get_count(&self, key: &K) -> usize {
        count_in(&self.counts, key)
    }

    /// Number of keys with at least one association.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.counts.size()
    }

    /// Iterates over every value associated with `key`.
    ///
    /// # Panics
    ///
    /// The iterator panics if one of the slots is empty, which means the
    /// relation's bookkeeping is corrupt.
    pub fn get(&self, key: &K) -> Associations<'_, VersionedMap<(K, usize), V>, K, V> {
        all_slots_of(&self.associations, &self.counts, key)
    }

    /// Iterates over the values in slots `start..end` of `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`RangeError`] if `start > end` or `end > get_count(key)`.
    ///
    /// # Panics
    ///
    /// The iterator panics if one of the slots is empty, which means the
    /// relation's bookkeeping is corrupt.
    pub fn get_range(
        &self,
        key: &K,
        start: usize,
        end: usize,
    ) -> Result<Associations<'_, VersionedMap<(K, usize), V>, K, V>, RangeError> {
        slots_of(&self.associations, &self.counts, key, start, end)
    }

    /// Freezes the current associations and moves on to the next version.
    ///
    /// The slot index stays with the mutable relation.
    pub fn copy(&mut self) -> OneToManySnapshot<K, V> {
        let associations = self.associations.copy();
        let counts = self.counts.copy();
        debug!(frozen = %associations.version(), mutable = %self.version(), "copied one-to-many relation");
        OneToManySnapshot {
            associations,
            counts,
        }
    }

    /// Releases both underlying maps.
    ///
    /// # Errors
    ///
    /// Both maps are always released; the first [`LifecycleError`] is
    /// returned.
    pub fn release(self) -> Result<(), LifecycleError> {
        let associations = self.associations.release();
        let counts = self.counts.release();
        associations.and(counts)
    }

    /// Blocks until every release of both underlying families has been
    /// reclaimed.
    pub fn await_reclamation(&self) {
        self.associations.await_reclamation();
        self.counts.await_reclamation();
    }
}

impl<K, V> Default for OneToMany<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Hash + Eq + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for OneToMany<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("OneToMany")
            .field("associations", &self.associations)
            .field("counts", &self.counts)
            .field("slot_index", &self.slots.len())
            .finish()
    }
}

// =============================================================================
// OneToManySnapshot
// =============================================================================

/// A frozen version of a one-to-many relation.
pub struct OneToManySnapshot<K, V> {
    associations: Snapshot<(K, usize), V>,
    counts: Snapshot<K, usize>,
}

impl<K, V> OneToManySnapshot<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// The frozen version.
    #[must_use]
    pub fn version(&self) -> Version {
        self.associations.version()
    }

    /// Number of values associated with `key` at this version.
    pub fn get_count(&self, key: &K) -> usize {
        count_in(&self.counts, key)
    }

    /// Number of keys with at least one association.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.counts.size()
    }

    /// Iterates over every value associated with `key`.
    ///
    /// # Panics
    ///
    /// The iterator panics if one of the slots is empty, which means the
    /// relation's bookkeeping is corrupt.
    pub fn get(&self, key: &K) -> Associations<'_, Snapshot<(K, usize), V>, K, V> {
        all_slots_of(&self.associations, &self.counts, key)
    }

    /// Iterates over the values in slots `start..end` of `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`RangeError`] if `start > end` or `end > get_count(key)`.
    ///
    /// # Panics
    ///
    /// The iterator panics if one of the slots is empty, which means the
    /// relation's bookkeeping is corrupt.
    pub fn get_range(
        &self,
        key: &K,
        start: usize,
        end: usize,
    ) -> Result<Associations<'_, Snapshot<(K, usize), V>, K, V>, RangeError> {
        slots_of(&self.associations, &self.counts, key, start, end)
    }

    /// Releases both underlying maps.
    ///
    /// # Errors
    ///
    /// Both maps are always released; the first [`LifecycleError`] is
    /// returned.
    pub fn release(self) -> Result<(), LifecycleError> {
        let associations = self.associations.release();
        let counts = self.counts.release();
        associations.and(counts)
    }
}

impl<K, V> fmt::Debug for OneToManySnapshot<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("OneToManySnapshot")
            .field("associations", &self.associations)
            .field("counts", &self.counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;

    fn values<I: Iterator<Item = Arc<char>>>(iter: I) -> Vec<char> {
        iter.map(|value| *value).collect()
    }

    #[rstest]
    fn test_associate_appends_in_order() {
        let mut relation = OneToMany::new();
        assert!(relation.associate(1, 'a'));
        assert!(relation.associate(1, 'b'));
        assert!(!relation.associate(1, 'a'));
        assert_eq!(values(relation.get(&1)), vec!['a', 'b']);
        assert_eq!(relation.get_count(&1), 2);
        assert_eq!(relation.key_count(), 1);
    }

    #[rstest]
    fn test_disassociate_moves_last_into_gap() {
        let mut relation = OneToMany::new();
        for value in ['a', 'b', 'c', 'd'] {
            relation.associate(1, value);
        }
        assert_eq!(relation.disassociate(&1, &'b'), Ok(true));
        assert_eq!(values(relation.get(&1)), vec!['a', 'd', 'c']);
        assert!(!relation.contains(&1, &'b'));
        assert!(relation.contains(&1, &'d'));
    }

    #[rstest]
    fn test_disassociate_last_value_removes_key() {
        let mut relation = OneToMany::new();
        relation.associate("k", 'x');
        assert_eq!(relation.disassociate(&"k", &'x'), Ok(true));
        assert_eq!(relation.disassociate(&"k", &'x'), Ok(false));
        assert_eq!(relation.get_count(&"k"), 0);
        assert_eq!(relation.key_count(), 0);
    }

    #[rstest]
    fn test_inconsistent_slot_index_is_reported_without_changes() {
        let mut relation = OneToMany::new();
        relation.associate(1, 'a');
        relation.associate(1, 'b');
        relation.slots.insert((1, 'z'), 7);

        let error = relation.disassociate(&1, &'z').unwrap_err();
        assert_eq!(error.structure, STRUCTURE);
        assert_eq!(values(relation.get(&1)), vec!['a', 'b']);
        assert_eq!(relation.get_count(&1), 2);
    }

    #[rstest]
    #[should_panic(expected = "slot 1 below the count is empty")]
    fn test_empty_dense_slot_is_fatal() {
        let mut relation = OneToMany::new();
        for value in ['a', 'b', 'c'] {
            relation.associate(1, value);
        }
        relation.associations.remove(&(1, 1));

        let _ = values(relation.get_range(&1, 0, 3).unwrap());
    }

    #[rstest]
    #[case(0, 3, Ok(vec!['a', 'b', 'c']))]
    #[case(1, 2, Ok(vec!['b']))]
    #[case(3, 3, Ok(vec![]))]
    #[case(2, 1, Err(RangeError { start: 2, end: 1, count: 3 }))]
    #[case(0, 4, Err(RangeError { start: 0, end: 4, count: 3 }))]
    fn test_get_range_bounds(
        #[case] start: usize,
        #[case] end: usize,
        #[case] expected: Result<Vec<char>, RangeError>,
    ) {
        let mut relation = OneToMany::new();
        for value in ['a', 'b', 'c'] {
            relation.associate(0_u8, value);
        }
        assert_eq!(relation.get_range(&0, start, end).map(values), expected);
    }

    #[rstest]
    fn test_snapshot_keeps_dense_slots_of_its_version() {
        let mut relation = OneToMany::new();
        relation.associate(1, 'a');
        relation.associate(1, 'b');
        let frozen = relation.copy();
        relation.disassociate(&1, &'a').unwrap();
        relation.associate(1, 'c');

        assert_eq!(values(frozen.get(&1)), vec!['a', 'b']);
        assert_eq!(values(relation.get(&1)), vec!['b', 'c']);
        assert_eq!(frozen.version(), Version::ORIGIN);
        assert!(frozen.release().is_ok());
    }

    // =========================================================================
    // Dense slots: nothing is stored at or past a key's count
    // =========================================================================

    mod dense_slots {
        use super::*;
        use crate::map::MapView;
        use proptest::prelude::*;

        const KEYS: u8 = 6;

        #[derive(Debug, Clone)]
        enum Step {
            Associate(u8, u8),
            Disassociate(u8, u8),
            Copy,
        }

        fn arbitrary_step() -> impl Strategy<Value = Step> {
            prop_oneof![
                4 => (0..KEYS, 0..16_u8).prop_map(|(key, value)| Step::Associate(key, value)),
                3 => (0..KEYS, 0..16_u8).prop_map(|(key, value)| Step::Disassociate(key, value)),
                1 => Just(Step::Copy),
            ]
        }

        fn assert_dense<A, C>(associations: &A, counts: &C) -> Result<(), TestCaseError>
        where
            A: MapView<(u8, usize), u8>,
            C: MapView<u8, usize>,
        {
            let mut total = 0;
            for key in 0..KEYS {
                let count = count_in(counts, &key);
                total += count;
                for slot in 0..count {
                    prop_assert!(associations.get(&(key, slot)).is_some());
                }
                prop_assert!(associations.get(&(key, count)).is_none());
            }
            prop_assert_eq!(associations.size(), total);
            Ok(())
        }

        proptest! {
            #[test]
            fn prop_no_slot_is_populated_past_the_count(
                steps in prop::collection::vec(arbitrary_step(), 0..200)
            ) {
                let mut relation = OneToMany::new();
                let mut frozen = Vec::new();

                for step in steps {
                    match step {
                        Step::Associate(key, value) => {
                            relation.associate(key, value);
                        }
                        Step::Disassociate(key, value) => {
                            prop_assert!(relation.disassociate(&key, &value).is_ok());
                        }
                        Step::Copy => frozen.push(relation.copy()),
                    }
                    assert_dense(&relation.associations, &relation.counts)?;
                }

                for snapshot in &frozen {
                    assert_dense(&snapshot.associations, &snapshot.counts)?;
                }
                prop_assert_eq!(relation.slots.len(), relation.associations.size());
            }
        }
    }
}
