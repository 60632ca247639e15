//! Maps with an iterable reverse lookup.
//!
//! An [`InvertibleMap`] pairs a forward [`VersionedMap`] `K -> V` with a
//! [`OneToMany`] relation `V -> K`, so both "what is the value of this key"
//! and "which keys have this value" are cheap. Every write updates both
//! sides, and both sides are copied and released together.
//!
//! # Examples
//!
//! ```rust
//! use fastcopy::InvertibleMap;
//!
//! let mut stakes = InvertibleMap::new();
//! stakes.put("node-a", "pool-1");
//! stakes.put("node-b", "pool-1");
//! stakes.put("node-c", "pool-2");
//!
//! let round = stakes.copy();
//! stakes.put("node-b", "pool-2");
//!
//! assert_eq!(stakes.get_key_count(&"pool-1"), 1);
//! assert_eq!(stakes.get_key_count(&"pool-2"), 2);
//! assert_eq!(round.get_key_count(&"pool-1"), 2);
//! ```

#[cfg(feature = "rebuild")]
mod rebuild;

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use tracing::{debug, error};

use crate::error::{InvariantViolation, LifecycleError, RangeError, SettingsError};
use crate::map::{Entries, Snapshot, VersionedMap};
use crate::relation::{Associations, OneToMany, OneToManySnapshot};
use crate::settings::FamilySettings;
use crate::Version;

/// The reverse lookup of a mutable [`InvertibleMap`].
pub type KeysOf<'a, K, V> = Associations<'a, VersionedMap<(V, usize), K>, V, K>;

/// The reverse lookup of an [`InvertibleSnapshot`].
pub type SnapshotKeysOf<'a, K, V> = Associations<'a, Snapshot<(V, usize), K>, V, K>;

// =============================================================================
// InvertibleMap
// =============================================================================

/// The mutable version of a map with reverse lookup.
///
/// # Panics
///
/// Writers panic if the forward map and the reverse relation disagree. That
/// can only happen through a defect in this crate, and continuing would
/// hand out wrong reverse lookups.
pub struct InvertibleMap<K, V> {
    forward: VersionedMap<K, V>,
    inverse: OneToMany<V, K>,
}

impl<K, V> InvertibleMap<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Hash + Eq + Clone + Send + Sync + 'static,
{
    /// Creates an empty map with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            forward: VersionedMap::new(),
            inverse: OneToMany::new(),
        }
    }

    /// Creates an empty map whose underlying maps use `settings`.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingsError`] if `settings` does not validate.
    pub fn with_settings(settings: FamilySettings) -> Result<Self, SettingsError> {
        Ok(Self {
            forward: VersionedMap::with_settings(settings.clone())?,
            inverse: OneToMany::with_settings(settings)?,
        })
    }

    /// The version this map writes to.
    #[must_use]
    pub fn version(&self) -> Version {
        self.forward.version()
    }

    /// Number of keys with a value.
    #[must_use]
    pub fn size(&self) -> usize {
        self.forward.size()
    }

    /// Returns `true` if no key has a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Returns the value of `key`, if any.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.forward.get(key)
    }

    /// Returns `true` if `key` has a value.
    pub fn contains_key(&self, key: &K) -> bool {
        self.forward.contains_key(key)
    }

    /// Iterates over every key whose value is `value`.
    pub fn get_keys(&self, value: &V) -> KeysOf<'_, K, V> {
        self.inverse.get(value)
    }

    /// Iterates over the keys in slots `start..end` of `value`.
    ///
    /// # Errors
    ///
    /// Returns a [`RangeError`] if `start > end` or
    /// `end > get_key_count(value)`.
    pub fn get_keys_range(&self, value: &V, start: usize, end: usize) -> Result<KeysOf<'_, K, V>, RangeError> {
        self.inverse.get_range(value, start, end)
    }

    /// Number of keys whose value is `value`.
    pub fn get_key_count(&self, value: &V) -> usize {
        self.inverse.get_count(value)
    }

    /// Iterates over the forward entries.
    pub fn entries(&mut self) -> Entries<'_, K, V> {
        self.forward.entries()
    }

    /// Sets the value of `key` and returns the previous one.
    ///
    /// Writing the value a key already has changes nothing.
    ///
    /// # Panics
    ///
    /// Panics if the reverse relation does not match the forward map.
    pub fn put(&mut self, key: K, value: V) -> Option<Arc<V>> {
        if let Some(current) = self.forward.get(&key) {
            if *current == value {
                return Some(current);
            }
        }

        let previous = self.forward.put(key.clone(), value.clone());
        if let Some(stale) = &previous {
            let outcome = self.inverse.disassociate(stale, &key);
            self.ensure_consistent(outcome, "stale value missing from reverse index");
        }
        if !self.inverse.associate(value, key) {
            self.fatal("new value already present in reverse index");
        }
        previous
    }

    /// Removes `key` and returns its value.
    ///
    /// # Panics
    ///
    /// Panics if the reverse relation does not match the forward map.
    pub fn remove(&mut self, key: &K) -> Option<Arc<V>> {
        let removed = self.forward.remove(key)?;
        let outcome = self.inverse.disassociate(&removed, key);
        self.ensure_consistent(outcome, "removed value missing from reverse index");
        Some(removed)
    }

    fn ensure_consistent(&self, outcome: Result<bool, InvariantViolation>, missing: &str) {
        match outcome {
            Ok(true) => {}
            Ok(false) => self.fatal(missing),
            Err(violation) => self.fatal(&violation.to_string()),
        }
    }

    fn fatal(&self, detail: &str) -> ! {
        error!(version = %self.version(), detail, "forward and reverse maps disagree");
        panic!("invertible map invariant broken at {}: {detail}", self.version());
    }

    /// Freezes both sides and moves on to the next version.
    pub fn copy(&mut self) -> InvertibleSnapshot<K, V> {
        let forward = self.forward.copy();
        let inverse = self.inverse.copy();
        debug!(frozen = %forward.version(), mutable = %self.version(), "copied invertible map");
        InvertibleSnapshot { forward, inverse }
    }

    /// Releases both sides.
    ///
    /// # Errors
    ///
    /// Both sides are always released; the first [`LifecycleError`] is
    /// returned.
    pub fn release(self) -> Result<(), LifecycleError> {
        let forward = self.forward.release();
        let inverse = self.inverse.release();
        forward.and(inverse)
    }

    /// Blocks until every release of the underlying families has been
    /// reclaimed.
    pub fn await_reclamation(&self) {
        self.forward.await_reclamation();
        self.inverse.await_reclamation();
    }
}

impl<K, V> Default for InvertibleMap<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Hash + Eq + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for InvertibleMap<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("InvertibleMap")
            .field("forward", &self.forward)
            .field("inverse", &self.inverse)
            .finish()
    }
}

// =============================================================================
// InvertibleSnapshot
// =============================================================================

/// A frozen version of an [`InvertibleMap`].
pub struct InvertibleSnapshot<K, V> {
    forward: Snapshot<K, V>,
    inverse: OneToManySnapshot<V, K>,
}

impl<K, V> InvertibleSnapshot<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Hash + Eq + Clone + Send + Sync + 'static,
{
    /// The frozen version of the forward map.
    #[must_use]
    pub fn version(&self) -> Version {
        self.forward.version()
    }

    /// Number of keys with a value.
    #[must_use]
    pub fn size(&self) -> usize {
        self.forward.size()
    }

    /// Returns the value of `key` at this version.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.forward.get(key)
    }

    /// Iterates over every key whose value is `value`.
    pub fn get_keys(&self, value: &V) -> SnapshotKeysOf<'_, K, V> {
        self.inverse.get(value)
    }

    /// Iterates over the keys in slots `start..end` of `value`.
    ///
    /// # Errors
    ///
    /// Returns a [`RangeError`] if `start > end` or
    /// `end > get_key_count(value)`.
    pub fn get_keys_range(
        &self,
        value: &V,
        start: usize,
        end: usize,
    ) -> Result<SnapshotKeysOf<'_, K, V>, RangeError> {
        self.inverse.get_range(value, start, end)
    }

    /// Number of keys whose value is `value`.
    pub fn get_key_count(&self, value: &V) -> usize {
        self.inverse.get_count(value)
    }

    /// Iterates over the forward entries.
    pub fn entries(&self) -> Entries<'_, K, V> {
        self.forward.entries()
    }

    /// Releases both sides.
    ///
    /// # Errors
    ///
    /// Both sides are always released; the first [`LifecycleError`] is
    /// returned.
    pub fn release(self) -> Result<(), LifecycleError> {
        let forward = self.forward.release();
        let inverse = self.inverse.release();
        forward.and(inverse)
    }
}

impl<K, V> fmt::Debug for InvertibleSnapshot<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("InvertibleSnapshot")
            .field("forward", &self.forward)
            .field("inverse", &self.inverse)
            .finish()
    }
}
