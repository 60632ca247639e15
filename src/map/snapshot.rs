//! Frozen versions.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use super::entries::Entries;
use super::handle::Handle;
use super::MapView;
use crate::error::LifecycleError;
use crate::family::FamilyStats;
use crate::Version;

/// An immutable version of a family, produced by
/// [`VersionedMap::copy`](crate::VersionedMap::copy).
///
/// A snapshot has no mutators. It is `Send + Sync`, so it can be shared
/// through `Arc<Snapshot<K, V>>` and read from any number of threads while
/// the mutable handle keeps writing newer versions.
///
/// Dropping a snapshot releases its version. Call
/// [`release`](Self::release) to observe the outcome instead.
pub struct Snapshot<K, V> {
    handle: Handle<K, V>,
}

impl<K, V> Snapshot<K, V> {
    pub(crate) const fn from_handle(handle: Handle<K, V>) -> Self {
        Self { handle }
    }

    /// The frozen version.
    #[must_use]
    pub fn version(&self) -> Version {
        self.handle.version
    }

    /// Number of keys with a visible value.
    #[must_use]
    pub fn size(&self) -> usize {
        self.handle.size()
    }

    /// Returns `true` if no key has a visible value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Releases this version so its history can be reclaimed.
    ///
    /// # Errors
    ///
    /// Returns a [`LifecycleError`] if the family no longer considers this
    /// version live.
    pub fn release(mut self) -> Result<(), LifecycleError> {
        self.handle.release()
    }

    /// Blocks until every release in this family has been reclaimed.
    pub fn await_reclamation(&self) {
        self.handle.store.await_reclamation();
    }
}

impl<K, V> Snapshot<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Returns the value of `key` as of this version.
    pub fn get<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.handle.store.read(key, self.handle.version)
    }

    /// Returns `true` if `key` has a visible value.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Iterates over the entries visible at this version.
    pub fn entries(&self) -> Entries<'_, K, V> {
        Entries::new(&self.handle.store, self.handle.version)
    }

    /// A summary of the family's backing store.
    #[must_use]
    pub fn stats(&self) -> FamilyStats {
        self.handle.store.stats()
    }

    /// Records reclaimed for `key`, oldest first.
    #[must_use]
    pub fn archived_history(&self, key: &K) -> Vec<(Version, Option<Arc<V>>)> {
        self.handle.store.archived_history(key)
    }
}

impl<K, V> MapView<K, V> for Snapshot<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn version(&self) -> Version {
        self.handle.version
    }

    fn get(&self, key: &K) -> Option<Arc<V>> {
        self.handle.store.read(key, self.handle.version)
    }

    fn size(&self) -> usize {
        self.handle.size()
    }
}

impl<K, V> fmt::Debug for Snapshot<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Snapshot")
            .field("handle", &self.handle)
            .finish()
    }
}
