//! The mutable handle of a family.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use tracing::debug;

use super::entries::Entries;
use super::handle::Handle;
use super::loader::InitialLoader;
use super::modify::ForModify;
use super::snapshot::Snapshot;
use super::MapView;
use crate::error::{LifecycleError, SettingsError};
use crate::family::{FamilyStats, FamilyStore};
use crate::settings::FamilySettings;
use crate::Version;

/// The single mutable version of a family of maps.
///
/// Reads and writes go to the shared family table at this handle's version.
/// [`copy`](Self::copy) freezes the current contents into a [`Snapshot`] in
/// O(1) and moves this handle on to the next version.
///
/// Writers take `&self`, so a `VersionedMap` can be shared across threads
/// that write independent keys. Operations that change the version
/// (`copy`, `entries`, `release`) need exclusive access.
///
/// # Examples
///
/// ```rust
/// use fastcopy::VersionedMap;
///
/// let mut map = VersionedMap::new();
/// map.put("a", 1);
///
/// let frozen = map.copy();
/// map.put("a", 2);
///
/// assert_eq!(frozen.get("a").as_deref(), Some(&1));
/// assert_eq!(map.get("a").as_deref(), Some(&2));
/// assert!(frozen.version() < map.version());
/// ```
pub struct VersionedMap<K, V> {
    handle: Handle<K, V>,
}

impl<K, V> VersionedMap<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Creates an empty root map at [`Version::ORIGIN`] with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::from_settings(FamilySettings::default())
    }

    /// Creates an empty root map whose family uses `settings`.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingsError`] if `settings` does not validate.
    pub fn with_settings(settings: FamilySettings) -> Result<Self, SettingsError> {
        settings.validate()?;
        Ok(Self::from_settings(settings))
    }

    fn from_settings(settings: FamilySettings) -> Self {
        Self::from_parts(FamilyStore::new(settings), Version::ORIGIN, 0)
    }

    pub(crate) const fn from_parts(store: Arc<FamilyStore<K, V>>, version: Version, size: usize) -> Self {
        Self {
            handle: Handle::new(store, version, size),
        }
    }

    /// Starts a bulk load of a new root map with default settings.
    ///
    /// See [`InitialLoader`].
    #[must_use]
    pub fn loader() -> InitialLoader<K, V> {
        InitialLoader::new(FamilyStore::new(FamilySettings::default()))
    }

    /// Starts a bulk load of a new root map whose family uses `settings`.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingsError`] if `settings` does not validate.
    pub fn loader_with_settings(settings: FamilySettings) -> Result<InitialLoader<K, V>, SettingsError> {
        settings.validate()?;
        Ok(InitialLoader::new(FamilyStore::new(settings)))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The version this handle currently writes to.
    #[must_use]
    pub fn version(&self) -> Version {
        self.handle.version
    }

    /// Number of keys with a visible value.
    ///
    /// May lag behind by in-flight writes from other threads.
    #[must_use]
    pub fn size(&self) -> usize {
        self.handle.size()
    }

    /// Returns `true` if no key has a visible value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns the value of `key`, if any.
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

    /// Iterates over the visible entries.
    ///
    /// The exclusive borrow keeps every write out until the iterator is gone.
    pub fn entries(&mut self) -> Entries<'_, K, V> {
        Entries::new(&self.handle.store, self.handle.version)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Associates `value` with `key` and returns the previous value.
    pub fn put(&self, key: K, value: V) -> Option<Arc<V>> {
        self.put_shared(key, Arc::new(value))
    }

    /// Like [`put`](Self::put), for a value that is already shared.
    pub fn put_shared(&self, key: K, value: Arc<V>) -> Option<Arc<V>> {
        let previous = self.handle.store.write(key, self.handle.version, value);
        if previous.is_none() {
            self.handle.grow();
        }
        previous
    }

    /// Removes `key` and returns the value it had.
    pub fn remove<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = self.handle.store.erase(key, self.handle.version);
        if removed.is_some() {
            self.handle.shrink();
        }
        removed
    }

    /// Returns a guard for modifying the value of `key` in place.
    ///
    /// If the value was inherited from an older version it is cloned first,
    /// and the guard's [`original`](ForModify::original) exposes the
    /// inherited value. Older versions never observe the change.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fastcopy::VersionedMap;
    ///
    /// let mut map = VersionedMap::new();
    /// map.put("balance", vec![10]);
    /// let frozen = map.copy();
    ///
    /// {
    ///     let mut balance = map.get_for_modify("balance").unwrap();
    ///     assert_eq!(balance.original(), Some(&vec![10]));
    ///     balance.push(20);
    /// }
    ///
    /// assert_eq!(map.get("balance").as_deref(), Some(&vec![10, 20]));
    /// assert_eq!(frozen.get("balance").as_deref(), Some(&vec![10]));
    /// ```
    pub fn get_for_modify<Q>(&self, key: &Q) -> Option<ForModify<'_, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.handle.store.modify(key, self.handle.version)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Freezes the current contents and moves this handle to the next
    /// version.
    ///
    /// The returned [`Snapshot`] keeps the old version and element count.
    /// Both operations are O(1).
    pub fn copy(&mut self) -> Snapshot<K, V> {
        let frozen = self.handle.version;
        let next = self.handle.store.next_version();
        self.handle.version = next;
        debug!(%frozen, mutable = %next, "copied versioned map");
        Snapshot::from_handle(Handle::new(
            Arc::clone(&self.handle.store),
            frozen,
            self.size(),
        ))
    }

    /// Releases this handle's version.
    ///
    /// # Errors
    ///
    /// Returns a [`LifecycleError`] if the family no longer considers this
    /// version live.
    pub fn release(mut self) -> Result<(), LifecycleError> {
        self.handle.release()
    }

    /// A summary of the family's backing store.
    #[must_use]
    pub fn stats(&self) -> FamilyStats {
        self.handle.store.stats()
    }

    /// Blocks until every release in this family has been reclaimed.
    pub fn await_reclamation(&self) {
        self.handle.store.await_reclamation();
    }

    /// Records reclaimed for `key`, oldest first. Empty unless the family
    /// was created with `archive_enabled`.
    #[must_use]
    pub fn archived_history(&self, key: &K) -> Vec<(Version, Option<Arc<V>>)> {
        self.handle.store.archived_history(key)
    }

    /// The settings shared by this family.
    #[must_use]
    pub fn settings(&self) -> &FamilySettings {
        self.handle.store.settings()
    }
}

impl<K, V> Default for VersionedMap<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MapView<K, V> for VersionedMap<K, V>
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

impl<K, V> fmt::Debug for VersionedMap<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("VersionedMap")
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_put_counts_new_keys_only() {
        let map = VersionedMap::new();
        assert!(map.put("a", 1).is_none());
        assert_eq!(map.put("a", 2).as_deref(), Some(&1));
        map.put("b", 3);
        assert_eq!(map.size(), 2);
    }

    #[rstest]
    fn test_remove_of_missing_key_keeps_size() {
        let map: VersionedMap<&str, i32> = VersionedMap::new();
        assert!(map.remove("a").is_none());
        assert_eq!(map.size(), 0);
    }

    #[rstest]
    fn test_copy_carries_size_forward() {
        let mut map = VersionedMap::new();
        map.put(1, "one");
        map.put(2, "two");
        let frozen = map.copy();
        map.remove(&1);

        assert_eq!(frozen.size(), 2);
        assert_eq!(map.size(), 1);
        assert_eq!(map.version(), Version::new(1));
        assert_eq!(frozen.version(), Version::ORIGIN);
    }

    #[rstest]
    fn test_with_settings_rejects_invalid() {
        let result: Result<VersionedMap<u8, u8>, _> =
            VersionedMap::with_settings(FamilySettings::default().with_max_gc_queue_size(0));
        assert_eq!(result.unwrap_err(), SettingsError::InvalidQueueSize);
    }

    #[rstest]
    fn test_get_for_modify_of_value_written_in_this_version() {
        let map = VersionedMap::new();
        map.put("a", String::from("x"));
        {
            let mut value = map.get_for_modify("a").unwrap();
            assert!(value.original().is_none());
            value.push('y');
        }
        assert_eq!(map.get("a").as_deref().map(String::as_str), Some("xy"));
        assert_eq!(map.size(), 1);
    }

    #[rstest]
    fn test_get_for_modify_of_missing_key() {
        let map: VersionedMap<&str, String> = VersionedMap::new();
        assert!(map.get_for_modify("a").is_none());
    }
}
