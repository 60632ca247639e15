//! Lazy iteration over the entries visible at one version.

use std::hash::Hash;
use std::iter::FusedIterator;
use std::sync::Arc;

use crate::family::{visible_entries, FamilyStore};
use crate::Version;

/// Iterator over the `(key, value)` pairs visible at one version.
///
/// Walks the family table one shard at a time. Each shard is read under its
/// lock and buffered, so the whole map is never materialised at once and no
/// lock is held between calls to `next`. Order is unspecified.
///
/// Created by [`VersionedMap::entries`](crate::VersionedMap::entries) and
/// [`Snapshot::entries`](crate::Snapshot::entries).
pub struct Entries<'a, K, V> {
    store: &'a FamilyStore<K, V>,
    version: Version,
    next_shard: usize,
    buffered: std::vec::IntoIter<(K, Arc<V>)>,
}

impl<'a, K, V> Entries<'a, K, V> {
    pub(crate) fn new(store: &'a FamilyStore<K, V>, version: Version) -> Self {
        Self {
            store,
            version,
            next_shard: 0,
            buffered: Vec::new().into_iter(),
        }
    }
}

impl<K, V> Iterator for Entries<'_, K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    type Item = (K, Arc<V>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.buffered.next() {
                return Some(entry);
            }
            if self.next_shard >= self.store.shard_count() {
                return None;
            }
            let shard = self.store.read_shard(self.next_shard);
            self.buffered = visible_entries(&shard, self.version).into_iter();
            self.next_shard += 1;
        }
    }
}

impl<K, V> FusedIterator for Entries<'_, K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
}

impl<K, V> std::fmt::Debug for Entries<'_, K, V> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Entries")
            .field("version", &self.version)
            .field("next_shard", &self.next_shard)
            .field("buffered", &self.buffered.len())
            .finish()
    }
}
