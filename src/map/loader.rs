//! Bulk loading of a root map.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use tracing::debug;

use super::versioned::VersionedMap;
use crate::family::FamilyStore;
use crate::Version;

/// Fills a brand-new family at [`Version::ORIGIN`] without per-write
/// bookkeeping.
///
/// Injection skips size accounting and the reclamation index. Both are
/// settled once by [`finalize_initial_size`](Self::finalize_initial_size),
/// which hands back the ordinary mutable map. Until then no copy can exist,
/// so nothing can observe the partially loaded table.
///
/// # Examples
///
/// ```rust
/// use fastcopy::VersionedMap;
///
/// let mut loader = VersionedMap::loader();
/// for account in 0..100_u32 {
///     loader.initial_injection(account, u64::from(account) * 10);
/// }
/// let map = loader.finalize_initial_size();
///
/// assert_eq!(map.size(), 100);
/// assert_eq!(map.get(&7).as_deref(), Some(&70));
/// ```
pub struct InitialLoader<K, V> {
    store: Arc<FamilyStore<K, V>>,
    injected: usize,
}

impl<K, V> InitialLoader<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub(crate) const fn new(store: Arc<FamilyStore<K, V>>) -> Self {
        Self { store, injected: 0 }
    }

    /// Writes `key -> value` directly into the root version. A later
    /// injection of the same key overwrites the earlier one.
    pub fn initial_injection(&mut self, key: K, value: V) {
        self.store.inject(key, Arc::new(value));
        self.injected += 1;
    }

    /// Number of injections made so far, duplicates included.
    #[must_use]
    pub const fn injected(&self) -> usize {
        self.injected
    }

    /// Computes the element count once and returns the mutable root map.
    #[must_use]
    pub fn finalize_initial_size(self) -> VersionedMap<K, V> {
        let size = self.store.count_visible(Version::ORIGIN);
        debug!(size, injected = self.injected, "finalized initial load");
        VersionedMap::from_parts(self.store, Version::ORIGIN, size)
    }
}

impl<K, V> fmt::Debug for InitialLoader<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("InitialLoader")
            .field("injected", &self.injected)
            .finish_non_exhaustive()
    }
}
