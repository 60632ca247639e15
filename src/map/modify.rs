//! In-place modification guard.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::MappedRwLockWriteGuard;

/// Exclusive access to a value owned by the mutable version.
///
/// Returned by [`VersionedMap::get_for_modify`](crate::VersionedMap::get_for_modify).
/// Dereferences mutably to the value; changes are visible to the mutable
/// version only.
///
/// # Deadlocks
///
/// The guard holds the write lock of the shard containing the key. Reading
/// or writing any key of the same family from the holding thread while the
/// guard is alive may deadlock. Drop the guard first.
pub struct ForModify<'a, V> {
    value: MappedRwLockWriteGuard<'a, V>,
    original: Option<Arc<V>>,
}

impl<'a, V> ForModify<'a, V> {
    pub(crate) const fn new(value: MappedRwLockWriteGuard<'a, V>, original: Option<Arc<V>>) -> Self {
        Self { value, original }
    }

    /// The ancestor value the guarded copy was made from.
    ///
    /// `None` when the value had already been written in the mutable version,
    /// so no copy was needed.
    #[must_use]
    pub fn original(&self) -> Option<&V> {
        self.original.as_deref()
    }
}

impl<V> Deref for ForModify<'_, V> {
    type Target = V;

    fn deref(&self) -> &V {
        &self.value
    }
}

impl<V> DerefMut for ForModify<'_, V> {
    fn deref_mut(&mut self) -> &mut V {
        &mut self.value
    }
}

impl<V: fmt::Debug> fmt::Debug for ForModify<'_, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ForModify")
            .field("value", &*self.value)
            .field("original", &self.original)
            .finish()
    }
}
