//! One-to-many relations on top of versioned maps.
//!
//! A [`OneToMany`] associates each key with a set of values stored in dense
//! slots `0..count`. It is built from two versioned maps:
//!
//! - `(key, slot) -> value`, the associations themselves;
//! - `key -> count`, the number of populated slots per key.
//!
//! Removing an association moves the key's last association into the freed
//! slot, so slots never have gaps and any sub-range can be paged through
//! directly. A `(key, value) -> slot` lookup, kept only by the mutable
//! relation, makes that removal O(1).
//!
//! # Examples
//!
//! ```rust
//! use fastcopy::OneToMany;
//!
//! let mut owners = OneToMany::new();
//! owners.associate("alice", 1_u32);
//! owners.associate("alice", 2);
//! owners.associate("alice", 3);
//!
//! let before = owners.copy();
//! owners.disassociate(&"alice", &1).unwrap();
//!
//! let mut now: Vec<u32> = owners.get(&"alice").map(|value| *value).collect();
//! now.sort_unstable();
//! assert_eq!(now, vec![2, 3]);
//! assert_eq!(before.get_count(&"alice"), 3);
//! ```

mod loader;
mod one_to_many;

use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::ops::Range;
use std::sync::Arc;

use tracing::error;

use crate::error::RangeError;
use crate::map::MapView;

pub use loader::OneToManyLoader;
pub use one_to_many::{OneToMany, OneToManySnapshot};

pub(crate) const STRUCTURE: &str = "one-to-many relation";

/// Lazy iterator over a range of one key's association slots.
///
/// Returned by `get` and `get_range` on [`OneToMany`] and
/// [`OneToManySnapshot`].
///
/// # Panics
///
/// Advancing panics if a slot below the key's count is empty. Slots are
/// dense by construction, so an empty one means the relation is corrupt.
pub struct Associations<'a, M, K, V> {
    associations: &'a M,
    key: K,
    slots: Range<usize>,
    value: PhantomData<fn() -> V>,
}

impl<'a, M, K, V> Associations<'a, M, K, V> {
    const fn new(associations: &'a M, key: K, slots: Range<usize>) -> Self {
        Self {
            associations,
            key,
            slots,
            value: PhantomData,
        }
    }
}

impl<M, K, V> Iterator for Associations<'_, M, K, V>
where
    M: MapView<(K, usize), V>,
    K: Clone,
{
    type Item = Arc<V>;

    fn next(&mut self) -> Option<Arc<V>> {
        let slot = self.slots.next()?;
        if let Some(value) = self.associations.get(&(self.key.clone(), slot)) {
            return Some(value);
        }
        let version = self.associations.version();
        error!(structure = STRUCTURE, slot, %version, "dense slot is empty");
        panic!("{STRUCTURE} invariant broken at {version}: slot {slot} below the count is empty");
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.slots.len(), Some(self.slots.len()))
    }
}

impl<M, K, V> ExactSizeIterator for Associations<'_, M, K, V>
where
    M: MapView<(K, usize), V>,
    K: Clone,
{
}

impl<M, K, V> FusedIterator for Associations<'_, M, K, V>
where
    M: MapView<(K, usize), V>,
    K: Clone,
{
}

impl<M, K: fmt::Debug, V> fmt::Debug for Associations<'_, M, K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Associations")
            .field("key", &self.key)
            .field("slots", &self.slots)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Shared reads
// =============================================================================

fn count_in<K, C: MapView<K, usize>>(counts: &C, key: &K) -> usize {
    counts.get(key).map_or(0, |count| *count)
}

fn slots_of<'a, M, C, K, V>(
    associations: &'a M,
    counts: &C,
    key: &K,
    start: usize,
    end: usize,
) -> Result<Associations<'a, M, K, V>, RangeError>
where
    M: MapView<(K, usize), V>,
    C: MapView<K, usize>,
    K: Clone,
{
    let count = count_in(counts, key);
    if start > end || end > count {
        return Err(RangeError { start, end, count });
    }
    Ok(Associations::new(associations, key.clone(), start..end))
}

fn all_slots_of<'a, M, C, K, V>(associations: &'a M, counts: &C, key: &K) -> Associations<'a, M, K, V>
where
    M: MapView<(K, usize), V>,
    C: MapView<K, usize>,
    K: Clone,
{
    Associations::new(associations, key.clone(), 0..count_in(counts, key))
}
