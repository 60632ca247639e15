//! Fast-copyable versioned maps.
//!
//! A family of maps shares one backing table. The family always has exactly
//! one mutable handle, [`VersionedMap`], and any number of frozen
//! [`Snapshot`]s:
//!
//! - [`VersionedMap::copy`] freezes the current contents in O(1). The
//!   returned [`Snapshot`] keeps the old version; the map moves on.
//! - Writes made afterwards are invisible to every existing snapshot.
//! - Releasing (or dropping) a handle lets a background worker reclaim the
//!   history only that version could see.
//!
//! # Examples
//!
//! ```rust
//! use fastcopy::VersionedMap;
//!
//! let mut map = VersionedMap::new();
//! map.put("a", 1);
//!
//! let round_0 = map.copy();
//! map.put("a", 2);
//! map.remove("a");
//! let round_1 = map.copy();
//!
//! assert_eq!(round_0.get("a").as_deref(), Some(&1));
//! assert_eq!(round_1.get("a"), None);
//!
//! round_0.release().unwrap();
//! assert_eq!(round_1.get("a"), None);
//! ```
//!
//! # Reading either handle generically
//!
//! [`MapView`] is implemented by both handle types:
//!
//! ```rust
//! use fastcopy::{MapView, VersionedMap};
//!
//! fn total<M: MapView<&'static str, u64>>(view: &M, keys: &[&'static str]) -> u64 {
//!     keys.iter().filter_map(|key| view.get(key)).map(|value| *value).sum()
//! }
//!
//! let mut map = VersionedMap::new();
//! map.put("x", 3);
//! map.put("y", 4);
//! let frozen = map.copy();
//! map.put("x", 10);
//!
//! assert_eq!(total(&frozen, &["x", "y"]), 7);
//! assert_eq!(total(&map, &["x", "y"]), 14);
//! ```

mod entries;
mod handle;
mod loader;
mod modify;
mod snapshot;
mod versioned;

use std::sync::Arc;

use crate::Version;

pub use entries::Entries;
pub use loader::InitialLoader;
pub use modify::ForModify;
pub use snapshot::Snapshot;
pub use versioned::VersionedMap;

/// Read access shared by mutable and frozen handles.
pub trait MapView<K, V> {
    /// The version this view reads.
    fn version(&self) -> Version;

    /// Returns the value of `key` at this view's version.
    fn get(&self, key: &K) -> Option<Arc<V>>;

    /// Number of keys with a visible value.
    fn size(&self) -> usize;

    /// Returns `true` if `key` has a visible value.
    fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Returns `true` if no key has a visible value.
    fn is_empty(&self) -> bool {
        self.size() == 0
    }
}
