//! Parallel construction of the reverse relation from a forward map.

use std::hash::Hash;
use std::sync::Arc;

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use rustc_hash::FxHashMap;
use tracing::debug;

use super::InvertibleMap;
use crate::error::RebuildError;
use crate::map::VersionedMap;
use crate::relation::OneToMany;
use crate::settings::FamilySettings;

type Grouped<K, V> = FxHashMap<V, Vec<K>>;

impl<K, V> InvertibleMap<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Hash + Eq + Clone + Send + Sync + 'static,
{
    /// Builds an invertible map around an existing forward map.
    ///
    /// The forward entries are split into
    /// `rebuild_thread_count * rebuild_split_factor` chunks and grouped by
    /// value on a dedicated pool of `rebuild_thread_count` threads. The
    /// reverse relation is then bulk loaded in one pass.
    ///
    /// The reverse relation starts a family of its own, so its internal
    /// version numbering is independent of `forward`'s. Snapshots of the
    /// result report the forward map's version.
    ///
    /// # Errors
    ///
    /// Returns a [`RebuildError`] if `settings` does not validate or the
    /// thread pool cannot be created.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fastcopy::{FamilySettings, InvertibleMap, VersionedMap};
    ///
    /// let forward = VersionedMap::new();
    /// for account in 0..1_000_u32 {
    ///     forward.put(account, account % 10);
    /// }
    ///
    /// let settings = FamilySettings::default().with_rebuild_thread_count(2);
    /// let map = InvertibleMap::rebuild(forward, &settings).unwrap();
    ///
    /// assert_eq!(map.size(), 1_000);
    /// assert_eq!(map.get_key_count(&3), 100);
    /// ```
    pub fn rebuild(mut forward: VersionedMap<K, V>, settings: &FamilySettings) -> Result<Self, RebuildError> {
        settings.validate()?;
        let entries: Vec<(K, Arc<V>)> = forward.entries().collect();
        let chunk_size = chunk_size(entries.len(), settings);

        let pool = ThreadPoolBuilder::new()
            .num_threads(settings.rebuild_thread_count)
            .thread_name(|index| format!("fastcopy-rebuild-{index}"))
            .build()
            .map_err(|error| RebuildError::ThreadPool(error.to_string()))?;

        let grouped = pool.install(|| {
            entries
                .par_chunks(chunk_size)
                .map(group_chunk)
                .reduce(Grouped::default, merge_groups)
        });

        let mut loader = OneToMany::loader_with_settings(settings.clone())?;
        let values = grouped.len();
        for (value, keys) in grouped {
            for key in keys {
                loader.initial_injection(value.clone(), key);
            }
        }
        debug!(
            entries = entries.len(),
            values,
            chunk_size,
            threads = settings.rebuild_thread_count,
            "rebuilt reverse relation"
        );

        Ok(Self {
            forward,
            inverse: loader.finalize_initial_size(),
        })
    }
}

fn chunk_size(len: usize, settings: &FamilySettings) -> usize {
    let chunks = settings
        .rebuild_thread_count
        .saturating_mul(settings.rebuild_split_factor)
        .max(1);
    len.div_ceil(chunks).max(1)
}

fn group_chunk<K: Clone, V: Hash + Eq + Clone>(chunk: &[(K, Arc<V>)]) -> Grouped<K, V> {
    let mut grouped = Grouped::default();
    for (key, value) in chunk {
        grouped
            .entry(V::clone(value))
            .or_insert_with(Vec::new)
            .push(key.clone());
    }
    grouped
}

fn merge_groups<K, V: Hash + Eq>(mut left: Grouped<K, V>, mut right: Grouped<K, V>) -> Grouped<K, V> {
    if left.len() < right.len() {
        std::mem::swap(&mut left, &mut right);
    }
    for (value, keys) in right {
        left.entry(value).or_default().extend(keys);
    }
    left
}
