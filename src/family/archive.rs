//! Side archive for reclaimed mutation records.

use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::mutation::Records;
use crate::Version;

/// Records removed by the collector, grouped by key, oldest first.
#[derive(Debug)]
pub(crate) struct MutationArchive<K, V> {
    entries: Mutex<FxHashMap<K, Records<V>>>,
}

impl<K: Hash + Eq, V> MutationArchive<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    pub(crate) fn store(&self, key: K, removed: Records<V>) {
        if removed.is_empty() {
            return;
        }
        let mut entries = self.entries.lock();
        let archived = entries.entry(key).or_default();
        archived.extend(removed);
        archived.sort_by_key(|record| record.version);
    }

    pub(crate) fn history(&self, key: &K) -> Vec<(Version, Option<Arc<V>>)> {
        self.entries.lock().get(key).map_or_else(Vec::new, |records| {
            records
                .iter()
                .map(|record| (record.version, record.value.clone()))
                .collect()
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().values().map(|records| records.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::mutation::Mutation;
    use rstest::rstest;

    fn records(writes: &[(u64, Option<i32>)]) -> Records<i32> {
        writes
            .iter()
            .map(|(raw, value)| Mutation {
                version: Version::new(*raw),
                value: value.map(Arc::new),
            })
            .collect()
    }

    #[rstest]
    fn test_history_is_ordered_across_batches() {
        let archive = MutationArchive::new();
        archive.store("a", records(&[(4, Some(2))]));
        archive.store("a", records(&[(1, Some(1)), (3, None)]));

        let history: Vec<_> = archive
            .history(&"a")
            .into_iter()
            .map(|(version, value)| (version.get(), value.as_deref().copied()))
            .collect();
        assert_eq!(history, vec![(1, Some(1)), (3, None), (4, Some(2))]);
        assert_eq!(archive.len(), 3);
    }

    #[rstest]
    fn test_unknown_key_has_empty_history() {
        let archive: MutationArchive<&str, i32> = MutationArchive::new();
        archive.store("a", Records::new());
        assert!(archive.history(&"a").is_empty());
        assert_eq!(archive.len(), 0);
    }
}
