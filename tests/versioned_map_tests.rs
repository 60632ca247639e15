//! Integration tests for VersionedMap and Snapshot.

use fastcopy::{FamilySettings, MapView, Version, VersionedMap};
use rstest::rstest;
use std::collections::HashMap;
use std::sync::Arc;

fn value_of<M: MapView<String, i32>>(view: &M, key: &str) -> Option<i32> {
    view.get(&key.to_string()).map(|value| *value)
}

// =============================================================================
// Basic reads and writes
// =============================================================================

#[rstest]
fn test_new_map_is_empty_at_origin() {
    let map: VersionedMap<String, i32> = VersionedMap::new();
    assert!(map.is_empty());
    assert_eq!(map.size(), 0);
    assert_eq!(map.version(), Version::ORIGIN);
    assert_eq!(map.get("missing"), None);
}

#[rstest]
fn test_put_get_remove() {
    let map = VersionedMap::new();
    map.put("one".to_string(), 1);
    map.put("two".to_string(), 2);

    assert_eq!(map.get("one").as_deref(), Some(&1));
    assert!(map.contains_key("two"));
    assert_eq!(map.remove("one").as_deref(), Some(&1));
    assert_eq!(map.get("one"), None);
    assert_eq!(map.size(), 1);
}

#[rstest]
fn test_put_shared_stores_the_same_allocation() {
    let map = VersionedMap::new();
    let shared = Arc::new(vec![1, 2, 3]);
    map.put_shared("k", Arc::clone(&shared));

    let read = map.get("k").unwrap();
    assert!(Arc::ptr_eq(&read, &shared));
}

// =============================================================================
// Snapshot isolation
// =============================================================================

#[rstest]
fn test_concrete_round_scenario() {
    let mut map = VersionedMap::new();
    map.put("a".to_string(), 1);

    let version_0 = map.copy();
    assert_eq!(version_0.version(), Version::ORIGIN);
    assert_eq!(map.version(), Version::new(1));

    map.put("a".to_string(), 2);
    assert_eq!(value_of(&version_0, "a"), Some(1));
    assert_eq!(value_of(&map, "a"), Some(2));

    version_0.release().unwrap();
    map.await_reclamation();

    assert_eq!(value_of(&map, "a"), Some(2));
    assert_eq!(map.size(), 1);
}

#[rstest]
fn test_empty_root_scenario() {
    let mut map: VersionedMap<&str, i32> = VersionedMap::new();
    let version_0 = map.copy();
    map.put("a", 2);

    assert_eq!(version_0.get("a"), None);
    assert_eq!(map.get("a").as_deref(), Some(&2));

    version_0.release().unwrap();
    map.await_reclamation();
    assert_eq!(map.get("a").as_deref(), Some(&2));
}

#[rstest]
fn test_tombstone_precedence() {
    let mut map = VersionedMap::new();
    map.put("k", 1);
    let ancestor = map.copy();
    map.remove("k");
    let after_remove = map.copy();

    assert_eq!(after_remove.get("k"), None);
    assert_eq!(map.get("k"), None);
    assert_eq!(ancestor.get("k").as_deref(), Some(&1));
}

#[rstest]
fn test_reinsert_after_remove_across_versions() {
    let mut map = VersionedMap::new();
    map.put("k", 1);
    let first = map.copy();
    map.remove("k");
    let second = map.copy();
    map.put("k", 3);

    assert_eq!(first.get("k").as_deref(), Some(&1));
    assert_eq!(second.get("k"), None);
    assert_eq!(map.get("k").as_deref(), Some(&3));
    assert_eq!((first.size(), second.size(), map.size()), (1, 0, 1));
}

#[rstest]
fn test_versions_increase_monotonically() {
    let mut map: VersionedMap<u8, u8> = VersionedMap::new();
    let mut snapshots = Vec::new();
    for _ in 0..10 {
        snapshots.push(map.copy());
    }
    let versions: Vec<u64> = snapshots.iter().map(|snapshot| snapshot.version().get()).collect();
    assert_eq!(versions, (0..10).collect::<Vec<_>>());
    assert_eq!(map.version(), Version::new(10));
}

// =============================================================================
// get_for_modify
// =============================================================================

#[rstest]
fn test_get_for_modify_never_changes_snapshots() {
    let mut map = VersionedMap::new();
    map.put("ledger", vec![1]);
    let frozen = map.copy();

    {
        let mut ledger = map.get_for_modify("ledger").unwrap();
        assert_eq!(ledger.original(), Some(&vec![1]));
        ledger.push(2);
    }
    {
        let mut ledger = map.get_for_modify("ledger").unwrap();
        assert_eq!(ledger.original(), None);
        ledger.push(3);
    }

    assert_eq!(frozen.get("ledger").as_deref(), Some(&vec![1]));
    assert_eq!(map.get("ledger").as_deref(), Some(&vec![1, 2, 3]));
    assert_eq!(map.size(), 1);
}

#[rstest]
fn test_get_for_modify_of_removed_key_is_none() {
    let mut map = VersionedMap::new();
    map.put("k", 1);
    let _frozen = map.copy();
    map.remove("k");
    assert!(map.get_for_modify("k").is_none());
}

// =============================================================================
// Size and iteration
// =============================================================================

#[rstest]
fn test_size_matches_visible_entries() {
    let mut map = VersionedMap::new();
    for key in 0..100 {
        map.put(key, key * 2);
    }
    for key in (0..100).step_by(3) {
        map.remove(&key);
    }
    let frozen = map.copy();

    let visible: HashMap<i32, i32> = frozen
        .entries()
        .map(|(key, value)| (key, *value))
        .collect();
    assert_eq!(visible.len(), frozen.size());
    assert_eq!(visible.len(), 66);
    assert!(visible.iter().all(|(key, value)| *value == key * 2 && key % 3 != 0));
}

#[rstest]
fn test_entries_on_mutable_handle() {
    let mut map = VersionedMap::new();
    map.put("a", 1);
    map.put("b", 2);
    let mut pairs: Vec<(&str, i32)> = map.entries().map(|(key, value)| (key, *value)).collect();
    pairs.sort_unstable();
    assert_eq!(pairs, vec![("a", 1), ("b", 2)]);
}

#[rstest]
fn test_entries_of_snapshot_ignore_later_writes() {
    let mut map = VersionedMap::new();
    map.put(1, 'a');
    let frozen = map.copy();
    let entries = frozen.entries();
    map.put(2, 'b');
    map.remove(&1);

    let seen: Vec<(i32, char)> = entries.map(|(key, value)| (key, *value)).collect();
    assert_eq!(seen, vec![(1, 'a')]);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[rstest]
fn test_release_of_mutable_handle() {
    let mut map: VersionedMap<u8, u8> = VersionedMap::new();
    let frozen = map.copy();
    assert_eq!(map.release(), Ok(()));
    assert_eq!(frozen.stats().live_versions, 1);
}

#[rstest]
fn test_custom_settings_are_shared_by_copies() {
    let settings = FamilySettings::default().with_shard_count(3).with_archive_enabled(true);
    let mut map: VersionedMap<u8, u8> = VersionedMap::with_settings(settings.clone()).unwrap();
    let _frozen = map.copy();
    assert_eq!(map.settings(), &settings);
}
