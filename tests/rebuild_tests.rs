//! Integration tests for rebuilding an InvertibleMap's reverse relation.

#![cfg(feature = "rebuild")]

use fastcopy::{FamilySettings, InvertibleMap, RebuildError, SettingsError, VersionedMap};
use rstest::rstest;
use std::collections::BTreeSet;

fn forward_of(len: u32, values: u32) -> VersionedMap<u32, u32> {
    let forward = VersionedMap::new();
    for key in 0..len {
        forward.put(key, key % values);
    }
    forward
}

#[rstest]
#[case(1, 1)]
#[case(2, 7)]
#[case(4, 3)]
#[case(8, 1)]
fn test_rebuild_with_any_partitioning(#[case] threads: usize, #[case] split: usize) {
    let settings = FamilySettings::default()
        .with_rebuild_thread_count(threads)
        .with_rebuild_split_factor(split);
    let map = InvertibleMap::rebuild(forward_of(500, 7), &settings).unwrap();

    assert_eq!(map.size(), 500);
    for value in 0..7 {
        let keys: BTreeSet<u32> = map.get_keys(&value).map(|key| *key).collect();
        let expected: BTreeSet<u32> = (0..500).filter(|key| key % 7 == value).collect();
        assert_eq!(map.get_key_count(&value), expected.len());
        assert_eq!(keys, expected);
    }
}

#[rstest]
fn test_rebuild_of_empty_map() {
    let forward: VersionedMap<u32, u32> = VersionedMap::new();
    let map = InvertibleMap::rebuild(forward, &FamilySettings::default()).unwrap();
    assert!(map.is_empty());
    assert_eq!(map.get_key_count(&0), 0);
}

#[rstest]
fn test_rebuild_keeps_forward_snapshots_readable() {
    let mut forward = forward_of(10, 2);
    let before = forward.copy();
    forward.put(0, 5);

    let mut map = InvertibleMap::rebuild(forward, &FamilySettings::default()).unwrap();
    assert_eq!(before.get(&0).as_deref(), Some(&0));
    assert_eq!(map.get_key_count(&5), 1);
    assert_eq!(map.get_key_count(&0), 4);

    let frozen = map.copy();
    map.put(1, 5);
    assert_eq!(frozen.get_key_count(&5), 1);
    assert_eq!(map.get_key_count(&5), 2);
    assert!(before.release().is_ok());
}

#[rstest]
#[case(FamilySettings::default().with_rebuild_thread_count(0), SettingsError::InvalidThreadCount)]
#[case(FamilySettings::default().with_rebuild_split_factor(0), SettingsError::InvalidSplitFactor)]
fn test_rebuild_rejects_unusable_settings(#[case] settings: FamilySettings, #[case] expected: SettingsError) {
    let result = InvertibleMap::rebuild(forward_of(3, 1), &settings);
    assert_eq!(result.err(), Some(RebuildError::Settings(expected)));
}
