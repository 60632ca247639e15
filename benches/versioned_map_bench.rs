//! Benchmark for VersionedMap vs standard HashMap.
//!
//! Measures plain reads and writes against `HashMap`, and the cost of taking
//! a snapshot per round against cloning the whole table.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use fastcopy::VersionedMap;
use std::collections::HashMap;
use std::hint::black_box;

// =============================================================================
// put Benchmark
// =============================================================================

fn benchmark_put(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("put");

    for size in [1_000, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::new("VersionedMap", size), &size, |bencher, &size| {
            bencher.iter(|| {
                let map = VersionedMap::new();
                for index in 0..size {
                    map.put(black_box(index), black_box(index * 2));
                }
                black_box(map)
            });
        });

        group.bench_with_input(BenchmarkId::new("HashMap", size), &size, |bencher, &size| {
            bencher.iter(|| {
                let mut map = HashMap::new();
                for index in 0..size {
                    map.insert(black_box(index), black_box(index * 2));
                }
                black_box(map)
            });
        });
    }

    group.finish();
}

// =============================================================================
// get Benchmark
// =============================================================================

fn benchmark_get(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("get");

    for size in [100, 1_000, 10_000] {
        let versioned_map = VersionedMap::new();
        for index in 0..size {
            versioned_map.put(index, index * 2);
        }
        let standard_map: HashMap<i32, i32> = (0..size).map(|index| (index, index * 2)).collect();

        group.bench_with_input(BenchmarkId::new("VersionedMap", size), &size, |bencher, &size| {
            bencher.iter(|| {
                let mut sum = 0;
                for key in 0..size {
                    if let Some(value) = versioned_map.get(&black_box(key)) {
                        sum += *value;
                    }
                }
                black_box(sum)
            });
        });

        group.bench_with_input(BenchmarkId::new("HashMap", size), &size, |bencher, &size| {
            bencher.iter(|| {
                let mut sum = 0;
                for key in 0..size {
                    if let Some(&value) = standard_map.get(&black_box(key)) {
                        sum += value;
                    }
                }
                black_box(sum)
            });
        });
    }

    group.finish();
}

// =============================================================================
// Round Benchmark (write a few keys, freeze, release the previous round)
// =============================================================================

fn benchmark_round(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("round");

    for size in [1_000, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::new("VersionedMap::copy", size), &size, |bencher, &size| {
            let mut map = VersionedMap::new();
            for index in 0..size {
                map.put(index, index);
            }
            let mut previous = map.copy();
            let mut round = 0;
            bencher.iter(|| {
                round += 1;
                for key in 0..16 {
                    map.put(black_box(key), round);
                }
                let frozen = map.copy();
                let released = std::mem::replace(&mut previous, frozen).release();
                black_box(released)
            });
            map.await_reclamation();
        });

        group.bench_with_input(BenchmarkId::new("HashMap::clone", size), &size, |bencher, &size| {
            let mut map: HashMap<i32, i32> = (0..size).map(|index| (index, index)).collect();
            let mut round = 0;
            bencher.iter(|| {
                round += 1;
                for key in 0..16 {
                    map.insert(black_box(key), round);
                }
                black_box(map.clone())
            });
        });
    }

    group.finish();
}

// =============================================================================
// Snapshot iteration Benchmark
// =============================================================================

fn benchmark_snapshot_entries(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("snapshot_entries");

    for size in [1_000, 10_000] {
        let mut map = VersionedMap::new();
        for index in 0..size {
            map.put(index, index);
        }
        let frozen = map.copy();
        for index in (0..size).step_by(2) {
            map.put(index, -index);
        }

        group.bench_with_input(BenchmarkId::new("Snapshot", size), &size, |bencher, _| {
            bencher.iter(|| {
                let sum: i64 = frozen.entries().map(|(_, value)| i64::from(*value)).sum();
                black_box(sum)
            });
        });
    }

    group.finish();
}

// =============================================================================
// Criterion Group and Main
// =============================================================================

criterion_group!(
    benches,
    benchmark_put,
    benchmark_get,
    benchmark_round,
    benchmark_snapshot_entries
);

criterion_main!(benches);
