//! Benchmark for OneToMany associate / disassociate and paged reads.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use fastcopy::OneToMany;
use std::hint::black_box;

// =============================================================================
// associate Benchmark
// =============================================================================

fn benchmark_associate(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("associate");

    for size in [1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("incremental", size), &size, |bencher, &size| {
            bencher.iter(|| {
                let mut relation = OneToMany::new();
                for value in 0..size {
                    relation.associate(black_box(value % 16), black_box(value));
                }
                black_box(relation)
            });
        });

        group.bench_with_input(BenchmarkId::new("loader", size), &size, |bencher, &size| {
            bencher.iter(|| {
                let mut loader = OneToMany::loader();
                for value in 0..size {
                    loader.initial_injection(black_box(value % 16), black_box(value));
                }
                black_box(loader.finalize_initial_size())
            });
        });
    }

    group.finish();
}

// =============================================================================
// disassociate Benchmark
// =============================================================================

fn benchmark_disassociate(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("disassociate");

    for size in [1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("OneToMany", size), &size, |bencher, &size| {
            bencher.iter(|| {
                let mut relation = OneToMany::new();
                for value in 0..size {
                    relation.associate(value % 16, value);
                }
                for value in (0..size).step_by(2) {
                    black_box(relation.disassociate(&(value % 16), &value).ok());
                }
                black_box(relation)
            });
        });
    }

    group.finish();
}

// =============================================================================
// get_range Benchmark
// =============================================================================

fn benchmark_get_range(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("get_range");

    for page in [10, 100, 1_000] {
        let mut relation = OneToMany::new();
        for value in 0..10_000 {
            relation.associate(0, value);
        }
        let frozen = relation.copy();

        group.bench_with_input(BenchmarkId::new("Snapshot", page), &page, |bencher, &page| {
            bencher.iter(|| {
                let sum: i64 = frozen
                    .get_range(&0, 0, page)
                    .map(|values| values.map(|value| i64::from(*value)).sum())
                    .unwrap_or_default();
                black_box(sum)
            });
        });
    }

    group.finish();
}

// =============================================================================
// Criterion Group and Main
// =============================================================================

criterion_group!(benches, benchmark_associate, benchmark_disassociate, benchmark_get_range);

criterion_main!(benches);
