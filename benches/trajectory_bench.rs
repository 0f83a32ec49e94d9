//! Benchmarks for the pathline trajectory store
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use pathline::{Instant, State, Trajectory};

fn build_trajectory(count: usize) -> Trajectory {
    let mut trajectory = Trajectory::new();
    for i in 0..count {
        let t = Instant::from_millis(i as i64 * 1000);
        trajectory
            .append(t, State::new([i as f64, 0.0, 0.0], [1.0, 0.0, 0.0]))
            .unwrap();
    }
    trajectory
}

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");

    for size in [1_000, 10_000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("append_{}", size), |b| {
            b.iter(|| build_trajectory(black_box(size)))
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");

    let trajectory = build_trajectory(10_000);
    let probe = Instant::from_millis(5_000_000);

    group.bench_function("find", |b| {
        b.iter(|| trajectory.find(black_box(probe)).is_some())
    });

    group.bench_function("lower_bound", |b| {
        b.iter(|| trajectory.lower_bound(black_box(probe)).peek().copied())
    });

    group.finish();
}

fn bench_iterate(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate");

    let trajectory = build_trajectory(10_000);
    group.throughput(Throughput::Elements(10_000));

    group.bench_function("full_traversal", |b| {
        b.iter(|| trajectory.iter().map(|s| s.time.as_nanos()).sum::<i64>())
    });

    group.finish();
}

fn bench_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialization");

    let trajectory = build_trajectory(10_000);
    group.throughput(Throughput::Elements(10_000));

    group.bench_function("encode_10000", |b| {
        b.iter(|| trajectory.to_bytes(black_box(&[]), &[]).unwrap())
    });

    let bytes = trajectory.to_bytes(&[], &[]).unwrap();

    group.bench_function("decode_10000", |b| {
        b.iter(|| Trajectory::from_bytes(black_box(&bytes)).unwrap())
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_append,
    bench_lookup,
    bench_iterate,
    bench_serialization
);
criterion_main!(benches);
