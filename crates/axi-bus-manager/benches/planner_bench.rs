//! Performance benchmarks for the burst planner.
//!
//! Measures the cost of splitting a byte-range request into protocol-legal
//! bursts, shaping per-beat write data, and deriving a read-reassembly
//! layout, across the request sizes most representative of the planner's
//! intended use.

#![allow(missing_docs)]

use axi_bus_manager::planner::{plan, read_layout, shape_write_beats};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

/// Benchmark single-burst planning at various small lengths.
fn bench_plan_small(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan/small");
    group.throughput(Throughput::Elements(1));

    for length in [1u64, 4, 16, 64] {
        group.bench_with_input(BenchmarkId::new("aligned", length), &length, |b, &length| {
            b.iter(|| black_box(plan(black_box(0x1000), black_box(length), 2, 8).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark a large multi-burst plan (1024 bytes, splitting into several
/// 256-beat bursts).
fn bench_plan_large(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan/large");
    group.throughput(Throughput::Bytes(1024));

    group.bench_function("1024_bytes_4_bursts", |b| {
        b.iter(|| black_box(plan(black_box(0x1000), 1024, 2, 4).unwrap()));
    });

    group.finish();
}

/// Benchmark a plan whose request spans a 4 KiB burst boundary.
fn bench_plan_boundary_spanning(c: &mut Criterion) {
    c.bench_function("plan/boundary_spanning", |b| {
        b.iter(|| black_box(plan(black_box(0x0FF0), 32, 3, 8).unwrap()));
    });
}

/// Benchmark write-beat shaping (lane placement and strobe derivation).
fn bench_shape_write_beats(c: &mut Criterion) {
    let data = vec![0xAAu8; 1024];
    let planned = plan(0x1003, data.len() as u64, 2, 4).unwrap();

    let mut group = c.benchmark_group("shape_write_beats");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("1024_bytes_unaligned", |b| {
        b.iter(|| black_box(shape_write_beats(black_box(&data), &planned, 4)));
    });
    group.finish();
}

/// Benchmark read-layout derivation, the read-side analogue of beat shaping.
fn bench_read_layout(c: &mut Criterion) {
    let planned = plan(0x1003, 1024, 2, 4).unwrap();

    let mut group = c.benchmark_group("read_layout");
    group.throughput(Throughput::Bytes(1024));
    group.bench_function("1024_bytes_unaligned", |b| {
        b.iter(|| black_box(read_layout(black_box(&planned), 4)));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_plan_small,
    bench_plan_large,
    bench_plan_boundary_spanning,
    bench_shape_write_beats,
    bench_read_layout,
);
criterion_main!(benches);
