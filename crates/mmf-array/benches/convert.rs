//! Bulk width conversion benchmarks.
//!
//! Compares the direct `i64` copy, native widening and packed sign
//! extension, plus reading a mapped packed array back as `i64`.
//!
//! Run with:
//! ```bash
//! cargo bench --bench convert
//! ```

#![allow(clippy::expect_used)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use mmf_array::convert::{copy_range_from_i64, copy_range_to_i64};
use mmf_array::record::{Int24, Int40, UInt56};
use mmf_array::{ArrayConfig, Int64Adapter};
use std::hint::black_box;

const SIZES: [usize; 3] = [1_000, 100_000, 1_000_000];

fn values(len: usize, modulus: i64) -> Vec<i64> {
    (0..len as i64).map(|i| (i * 7919) % modulus - modulus / 2).collect()
}

/// Widen each storage width to `i64`.
fn bench_widen(c: &mut Criterion) {
    let mut group = c.benchmark_group("widen");
    for &len in &SIZES {
        group.throughput(Throughput::Elements(len as u64));
        let mut destination = vec![0i64; len];

        let native: Vec<i64> = values(len, i64::from(i32::MAX));
        group.bench_with_input(BenchmarkId::new("i64", len), &native, |b, source| {
            b.iter(|| copy_range_to_i64(black_box(source), &mut destination).expect("widen"));
        });

        let narrow: Vec<i32> = native
            .iter()
            .map(|&v| i32::try_from(v).expect("fits"))
            .collect();
        group.bench_with_input(BenchmarkId::new("i32", len), &narrow, |b, source| {
            b.iter(|| copy_range_to_i64(black_box(source), &mut destination).expect("widen"));
        });

        let mut packed24 = vec![Int24::ZERO; len];
        copy_range_from_i64(&values(len, 1 << 23), &mut packed24).expect("narrow");
        group.bench_with_input(BenchmarkId::new("int24", len), &packed24, |b, source| {
            b.iter(|| copy_range_to_i64(black_box(source), &mut destination).expect("widen"));
        });

        let mut packed40 = vec![Int40::ZERO; len];
        copy_range_from_i64(&native, &mut packed40).expect("narrow");
        group.bench_with_input(BenchmarkId::new("int40", len), &packed40, |b, source| {
            b.iter(|| copy_range_to_i64(black_box(source), &mut destination).expect("widen"));
        });

        let mut packed56 = vec![UInt56::ZERO; len];
        let unsigned: Vec<i64> = native.iter().map(|v| v.abs()).collect();
        copy_range_from_i64(&unsigned, &mut packed56).expect("narrow");
        group.bench_with_input(BenchmarkId::new("uint56", len), &packed56, |b, source| {
            b.iter(|| copy_range_to_i64(black_box(source), &mut destination).expect("widen"));
        });
    }
    group.finish();
}

/// Range-checked narrowing from `i64`.
fn bench_narrow(c: &mut Criterion) {
    let mut group = c.benchmark_group("narrow");
    for &len in &SIZES {
        group.throughput(Throughput::Elements(len as u64));
        let source = values(len, 1 << 39);
        let mut destination = vec![Int40::ZERO; len];
        group.bench_with_input(BenchmarkId::new("int40", len), &source, |b, source| {
            b.iter(|| copy_range_from_i64(black_box(source), &mut destination).expect("narrow"));
        });
    }
    group.finish();
}

/// Read a mapped packed array back as `i64`.
fn bench_mapped_span(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let len = 1_000_000;
    let config = ArrayConfig::default().with_capacity_hint(len as u64);
    let mut adapter = Int64Adapter::<Int40>::open_with_config(dir.path().join("bench.bt"), &config)
        .expect("Failed to create benchmark array");
    adapter
        .extend_from_slice(&values(len, 1 << 39))
        .expect("Failed to fill benchmark array");

    let mut group = c.benchmark_group("mapped");
    group.throughput(Throughput::Elements(len as u64));
    group.bench_function("int40_as_span", |b| {
        b.iter(|| adapter.as_span(0, black_box(len)).expect("span"));
    });
    group.bench_function("int40_utilization_scan", |b| {
        b.iter(|| {
            let reopened = Int64Adapter::<Int40>::open_with_config(
                dir.path().join("bench.bt"),
                &ArrayConfig::reader(),
            )
            .expect("reopen");
            black_box(reopened.data_type_utilization().expect("scan"))
        });
    });
    group.finish();
}

criterion_group!(benches, bench_widen, bench_narrow, bench_mapped_span);
criterion_main!(benches);
