//! Criterion benchmarks for the per-read hot path.
//!
//! Every device read goes through `Aggregator::push_batch`, and every
//! completed point through `BatchWriter::append`. At high scan rates these
//! run once per read, so they set the ceiling on loop throughput.
//!
//! Run with: cargo bench --bench aggregator

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use temp_stream::data::aggregator::{Aggregator, DataPoint, LostSamplePolicy};
use temp_stream::data::storage::{format_row, BatchWriter};
use temp_stream::source::LOST_SAMPLE_SENTINEL;

fn is_lost(v: f64) -> bool {
    v == LOST_SAMPLE_SENTINEL
}

/// Batch reduction for typical scans-per-read sizes.
fn aggregator_push_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregator_push_batch");

    for size in [10usize, 100, 1_000, 10_000] {
        let batch: Vec<f64> = (0..size).map(|i| 0.4 + (i % 7) as f64 * 1e-3).collect();
        let mut agg = Aggregator::new(10, 50.0, 0.0);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("include", size), &batch, |b, batch| {
            b.iter(|| black_box(agg.push_batch(black_box(batch), is_lost)));
        });
    }

    group.finish();
}

/// Exclusion filtering with a fraction of lost samples.
fn aggregator_exclude_lost(c: &mut Criterion) {
    let batch: Vec<f64> = (0..1_000)
        .map(|i| if i % 10 == 0 { LOST_SAMPLE_SENTINEL } else { 0.4 })
        .collect();
    let mut agg = Aggregator::new(10, 50.0, 0.0).with_policy(LostSamplePolicy::Exclude);

    c.bench_function("aggregator_exclude_1000", |b| {
        b.iter(|| black_box(agg.push_batch(black_box(&batch), is_lost)));
    });
}

fn row_formatting(c: &mut Criterion) {
    let point = DataPoint::new(1_709_802_000.123456, 21.987654321);
    c.bench_function("format_row", |b| {
        b.iter(|| black_box(format_row(black_box(&point))));
    });
}

/// Buffered appends with a flush to disk every `points_per_write` points.
fn writer_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("writer_append");

    for ppw in [1usize, 60, 600] {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut writer = BatchWriter::new(ppw, "bench").with_output_dir(temp_dir.path());
        let point = DataPoint::new(1_709_802_000.0, 20.0);

        group.bench_with_input(BenchmarkId::new("points_per_write", ppw), &ppw, |b, _| {
            b.iter(|| black_box(writer.append(black_box(point)).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    aggregator_push_batch,
    aggregator_exclude_lost,
    row_formatting,
    writer_append
);
criterion_main!(benches);
