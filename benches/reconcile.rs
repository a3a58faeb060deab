//! Benchmarks for the classification pass (`calc_states`) with varying file
//! counts and change mixes (unchanged, new, modified, moved).

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dupsync::diff::calc_states;
use dupsync::{ContentHash, DiffState, FileEntry, Flat};
use std::hint::black_box;

fn mock_hash(seed: u64) -> ContentHash {
    let bytes = seed.to_le_bytes();
    let mut hash_bytes = [0u8; 32];
    for i in 0..4 {
        hash_bytes[i * 8..(i + 1) * 8].copy_from_slice(&bytes);
    }
    dupsync::hash::hash_bytes(&hash_bytes)
}

fn entry(name: String, seed: u64) -> FileEntry {
    FileEntry {
        name,
        size: 1024 * (seed + 1),
        hash: mock_hash(seed),
        mtime: 0,
        state: DiffState::Same,
        moved: false,
        is_clone: false,
        synced: false,
        ignore: false,
    }
}

fn build_flat(root: &str, count: usize) -> Flat {
    let mut flat = Flat::new(root);
    for i in 0..count {
        flat.insert(entry(format!("file_{i:05}.txt"), i as u64));
    }
    flat
}

fn build_modified(count: usize, modify_percent: usize) -> Flat {
    let mut flat = Flat::new("new/");
    let modify_count = (count * modify_percent) / 100;
    for i in 0..count {
        if i < modify_count {
            flat.insert(entry(format!("file_{i:05}.txt"), (i + 1_000_000) as u64));
        } else {
            flat.insert(entry(format!("file_{i:05}.txt"), i as u64));
        }
    }
    flat
}

fn build_renamed(count: usize, rename_percent: usize) -> Flat {
    let mut flat = Flat::new("new/");
    let rename_count = (count * rename_percent) / 100;
    for i in 0..count {
        if i < rename_count {
            flat.insert(entry(format!("renamed_{i:05}.txt"), i as u64));
        } else {
            flat.insert(entry(format!("file_{i:05}.txt"), i as u64));
        }
    }
    flat
}

fn bench_unchanged(c: &mut Criterion) {
    let mut group = c.benchmark_group("calc_states_unchanged");
    for count in [100usize, 1_000, 10_000] {
        let old = build_flat("old/", count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let mut new = build_flat("old/", count);
                calc_states(black_box(&old), black_box(&mut new));
                black_box(&new);
            });
        });
    }
    group.finish();
}

fn bench_modified(c: &mut Criterion) {
    let mut group = c.benchmark_group("calc_states_modified");
    for (name, count, pct) in
        [("1000_10pct", 1000, 10), ("1000_50pct", 1000, 50), ("1000_90pct", 1000, 90)]
    {
        let old = build_flat("old/", count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &(count, pct), |b, &(count, pct)| {
            b.iter(|| {
                let mut new = build_modified(count, pct);
                calc_states(black_box(&old), black_box(&mut new));
                black_box(&new);
            });
        });
    }
    group.finish();
}

fn bench_renamed(c: &mut Criterion) {
    let mut group = c.benchmark_group("calc_states_renamed");
    for (name, count, pct) in
        [("1000_10pct", 1000, 10), ("1000_50pct", 1000, 50), ("1000_90pct", 1000, 90)]
    {
        let old = build_flat("old/", count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &(count, pct), |b, &(count, pct)| {
            b.iter(|| {
                let mut new = build_renamed(count, pct);
                calc_states(black_box(&old), black_box(&mut new));
                black_box(&new);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_unchanged, bench_modified, bench_renamed);
criterion_main!(benches);
