//! Benchmarks for segment hashing and root derivation
//!
//! Run with: cargo bench --package shardcast-core --bench hashing

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use shardcast_core::hash::ContentHash;
use shardcast_core::merkle::{Blake3HashTree, HashTree};

fn bench_segment_hash(c: &mut Criterion) {
    let data = vec![0xA5u8; 16 * 1024 * 1024];

    let mut group = c.benchmark_group("segment_hash_16MB");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("single", |b| b.iter(|| ContentHash::compute(black_box(&data))));
    group.bench_function("rayon", |b| {
        b.iter(|| ContentHash::compute_parallel(black_box(&data)))
    });
    group.finish();
}

fn bench_merkle_root(c: &mut Criterion) {
    let leaves: Vec<ContentHash> = (0..4096u64)
        .map(|i| ContentHash::compute(&i.to_le_bytes()))
        .collect();

    c.bench_function("merkle_root_4096_segments", |b| {
        b.iter(|| Blake3HashTree.build_root(black_box(&leaves)))
    });
}

criterion_group!(benches, bench_segment_hash, bench_merkle_root);
criterion_main!(benches);
