//! Throughput Benchmarks
//!
//! Benchmarks for measuring:
//! - Recency cache get/put under eviction pressure
//! - Disk store put and get, with and without the memory tier
//!
//! Run with: cargo bench --bench throughput -p kash-store

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

use kash_store::{CacheConfig, CacheOption, DiskStore, RecencyCache};

/// Benchmark the recency cache with a working set larger than its capacity
fn bench_recency_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("recency_cache");

    for capacity in [16usize, 1024] {
        let cache = RecencyCache::new(capacity).expect("capacity is positive");
        let working_set = capacity as u64 * 2;

        group.bench_with_input(BenchmarkId::new("put_get", capacity), &cache, |b, cache| {
            let mut i = 0u64;
            b.iter(|| {
                let key = i % working_set;
                cache.put(key, i).expect("bookkeeping stays consistent");
                black_box(cache.get(&(key / 2)));
                i += 1;
            })
        });
    }

    group.finish();
}

/// Benchmark disk store round trips at a few payload sizes
fn bench_disk_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("disk_store");
    group.sample_size(20);

    for (name, size) in [("1KB", 1024usize), ("64KB", 64 * 1024)] {
        let data: Vec<u8> = (0..size).map(|i| (i % 256) as u8).collect();
        group.throughput(Throughput::Bytes(size as u64));

        let temp_dir = TempDir::new().expect("temp dir");
        let store = DiskStore::open(&CacheConfig::at(temp_dir.path())).expect("open store");

        group.bench_with_input(BenchmarkId::new("put", name), &data, |b, data| {
            b.iter(|| {
                store
                    .put("bench", data.clone(), CacheOption::empty())
                    .expect("put");
            })
        });

        group.bench_with_input(BenchmarkId::new("get_disk", name), &data, |b, _| {
            b.iter(|| black_box(store.get("bench").expect("get")))
        });

        let memory_dir = TempDir::new().expect("temp dir");
        let memory_store =
            DiskStore::open(&CacheConfig::at(memory_dir.path()).with_memory(4, size))
                .expect("open store");
        memory_store
            .put("bench", data.clone(), CacheOption::empty())
            .expect("put");

        group.bench_with_input(BenchmarkId::new("get_memory", name), &data, |b, _| {
            b.iter(|| black_box(memory_store.get("bench").expect("get")))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_recency_cache, bench_disk_store);
criterion_main!(benches);
