//! Micro-operation benchmarks for the cache facade.
//!
//! Run with: `cargo bench --bench ops`
//!
//! Measures per-operation latency (nanoseconds) for get, insert, and the
//! expired-sweep under identical conditions.

use std::hint::black_box;
use std::time::{Duration, Instant};

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use ttlkit::builder::CacheBuilder;
use ttlkit::item::Ttl;

const CAPACITY: usize = 16_384;
const OPS: u64 = 100_000;

// ============================================================================
// Get Hit Latency (ns/op)
// ============================================================================

fn bench_get_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_hit_ns");
    group.throughput(Throughput::Elements(OPS));

    group.bench_function("no_ttl", |b| {
        b.iter_custom(|iters| {
            let cache = CacheBuilder::new().capacity(CAPACITY).build();
            for i in 0..CAPACITY as u64 {
                cache.insert(i, i, Ttl::Never);
            }
            let start = Instant::now();
            for _ in 0..iters {
                for i in 0..OPS {
                    let key = i % (CAPACITY as u64);
                    black_box(cache.get(&key));
                }
            }
            start.elapsed()
        })
    });

    // with a TTL every hit also repositions the item in the heap
    group.bench_function("with_ttl", |b| {
        b.iter_custom(|iters| {
            let cache = CacheBuilder::new()
                .capacity(CAPACITY)
                .default_ttl(Duration::from_secs(3600))
                .build();
            for i in 0..CAPACITY as u64 {
                cache.insert(i, i, Ttl::Default);
            }
            let start = Instant::now();
            for _ in 0..iters {
                for i in 0..OPS {
                    let key = i % (CAPACITY as u64);
                    black_box(cache.get(&key));
                }
            }
            start.elapsed()
        })
    });

    group.bench_function("peek", |b| {
        b.iter_custom(|iters| {
            let cache = CacheBuilder::new().capacity(CAPACITY).build();
            for i in 0..CAPACITY as u64 {
                cache.insert(i, i, Ttl::Never);
            }
            let start = Instant::now();
            for _ in 0..iters {
                for i in 0..OPS {
                    let key = i % (CAPACITY as u64);
                    black_box(cache.peek(&key));
                }
            }
            start.elapsed()
        })
    });

    group.finish();
}

// ============================================================================
// Insert Latency (ns/op)
// ============================================================================

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_ns");
    group.throughput(Throughput::Elements(OPS));

    // distinct keys, steady-state capacity eviction on every insert
    group.bench_function("evicting", |b| {
        b.iter_custom(|iters| {
            let cache = CacheBuilder::new().capacity(CAPACITY).build();
            let start = Instant::now();
            for iter in 0..iters {
                for i in 0..OPS {
                    let key = iter * OPS + i;
                    black_box(cache.insert(key, key, Ttl::Never));
                }
            }
            start.elapsed()
        })
    });

    group.bench_function("evicting_with_ttl", |b| {
        b.iter_custom(|iters| {
            let cache = CacheBuilder::new()
                .capacity(CAPACITY)
                .default_ttl(Duration::from_secs(3600))
                .build();
            let start = Instant::now();
            for iter in 0..iters {
                for i in 0..OPS {
                    let key = iter * OPS + i;
                    black_box(cache.insert(key, key, Ttl::Default));
                }
            }
            start.elapsed()
        })
    });

    group.bench_function("updating", |b| {
        b.iter_custom(|iters| {
            let cache = CacheBuilder::new().capacity(CAPACITY).build();
            for i in 0..CAPACITY as u64 {
                cache.insert(i, i, Ttl::Never);
            }
            let start = Instant::now();
            for _ in 0..iters {
                for i in 0..OPS {
                    let key = i % (CAPACITY as u64);
                    black_box(cache.insert(key, key, Ttl::Never));
                }
            }
            start.elapsed()
        })
    });

    group.finish();
}

// ============================================================================
// Expired Sweep (ns/op)
// ============================================================================

fn bench_remove_expired(c: &mut Criterion) {
    let mut group = c.benchmark_group("remove_expired_ns");
    group.throughput(Throughput::Elements(CAPACITY as u64));

    group.bench_function("full_sweep", |b| {
        b.iter_custom(|iters| {
            let mut total = Duration::ZERO;
            for _ in 0..iters {
                let cache = CacheBuilder::new().build();
                for i in 0..CAPACITY as u64 {
                    cache.insert(i, i, Ttl::After(Duration::from_nanos(1)));
                }
                let start = Instant::now();
                black_box(cache.remove_expired());
                total += start.elapsed();
            }
            total
        })
    });

    group.finish();
}

criterion_group!(benches, bench_get_hit, bench_insert, bench_remove_expired);
criterion_main!(benches);
