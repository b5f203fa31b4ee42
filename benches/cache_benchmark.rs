//! Performance benchmarks for live-cache
//!
//! This benchmark suite measures:
//! - KeyCodec encoding across query sizes
//! - ResultCache reads and sequenced writes
//! - ServiceCache subscribe/unsubscribe churn and cached reads
//!
//! Run with: cargo bench
//! View results: open target/criterion/report/index.html

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use live_cache::remote::InMemoryService;
use live_cache::{KeyCodec, Namespace, Outcome, ResultCache, ServiceCache};
use serde_json::{json, Map, Value};
use std::hint::black_box;

/// Query object with `fields` entries, inserted in reverse order.
fn query(fields: usize) -> Value {
    let mut map = Map::new();
    for i in (0..fields).rev() {
        map.insert(format!("field_{:03}", i), json!({"eq": i, "tags": ["a", "b"]}));
    }
    Value::Object(map)
}

// ============================================================================
// KeyCodec
// ============================================================================

fn key_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_codec");

    for fields in [1, 8, 64].iter() {
        let params = query(*fields);
        group.throughput(Throughput::Elements(*fields as u64));

        group.bench_with_input(BenchmarkId::new("encode", fields), &params, |b, params| {
            b.iter(|| KeyCodec::encode(black_box(params)));
        });

        let key = KeyCodec::encode(&params);
        group.bench_with_input(BenchmarkId::new("decode", fields), &key, |b, key| {
            b.iter(|| KeyCodec::decode(black_box(key)));
        });
    }

    group.finish();
}

// ============================================================================
// ResultCache
// ============================================================================

fn result_cache_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("result_cache");

    let cache: ResultCache<Value> = ResultCache::new();
    cache.set(Namespace::Entity, "1", Outcome::Success(json!({"id": "1"})));

    group.bench_function("get_hit", |b| {
        b.iter(|| cache.get(Namespace::Entity, black_box("1")));
    });

    group.bench_function("get_miss", |b| {
        b.iter(|| cache.get(Namespace::Entity, black_box("missing")));
    });

    let mut seq = 0u64;
    group.bench_function("store", |b| {
        b.iter(|| {
            seq += 1;
            cache.store(
                Namespace::Collection,
                black_box("{}"),
                Outcome::Success(Value::Null),
                seq,
            )
        });
    });

    group.finish();
}

// ============================================================================
// ServiceCache
// ============================================================================

fn service_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("service_cache");

    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");

    let remote = InMemoryService::new();
    for i in 0..100 {
        remote.insert(i.to_string(), json!({"n": i % 10}));
    }
    let service = ServiceCache::new(remote);

    // A held subscription keeps the line warm for the read benchmarks.
    let params = json!({"n": 3});
    let _warm = rt.block_on(async {
        let feed = service.watch_find(&params);
        service.wait_idle().await;
        feed
    });

    group.bench_function("read_cached", |b| {
        b.iter(|| service.find(black_box(&params)));
    });

    group.bench_function("join_existing_subscription", |b| {
        b.to_async(&rt).iter(|| async {
            service.subscribe_find(black_box(&params));
            service.unsubscribe_find(&params)
        });
    });

    group.bench_function("subscribe_fetch_unsubscribe", |b| {
        b.to_async(&rt).iter(|| async {
            let key = service.subscribe_get(black_box(&"7".to_string()));
            service.wait_idle().await;
            service.unsubscribe(Namespace::Entity, &key)
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    key_benchmarks,
    result_cache_benchmarks,
    service_benchmarks
);
criterion_main!(benches);
