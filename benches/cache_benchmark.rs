//! Performance benchmarks for sql-cache
//!
//! This benchmark suite measures:
//! - Key pattern translation (LIKE + regular expression)
//! - SQLite backend operations (set, get, remove, remove_pattern, get_many)
//! - Performance across different payload sizes
//!
//! Run with: cargo bench
//! View results: open target/criterion/report/index.html

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sql_cache::backend::{CacheBackend, SqliteBackend};
use sql_cache::pattern::{pattern_to_like, pattern_to_regex, KeyPattern};
use sql_cache::SqlCacheConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::hint::black_box;
use std::str::FromStr;
use tokio::runtime::Runtime;

// ============================================================================
// Benchmark Fixtures
// ============================================================================

fn sqlite_backend(rt: &Runtime) -> SqliteBackend {
    rt.block_on(async {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .expect("Invalid sqlite url")
            .with_regexp();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .expect("Failed to connect");

        sqlx::query(
            r#"CREATE TABLE "cache" (
                "key" TEXT NOT NULL PRIMARY KEY,
                "data" BLOB NOT NULL,
                "timeout" INTEGER NOT NULL,
                "last_modified" INTEGER NOT NULL
            )"#,
        )
        .execute(&pool)
        .await
        .expect("Failed to create table");

        SqliteBackend::from_pool(pool, SqlCacheConfig::default().with_cleaning_factor(0))
            .expect("Failed to create backend")
    })
}

// ============================================================================
// Group 1: Pattern Translation
// ============================================================================

fn pattern_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern");

    for pattern in ["user:*", "app1:user:*:profile", "app1:**:settings:*"] {
        group.bench_with_input(BenchmarkId::new("like", pattern), pattern, |b, p| {
            b.iter(|| pattern_to_like(black_box(p)))
        });

        group.bench_with_input(BenchmarkId::new("regex", pattern), pattern, |b, p| {
            b.iter(|| pattern_to_regex(black_box(p), ':'))
        });

        group.bench_with_input(BenchmarkId::new("translate", pattern), pattern, |b, p| {
            b.iter(|| KeyPattern::new(black_box(p), ':'))
        });

        group.bench_with_input(BenchmarkId::new("match_local", pattern), pattern, |b, p| {
            b.iter(|| KeyPattern::new(black_box(p), ':').matches(black_box("app1:user:1:profile")))
        });
    }

    group.finish();
}

// ============================================================================
// Group 2: SQLite Backend
// ============================================================================

fn sqlite_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("sqlite_backend");
    let rt = Runtime::new().expect("Failed to create Tokio runtime");

    for size in [100, 1_000, 10_000, 100_000].iter() {
        group
            .throughput(Throughput::Bytes(*size as u64))
            .bench_with_input(BenchmarkId::new("set", size), size, |b, &size| {
                let backend = sqlite_backend(&rt);
                let value = vec![1u8; size];

                b.to_async(&rt).iter(|| async {
                    backend
                        .set(black_box("test_key"), black_box(value.clone()), None)
                        .await
                        .expect("Failed to set")
                });
            });

        group
            .throughput(Throughput::Bytes(*size as u64))
            .bench_with_input(BenchmarkId::new("get_hit", size), size, |b, &size| {
                let backend = sqlite_backend(&rt);
                rt.block_on(async {
                    backend
                        .set("test_key", vec![1u8; size], None)
                        .await
                        .expect("Failed to set");
                });

                b.to_async(&rt)
                    .iter(|| async { backend.get(black_box("test_key")).await });
            });
    }

    group.bench_function("get_miss", |b| {
        let backend = sqlite_backend(&rt);

        b.to_async(&rt)
            .iter(|| async { backend.get(black_box("nonexistent_key")).await });
    });

    group.bench_function("remove", |b| {
        let backend = sqlite_backend(&rt);
        let value = vec![1u8; 1000];

        b.to_async(&rt).iter(|| async {
            backend
                .set("test_key", value.clone(), None)
                .await
                .expect("Failed to set");
            backend.remove(black_box("test_key")).await
        });
    });

    group.bench_function("remove_pattern", |b| {
        let backend = sqlite_backend(&rt);

        b.to_async(&rt).iter(|| async {
            for i in 0..10 {
                backend
                    .set(&format!("user:{}", i), vec![1u8; 64], None)
                    .await
                    .expect("Failed to set");
            }
            backend.remove_pattern(black_box("user:*")).await
        });
    });

    for count in [1usize, 10, 100].iter() {
        group.bench_with_input(BenchmarkId::new("get_many", count), count, |b, &count| {
            let backend = sqlite_backend(&rt);
            let keys: Vec<String> = (0..count).map(|i| format!("key:{}", i)).collect();
            rt.block_on(async {
                for key in &keys {
                    backend
                        .set(key, vec![1u8; 256], None)
                        .await
                        .expect("Failed to set");
                }
            });
            let refs: Vec<&str> = keys.iter().map(String::as_str).collect();

            b.to_async(&rt)
                .iter(|| async { backend.get_many(black_box(&refs)).await });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark Registration
// ============================================================================

criterion_group!(benches, pattern_benchmarks, sqlite_benchmarks);
criterion_main!(benches);
