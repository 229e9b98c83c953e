// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure
#![allow(clippy::semicolon_if_nothing_returned)] // Benchmark code formatting

use aprs_ingest::config::{IngestConfig, PoolConfig};
use aprs_ingest::ingest::{locate_fields, IngestContext, StructuralOnly, WorkerId};
use aprs_ingest::pbuf::{ClientId, LocalCache, PacketChain, TieredPool};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;

const PLAIN: &[u8] = b"OH2ABC-9>APRS,WIDE1-1,WIDE2-1,qAR,OH2RDK:!6028.51N/02505.68E#PHG2360 Espoo";
const INJECTED: &[u8] = b"OH2ABC-9>APRS,WIDE1-1,WIDE2-1,OH2RDK,I:!6028.51N/02505.68E#PHG2360 Espoo";

// ============================================================================
// Pool Benchmarks
// ============================================================================

/// Benchmark: LocalCache acquire + release (warm cache, no arena lock)
/// Target: < 30 ns
fn bench_cache_acquire_release(c: &mut Criterion) {
    let pool = TieredPool::new(&PoolConfig::default()).expect("defaults are valid");
    let mut cache = LocalCache::new();
    c.bench_function("cache_acquire_release_small", |b| {
        b.iter(|| {
            let buf = cache.acquire(&pool, black_box(90)).expect("room");
            cache.release(&pool, buf);
        })
    });
}

/// Benchmark: consumer retiring a 256-packet batch across tiers
fn bench_free_many(c: &mut Criterion) {
    let pool = TieredPool::new(&PoolConfig::default()).expect("defaults are valid");
    let mut cache = LocalCache::new();
    let mut group = c.benchmark_group("free_many");
    group.throughput(Throughput::Elements(256));
    group.bench_function("mixed_256", |b| {
        b.iter(|| {
            let mut batch = PacketChain::new();
            for i in 0..256usize {
                let len = [40, 180, 500][i % 3];
                batch.push_back(cache.acquire(&pool, len).expect("room"));
            }
            black_box(pool.free_many(batch));
        })
    });
    group.finish();
    cache.drain_to(&pool);
}

// ============================================================================
// Parse Benchmarks
// ============================================================================

fn bench_locate_fields(c: &mut Criterion) {
    let mut group = c.benchmark_group("locate_fields");
    group.throughput(Throughput::Bytes(PLAIN.len() as u64));
    group.bench_function("existing_q", |b| {
        b.iter(|| locate_fields(black_box(PLAIN), 9))
    });
    group.bench_function("injected", |b| {
        b.iter(|| locate_fields(black_box(INJECTED), 9))
    });
    group.finish();
}

/// Benchmark: full worker path, line to pending queue to inbox
/// Target: < 300 ns per line
fn bench_handle_line(c: &mut Criterion) {
    let ctx = IngestContext::new(IngestConfig::default()).expect("defaults are valid");
    let mut worker = ctx.new_worker(WorkerId(0), Arc::new(StructuralOnly));
    let inbox = worker.inbox();
    let pool = Arc::clone(ctx.pool());

    let mut group = c.benchmark_group("handle_line");
    group.throughput(Throughput::Elements(1));
    group.bench_function("plain", |b| {
        b.iter(|| {
            black_box(worker.handle_line(ClientId(1), black_box(PLAIN)));
            pool.free_many(inbox.drain());
        })
    });
    group.bench_function("injected", |b| {
        b.iter(|| {
            black_box(worker.handle_line(ClientId(1), black_box(INJECTED)));
            pool.free_many(inbox.drain());
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_cache_acquire_release,
    bench_free_many,
    bench_locate_fields,
    bench_handle_line
);
criterion_main!(benches);
