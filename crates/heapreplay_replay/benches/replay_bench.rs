//! Replay benchmarks over synthetic logs.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use heapreplay_core::OriginalAddress;
use heapreplay_log::LogRecord;
use heapreplay_replay::{PoolAllocator, PoolConfig, ReplayAllocator, ReplayEngine, SystemAllocator};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::{Duration, Instant};

/// Random allocate/free mix; about a third of allocations are never freed
fn synthetic_log(records: usize, seed: u64) -> Vec<LogRecord> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut live: Vec<(u64, u64)> = Vec::new();
    let mut log = Vec::with_capacity(records);
    let mut next_addr = 0x1000u64;

    while log.len() < records {
        if live.is_empty() || rng.gen_bool(0.55) {
            let size = 1u64 << rng.gen_range(3..16);
            // recycle an address now and then, as real allocators do
            let addr = if next_addr > 0x1000 && rng.gen_bool(0.1) {
                0x1000 + rng.gen_range(0..(next_addr - 0x1000) / 0x10) * 0x10
            } else {
                next_addr += 0x10;
                next_addr
            };
            live.push((addr, size));
            log.push(LogRecord::allocate(size, OriginalAddress::from_raw(addr)));
        } else {
            let index = rng.gen_range(0..live.len());
            let (addr, size) = live.swap_remove(index);
            if rng.gen_bool(0.66) {
                log.push(LogRecord::free(size, OriginalAddress::from_raw(addr)));
            }
        }
    }
    log
}

fn timed_passes<A: ReplayAllocator>(
    engine: &ReplayEngine,
    records: &[LogRecord],
    allocator: &mut A,
    iters: u64,
) -> Duration {
    let mut elapsed = Duration::ZERO;
    for _ in 0..iters {
        let mut pass = engine.begin(&mut *allocator, records.len());
        let start = Instant::now();
        let outcome = pass.run(black_box(records));
        elapsed += start.elapsed();
        outcome.unwrap_or_else(|err| panic!("replay failed: {err}"));
        pass.reclaim()
            .unwrap_or_else(|err| panic!("reclaim failed: {err}"));
    }
    elapsed
}

fn bench_replay(c: &mut Criterion) {
    let engine = ReplayEngine::new();
    let mut group = c.benchmark_group("replay");

    for &records in &[1_000usize, 10_000, 100_000] {
        let log = synthetic_log(records, 42);

        group.bench_with_input(BenchmarkId::new("system", records), &log, |b, log| {
            let mut allocator = SystemAllocator::new();
            b.iter_custom(|iters| timed_passes(&engine, log, &mut allocator, iters));
        });

        group.bench_with_input(BenchmarkId::new("pool", records), &log, |b, log| {
            let mut allocator = PoolAllocator::new(&PoolConfig::default())
                .unwrap_or_else(|err| panic!("pool allocator unavailable: {err}"));
            b.iter_custom(|iters| timed_passes(&engine, log, &mut allocator, iters));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_replay);
criterion_main!(benches);
