//! Engine performance benchmarks (Criterion).
//!
//! Run: `cargo bench` or `cargo bench --bench engine`.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use rust_decimal::Decimal;
use screening_match_engine::{
    replay_into_engine, DonorId, Engine, EngineConfig, Generator, GeneratorConfig,
};

fn generator(seed: u64, num_entries: usize) -> Generator {
    Generator::new(GeneratorConfig {
        seed,
        num_entries,
        num_patients: num_entries as u64,
        ..Default::default()
    })
}

fn bench_enqueue_throughput(c: &mut Criterion) {
    const N: usize = 1000;
    let mut group = c.benchmark_group("engine");
    group.throughput(Throughput::Elements(N as u64));
    group.bench_function("enqueue_1000", |b| {
        b.iter_batched(
            || {
                let engine = Engine::new(EngineConfig::seeded(1));
                let requests = generator(42, N).all_requests();
                (engine, requests)
            },
            |(mut engine, requests)| {
                replay_into_engine(&mut engine, requests).unwrap();
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_matching_run(c: &mut Criterion) {
    const WAITING: usize = 2000;
    const CAMPAIGNS: usize = 50;
    let mut group = c.benchmark_group("engine");
    group.bench_function("matching_run_2000_waiting_50_campaigns", |b| {
        b.iter_batched(
            || {
                let mut gen = generator(7, WAITING);
                let mut engine = Engine::new(EngineConfig {
                    batch_size: 100,
                    ..EngineConfig::seeded(1)
                });
                replay_into_engine(&mut engine, gen.all_requests()).unwrap();
                for request in gen.campaigns(CAMPAIGNS) {
                    engine.create_campaign(request, 1).unwrap();
                }
                engine.donate_to_pool(DonorId(1), Decimal::from(50_000)).unwrap();
                engine
            },
            |mut engine| {
                engine.run_matching(10_000);
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_expiry_sweep(c: &mut Criterion) {
    const WAITING: usize = 500;
    let mut group = c.benchmark_group("engine");
    group.bench_function("expire_after_full_match_500", |b| {
        b.iter_batched(
            || {
                let mut engine = Engine::new(EngineConfig {
                    batch_size: WAITING,
                    ..EngineConfig::seeded(1)
                });
                replay_into_engine(&mut engine, generator(9, WAITING).all_requests()).unwrap();
                engine.donate_to_pool(DonorId(1), Decimal::from(1_000_000)).unwrap();
                engine.run_matching(10_000);
                engine
            },
            |mut engine| {
                engine.expire_allocations(u64::MAX);
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(benches, bench_enqueue_throughput, bench_matching_run, bench_expiry_sweep);
criterion_main!(benches);
