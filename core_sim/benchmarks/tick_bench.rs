use std::sync::Arc;
use std::time::Duration;

use core_sim::{
    simulate, Enemy, MovementConfig, ServerMetrics, SubscriberRegistry, TickScheduler, World,
    WorldStore, DEFAULT_BOUNDS,
};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

fn world_of(count: usize, segments: i32) -> World {
    let enemies = (0..count)
        .map(|index| {
            let y = (index % 180) as i32;
            Enemy::new((0..segments).rev().map(|x| [x, y, 0]).collect())
        })
        .collect();
    World::new(DEFAULT_BOUNDS, enemies)
}

fn bench_simulate(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulate");
    let config = MovementConfig::default();

    for count in [16usize, 128, 1024] {
        group.bench_with_input(BenchmarkId::new("enemies", count), &count, |b, &count| {
            b.iter_batched(
                || world_of(count, 8),
                |mut world| {
                    simulate(&mut world, &config);
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");

    for subscribers in [0usize, 16, 64] {
        group.bench_with_input(
            BenchmarkId::new("subscribers", subscribers),
            &subscribers,
            |b, &subscribers| {
                b.iter_batched(
                    || {
                        let registry = Arc::new(SubscriberRegistry::new(4));
                        let outlets: Vec<_> = (0..subscribers)
                            .map(|_| {
                                let (subscriber, outlet) = registry.open_subscriber();
                                registry.add(subscriber);
                                outlet
                            })
                            .collect();
                        let scheduler = TickScheduler::new(
                            Arc::new(WorldStore::new(world_of(128, 8))),
                            registry,
                            Arc::new(ServerMetrics::default()),
                            Duration::from_millis(500),
                        );
                        (scheduler, outlets)
                    },
                    |(mut scheduler, _outlets)| {
                        let _ = scheduler.tick_once();
                    },
                    BatchSize::SmallInput,
                )
            },
        );
    }

    group.finish();
}

criterion_group!(tick_benches, bench_simulate, bench_tick);
criterion_main!(tick_benches);
