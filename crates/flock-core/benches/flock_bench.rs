use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use flock_core::{BoundaryVolume, FlockConfig, FlockWorld};
use std::time::Duration;

fn bench_flock_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("flock_step");
    group.sample_size(30);
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(8));

    // Steps per bench iteration and flock sizes (override via env).
    let steps: usize = std::env::var("FLOCK_BENCH_STEPS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(64);
    let agents_list: Vec<usize> = std::env::var("FLOCK_BENCH_AGENTS")
        .ok()
        .map(|s| {
            s.split(',')
                .filter_map(|t| t.trim().parse::<usize>().ok())
                .collect::<Vec<_>>()
        })
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| vec![40, 200, 1_000]);

    let dt = 1.0 / 60.0;
    for &agents in &agents_list {
        group.bench_function(format!("steps{steps}_agents{agents}"), |b| {
            b.iter_batched(
                || {
                    let config = FlockConfig {
                        agent_count: agents,
                        // Small volume to stress neighbor density.
                        boundary: BoundaryVolume::new(12.0, 12.0, 12.0),
                        rng_seed: Some(0xBEEF),
                        history_capacity: 1,
                        ..FlockConfig::default()
                    };
                    FlockWorld::new(config).expect("world")
                },
                |mut world| {
                    for _ in 0..steps {
                        world.step(dt);
                    }
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_flock_steps);
criterion_main!(benches);
