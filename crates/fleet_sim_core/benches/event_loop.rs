//! Throughput benchmark for the event-dispatch loop.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use fleet_sim_core::config::Config;
use fleet_sim_core::engine::Engine;
use fleet_sim_core::map::{HaversineMap, Location};
use fleet_sim_core::telemetry::VecResults;

fn locations(n: usize) -> Vec<Location> {
    (0..n)
        .map(|i| Location::new((i % 50) as f64 * 0.002, (i / 50) as f64 * 0.002))
        .collect()
}

fn bench_run_to_horizon(c: &mut Criterion) {
    let scenarios = vec![("small", 50usize, 200usize), ("medium", 200, 1000)];

    let mut group = c.benchmark_group("run_to_horizon");
    for (name, num_vehicles, num_spots) in scenarios {
        group.bench_with_input(
            BenchmarkId::from_parameter(name),
            &(num_vehicles, num_spots),
            |b, &(num_vehicles, num_spots)| {
                b.iter(|| {
                    let locs = locations(num_spots);
                    let map = Box::new(HaversineMap::new(locs.clone()));
                    let results = Box::new(VecResults::default());
                    let config = Config {
                        num_of_vehicles: num_vehicles as u32,
                        num_simulated_days: 1,
                        tvd: 2.0,
                        num_of_fleet_specialists: 2,
                        ..Config::default()
                    };
                    let mut engine = Engine::new(config, map, results, 42, locs).unwrap();
                    engine.spawn_uniform_demand();
                    black_box(engine.run_to_horizon(engine.config.horizon_seconds()));
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_run_to_horizon);
criterion_main!(benches);
