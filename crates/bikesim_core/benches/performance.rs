use bevy_ecs::prelude::World;
use criterion::{criterion_group, criterion_main, Criterion};

use bikesim_core::runner::{run_to_completion, simulation_schedule};
use bikesim_core::scenario::{build_scenario, EntryPoint, SimulationParams, StationConfig};
use bikesim_core::strategies::UserTypeTag;

fn city_params() -> SimulationParams {
    let mut params = SimulationParams::default()
        .with_seed(7)
        .with_total_time_secs(1_800);
    for i in 0..10 {
        params = params.with_station(StationConfig {
            latitude: 40.4180 + f64::from(i) * 0.0012,
            longitude: -3.7040 + f64::from(i % 3) * 0.0030,
            capacity: 10,
            initial_bikes: 5,
        });
    }
    params
        .with_entry_point(EntryPoint::Poisson {
            rate_per_sec: 0.2,
            latitude: 40.4220,
            longitude: -3.7000,
            user_type: UserTypeTag::Obedient,
            radius_m: Some(800.0),
            time_range: None,
            max_users: None,
        })
        .with_entry_point(EntryPoint::Poisson {
            rate_per_sec: 0.1,
            latitude: 40.4230,
            longitude: -3.6990,
            user_type: UserTypeTag::Uninformed,
            radius_m: Some(800.0),
            time_range: None,
            max_users: None,
        })
}

fn bench_full_run(c: &mut Criterion) {
    c.bench_function("run_city_30min", |b| {
        b.iter(|| {
            let mut world = World::new();
            build_scenario(&mut world, city_params()).expect("scenario");
            let mut schedule = simulation_schedule();
            run_to_completion(&mut world, &mut schedule)
        })
    });
}

criterion_group!(benches, bench_full_run);
criterion_main!(benches);
