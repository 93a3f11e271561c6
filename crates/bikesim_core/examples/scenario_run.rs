//! Runs a small city scenario to completion and exports the history.
//!
//! ```sh
//! RUST_LOG=bikesim_core=debug cargo run --example scenario_run
//! ```

use bevy_ecs::prelude::World;

use bikesim_core::clock::EventKind;
use bikesim_core::history::SimHistory;
use bikesim_core::history_export::{
    write_events_parquet, write_reservations_parquet, write_stations_parquet, write_users_parquet,
};
use bikesim_core::profiling::EventMetrics;
use bikesim_core::reservations::Reservations;
use bikesim_core::runner::{run_to_completion, simulation_schedule};
use bikesim_core::scenario::{build_scenario, EntryPoint, SimulationParams, StationConfig, TimeRange};
use bikesim_core::strategies::UserTypeTag;
use bikesim_core::telemetry::SimTelemetry;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let params = SimulationParams::default()
        .with_seed(42)
        .with_total_time_secs(3_600)
        .with_station(StationConfig {
            latitude: 40.4200,
            longitude: -3.7000,
            capacity: 12,
            initial_bikes: 8,
        })
        .with_station(StationConfig {
            latitude: 40.4252,
            longitude: -3.7030,
            capacity: 10,
            initial_bikes: 3,
        })
        .with_station(StationConfig {
            latitude: 40.4228,
            longitude: -3.6950,
            capacity: 8,
            initial_bikes: 6,
        })
        .with_entry_point(EntryPoint::Poisson {
            rate_per_sec: 0.04,
            latitude: 40.4220,
            longitude: -3.6990,
            user_type: UserTypeTag::Obedient,
            radius_m: Some(600.0),
            time_range: None,
            max_users: None,
        })
        .with_entry_point(EntryPoint::Poisson {
            rate_per_sec: 0.02,
            latitude: 40.4240,
            longitude: -3.7010,
            user_type: UserTypeTag::Tourist,
            radius_m: Some(400.0),
            time_range: Some(TimeRange::new(600, 3_000)),
            max_users: None,
        })
        .with_entry_point(EntryPoint::Single {
            instant: 30,
            latitude: 40.4215,
            longitude: -3.6995,
            user_type: UserTypeTag::Random,
            destination: Some((40.4250, -3.6960)),
        });

    let mut world = World::new();
    build_scenario(&mut world, params).expect("valid scenario");
    let mut schedule = simulation_schedule();
    let steps = run_to_completion(&mut world, &mut schedule);

    let metrics = world.resource::<EventMetrics>();
    println!("executed {steps} events");
    for kind in EventKind::ALL {
        println!("  {:<52} {}", kind.tag(), metrics.count(kind));
    }

    let telemetry = world.resource::<SimTelemetry>();
    println!(
        "journeys: {} completed, {} abandoned",
        telemetry.completed_journeys(),
        telemetry.abandoned_journeys()
    );

    let out = std::path::Path::new("history");
    std::fs::create_dir_all(out).expect("output directory");
    let history = world.resource::<SimHistory>();
    let reservations = world.resource::<Reservations>();
    write_events_parquet(out.join("events.parquet"), history).expect("events export");
    write_stations_parquet(out.join("stations.parquet"), history).expect("stations export");
    write_users_parquet(out.join("users.parquet"), history).expect("users export");
    write_reservations_parquet(out.join("reservations.parquet"), reservations)
        .expect("reservations export");
    println!("history written to {}", out.display());
}
