use bevy_ecs::prelude::World;
use h3o::LatLng;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::clock::{EventKind, SimulationClock};
use crate::ecs::{Bike, Station, User};
use crate::history::{snapshot_station, snapshot_user, SimHistory};
use crate::profiling::EventMetrics;
use crate::recommendation::RecommendationSystem;
use crate::reservations::Reservations;
use crate::rngs::SimulationRng;
use crate::routing::{build_route_provider, RouteProviderResource};
use crate::scenario::params::{
    ConfigError, EntryPoint, ReservationValiditySecs, SimulationBounds, SimulationParams,
    TimeRange,
};
use crate::spatial::random_point_in_circle;
use crate::strategies::{UserStrategy, UserTypeTag};
use crate::telemetry::SimTelemetry;

struct Appearance {
    instant: u64,
    position: LatLng,
    user_type: UserTypeTag,
    destination: Option<LatLng>,
}

fn lat_lng(latitude: f64, longitude: f64, index: usize) -> Result<LatLng, ConfigError> {
    LatLng::new(latitude, longitude).map_err(|_| ConfigError::InvalidCoordinates { index })
}

/// Exponential inter-arrival delay in whole seconds, never zero so the entry
/// point always advances.
fn exponential_delay_secs<R: Rng>(rate_per_sec: f64, rng: &mut R) -> u64 {
    let u: f64 = rng.gen();
    let delay = -(1.0 - u).ln() / rate_per_sec;
    (delay.round() as u64).max(1)
}

fn generate_appearances(
    index: usize,
    entry_point: &EntryPoint,
    total_time_secs: u64,
    rng: &mut StdRng,
) -> Result<Vec<Appearance>, ConfigError> {
    match entry_point {
        EntryPoint::Single {
            instant,
            latitude,
            longitude,
            user_type,
            destination,
        } => {
            let position = lat_lng(*latitude, *longitude, index)?;
            let destination = destination
                .map(|(lat, lng)| lat_lng(lat, lng, index))
                .transpose()?;
            Ok(vec![Appearance {
                instant: *instant,
                position,
                user_type: *user_type,
                destination,
            }])
        }
        EntryPoint::Poisson {
            rate_per_sec,
            latitude,
            longitude,
            user_type,
            radius_m,
            time_range,
            max_users,
        } => {
            let anchor = lat_lng(*latitude, *longitude, index)?;
            let window = time_range.unwrap_or_else(|| TimeRange::new(0, total_time_secs));
            let end = window.end.min(total_time_secs);
            let mut appearances = Vec::new();
            let mut instant = window.start;
            loop {
                instant += exponential_delay_secs(*rate_per_sec, rng);
                if instant >= end {
                    break;
                }
                if let Some(max) = max_users {
                    if appearances.len() >= *max {
                        break;
                    }
                }
                let position = match radius_m {
                    Some(radius) if *radius > 0.0 => random_point_in_circle(anchor, *radius, rng),
                    _ => anchor,
                };
                appearances.push(Appearance {
                    instant,
                    position,
                    user_type: *user_type,
                    destination: None,
                });
            }
            Ok(appearances)
        }
    }
}

/// Populates the world: shared resources, stations with their initial bikes,
/// and one pre-created user plus `UserAppears` event per entry-point arrival.
pub fn build_scenario(world: &mut World, params: SimulationParams) -> Result<(), ConfigError> {
    params.validate()?;

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut clock = SimulationClock::default();
    let mut history = SimHistory::default();

    world.insert_resource(Reservations::default());
    world.insert_resource(SimTelemetry::default());
    world.insert_resource(EventMetrics::default());
    world.insert_resource(ReservationValiditySecs(params.reservation_validity_secs));
    world.insert_resource(SimulationBounds(params.bounds));
    world.insert_resource(RecommendationSystem {
        max_distance_m: params.max_recommendation_distance_m,
    });
    world.insert_resource(RouteProviderResource(build_route_provider(
        &params.route_provider_kind,
    )));

    for (index, config) in params.stations.iter().enumerate() {
        let position = lat_lng(config.latitude, config.longitude, index)?;
        let station_entity = world.spawn(Station::new(position, config.capacity)).id();
        for _ in 0..config.initial_bikes {
            let bike = world.spawn(Bike::default()).id();
            let mut station = world
                .get_mut::<Station>(station_entity)
                .expect("station just spawned");
            station.dock(bike);
        }
        let station = world
            .get::<Station>(station_entity)
            .expect("station just spawned");
        history.register_station(snapshot_station(station_entity, station));
    }

    for (index, entry_point) in params.entry_points.iter().enumerate() {
        for appearance in
            generate_appearances(index, entry_point, params.total_time_secs, &mut rng)?
        {
            let strategy = UserStrategy::from_tag(appearance.user_type, &mut rng);
            let user = User::new(
                appearance.position,
                appearance.destination,
                strategy,
                &mut rng,
            );
            let entity = world.spawn(user).id();
            let user = world.get::<User>(entity).expect("user just spawned");
            history.register_user(snapshot_user(entity, user));
            clock.schedule_at(appearance.instant, EventKind::UserAppears, Some(entity));
        }
    }

    world.insert_resource(SimulationRng(rng));
    world.insert_resource(clock);
    world.insert_resource(history);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::UserState;
    use crate::scenario::params::StationConfig;

    fn base_params() -> SimulationParams {
        SimulationParams::default().with_station(StationConfig {
            latitude: 40.42,
            longitude: -3.70,
            capacity: 4,
            initial_bikes: 2,
        })
    }

    #[test]
    fn builds_stations_with_initial_bikes() {
        let mut world = World::new();
        build_scenario(&mut world, base_params()).expect("scenario");

        let station = world.query::<&Station>().single(&world);
        assert_eq!(station.capacity(), 4);
        assert_eq!(station.docked_count(), 2);
        assert_eq!(station.available_bikes(), 2);

        let history = world.resource::<SimHistory>();
        assert_eq!(history.initial_stations.len(), 1);
        assert!(world.resource::<SimulationClock>().is_empty());
    }

    #[test]
    fn single_entry_point_schedules_one_appearance() {
        let mut world = World::new();
        let params = base_params().with_entry_point(EntryPoint::Single {
            instant: 25,
            latitude: 40.421,
            longitude: -3.701,
            user_type: UserTypeTag::Uninformed,
            destination: None,
        });
        build_scenario(&mut world, params).expect("scenario");

        let user = world.query::<&User>().single(&world);
        assert_eq!(user.state, UserState::Pending);

        let mut clock = world.resource_mut::<SimulationClock>();
        let event = clock.pop_next().expect("appearance event");
        assert_eq!(event.instant, 25);
        assert_eq!(event.kind, EventKind::UserAppears);
        assert!(event.user.is_some());
    }

    #[test]
    fn poisson_entry_point_respects_window_and_cap() {
        let mut world = World::new();
        let params = base_params().with_entry_point(EntryPoint::Poisson {
            rate_per_sec: 0.5,
            latitude: 40.42,
            longitude: -3.70,
            user_type: UserTypeTag::Random,
            radius_m: Some(300.0),
            time_range: Some(TimeRange::new(100, 400)),
            max_users: Some(10),
        });
        build_scenario(&mut world, params).expect("scenario");

        let mut clock = world.resource_mut::<SimulationClock>();
        let mut count = 0;
        while let Some(event) = clock.pop_next() {
            assert!(event.instant > 100 && event.instant < 400);
            count += 1;
        }
        assert!(count > 0, "a 0.5/s rate over 300s should produce users");
        assert!(count <= 10);
    }

    #[test]
    fn same_seed_builds_identical_schedules() {
        let params = base_params().with_entry_point(EntryPoint::Poisson {
            rate_per_sec: 0.2,
            latitude: 40.42,
            longitude: -3.70,
            user_type: UserTypeTag::Tourist,
            radius_m: Some(500.0),
            time_range: None,
            max_users: None,
        });

        let collect = |params: SimulationParams| {
            let mut world = World::new();
            build_scenario(&mut world, params).expect("scenario");
            let mut clock = world.resource_mut::<SimulationClock>();
            let mut instants = Vec::new();
            while let Some(event) = clock.pop_next() {
                instants.push(event.instant);
            }
            instants
        };

        let first = collect(params.clone().with_seed(9));
        let second = collect(params.with_seed(9));
        assert_eq!(first, second);
    }
}
