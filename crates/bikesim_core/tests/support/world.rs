#![allow(dead_code)]

use bevy_ecs::prelude::{Entity, Schedule, World};

use bikesim_core::ecs::{Bike, Station, User, UserState};
use bikesim_core::rngs::SimulationRng;
use bikesim_core::runner::{run_next_event, run_until_empty, simulation_schedule};
use bikesim_core::scenario::{
    build_scenario, EntryPoint, SimulationParams, StationConfig,
};
use bikesim_core::strategies::{Patience, UserStrategy, UserTypeTag};

/// Builder for reproducible integration-test worlds.
pub struct TestWorldBuilder {
    params: SimulationParams,
}

impl TestWorldBuilder {
    pub fn new() -> Self {
        Self {
            params: SimulationParams::default(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.params = self.params.with_seed(seed);
        self
    }

    pub fn with_reservation_validity(mut self, secs: u64) -> Self {
        self.params = self.params.with_reservation_validity_secs(secs);
        self
    }

    pub fn with_total_time(mut self, secs: u64) -> Self {
        self.params = self.params.with_total_time_secs(secs);
        self
    }

    pub fn with_station(mut self, lat: f64, lng: f64, capacity: usize, bikes: usize) -> Self {
        self.params = self.params.with_station(StationConfig {
            latitude: lat,
            longitude: lng,
            capacity,
            initial_bikes: bikes,
        });
        self
    }

    /// One user at a fixed instant with no final city destination.
    pub fn with_user(mut self, instant: u64, lat: f64, lng: f64, user_type: UserTypeTag) -> Self {
        self.params = self.params.with_entry_point(EntryPoint::Single {
            instant,
            latitude: lat,
            longitude: lng,
            user_type,
            destination: None,
        });
        self
    }

    pub fn with_entry_point(mut self, entry_point: EntryPoint) -> Self {
        self.params = self.params.with_entry_point(entry_point);
        self
    }

    pub fn build(self) -> TestWorld {
        let mut world = World::new();
        build_scenario(&mut world, self.params).expect("scenario builds");
        TestWorld {
            world,
            schedule: simulation_schedule(),
        }
    }
}

pub struct TestWorld {
    pub world: World,
    pub schedule: Schedule,
}

impl TestWorld {
    /// Runs until the queue drains; panics if it does not converge.
    pub fn run(&mut self, max_steps: usize) -> usize {
        let steps = run_until_empty(&mut self.world, &mut self.schedule, max_steps);
        assert!(steps < max_steps, "runner did not converge");
        steps
    }

    pub fn step(&mut self) -> bool {
        run_next_event(&mut self.world, &mut self.schedule)
    }

    pub fn station_entities(&mut self) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self
            .world
            .query::<(Entity, &Station)>()
            .iter(&self.world)
            .map(|(entity, _)| entity)
            .collect();
        entities.sort();
        entities
    }

    pub fn user_entities(&mut self) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self
            .world
            .query::<(Entity, &User)>()
            .iter(&self.world)
            .map(|(entity, _)| entity)
            .collect();
        entities.sort();
        entities
    }
}

/// Obedient strategy with fixed patience, for fully deterministic branches.
pub fn obedient_strategy() -> UserStrategy {
    UserStrategy::Obedient(Patience {
        min_reservation_timeouts: 3,
        min_reservation_attempts: 5,
        min_resource_failures: 3,
    })
}

/// Spawns a user already riding a bike at the given position, bypassing the
/// rental flow; used by return-side tests.
pub fn spawn_cyclist(world: &mut World, lat: f64, lng: f64, strategy: UserStrategy) -> Entity {
    let bike = world.spawn(Bike::default()).id();
    let position = h3o::LatLng::new(lat, lng).expect("valid position");
    let mut user = {
        let mut rng = world.resource_mut::<SimulationRng>();
        User::new(position, None, strategy, &mut rng.0)
    };
    user.bike = Some(bike);
    user.state = UserState::Cycling;
    world.spawn(user).id()
}
