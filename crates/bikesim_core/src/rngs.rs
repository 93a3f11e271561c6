//! The run's random source: one explicitly seeded generator, owned by the
//! world and threaded through the scenario builder and every agent decision.
//! Two runs with the same configuration and seed draw the same stream.

use bevy_ecs::prelude::Resource;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Resource)]
pub struct SimulationRng(pub StdRng);

impl SimulationRng {
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}
