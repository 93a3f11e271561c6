//! A user appears in the city and starts looking for a bike.

use bevy_ecs::prelude::{Entity, Query, Res, ResMut};
use tracing::debug;

use crate::clock::{CurrentEvent, EventKind, SimulationClock};
use crate::ecs::{Bike, Station, User, UserState};
use crate::recommendation::RecommendationSystem;
use crate::reservations::Reservations;
use crate::rngs::SimulationRng;
use crate::routing::RouteProviderResource;
use crate::scenario::{ReservationValiditySecs, SimulationBounds};
use crate::systems::common::{plan_rental, JourneyServices};
use crate::telemetry::SimTelemetry;

#[allow(clippy::too_many_arguments)]
pub fn user_appears_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut reservations: ResMut<Reservations>,
    mut rng: ResMut<SimulationRng>,
    mut telemetry: ResMut<SimTelemetry>,
    validity: Res<ReservationValiditySecs>,
    bounds: Res<SimulationBounds>,
    recommender: Res<RecommendationSystem>,
    route_provider: Res<RouteProviderResource>,
    mut stations: Query<(Entity, &mut Station)>,
    mut bikes: Query<&mut Bike>,
    mut users: Query<&mut User>,
) {
    if event.0.kind != EventKind::UserAppears {
        return;
    }
    let Some(user_entity) = event.0.user else {
        return;
    };
    let Ok(mut user) = users.get_mut(user_entity) else {
        return;
    };

    user.state = UserState::Walking;
    debug!(user = ?user_entity, instant = clock.now(), "user appears");

    let mut svc = JourneyServices {
        clock: &mut clock,
        reservations: &mut reservations,
        rng: &mut rng.0,
        telemetry: &mut telemetry,
        validity_secs: validity.0,
        bounds: bounds.0,
        recommender: *recommender,
        routes: route_provider.0.as_ref(),
        stations: &mut stations,
        bikes: &mut bikes,
    };
    plan_rental(&mut svc, user_entity, &mut user);
}
