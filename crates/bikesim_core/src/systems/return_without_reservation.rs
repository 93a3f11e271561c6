//! The user reaches a station to return with no reservation; the station may
//! have filled up since the decision was made.

use bevy_ecs::prelude::{Entity, Query, Res, ResMut};

use crate::clock::{CurrentEvent, EventKind, SimulationClock};
use crate::ecs::{Bike, Station, User};
use crate::recommendation::RecommendationSystem;
use crate::reservations::Reservations;
use crate::rngs::SimulationRng;
use crate::routing::RouteProviderResource;
use crate::scenario::{ReservationValiditySecs, SimulationBounds};
use crate::systems::common::{attempt_walkup_return, JourneyServices};
use crate::telemetry::SimTelemetry;

#[allow(clippy::too_many_arguments)]
pub fn return_without_reservation_system(
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
    if event.0.kind != EventKind::ArrivesAtStationToReturnBikeWithoutReservation {
        return;
    }
    let Some(user_entity) = event.0.user else {
        return;
    };
    let Ok(mut user) = users.get_mut(user_entity) else {
        return;
    };
    let Some(station_entity) = user.destination_station else {
        return;
    };
    if let Ok((_, station)) = stations.get(station_entity) {
        user.position = station.position();
    }

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
    attempt_walkup_return(&mut svc, user_entity, &mut user, station_entity);
}
