//! The user reaches the station holding a bike reservation.
//!
//! Normally the reservation is still active: it resolves, the held bike is
//! removed, and the post-rental flow runs. A stale arrival (reservation
//! expired at the same instant) degrades to a walk-up attempt.

use bevy_ecs::prelude::{Entity, Query, Res, ResMut};
use tracing::debug;

use crate::clock::{CurrentEvent, EventKind, SimulationClock};
use crate::ecs::{Bike, Station, User};
use crate::recommendation::RecommendationSystem;
use crate::reservations::{remove_bike_with_reservation, Reservations};
use crate::rngs::SimulationRng;
use crate::routing::RouteProviderResource;
use crate::scenario::{ReservationValiditySecs, SimulationBounds};
use crate::systems::common::{after_successful_rental, attempt_walkup_rental, JourneyServices};
use crate::telemetry::SimTelemetry;

#[allow(clippy::too_many_arguments)]
pub fn rent_with_reservation_system(
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
    if event.0.kind != EventKind::ArrivesAtStationToRentBikeWithReservation {
        return;
    }
    let (Some(user_entity), Some(reservation)) = (event.0.user, event.0.reservation) else {
        return;
    };
    let station_entity = reservations.get(reservation).station;
    let Ok(mut user) = users.get_mut(user_entity) else {
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

    if svc.reservations.get(reservation).is_active() {
        let now = svc.clock.now();
        svc.reservations.resolve(reservation, now);
        let bike = {
            let Ok((_, mut station)) = svc.stations.get_mut(station_entity) else {
                return;
            };
            remove_bike_with_reservation(svc.reservations, reservation, &mut station, svc.bikes)
        };
        user.take_bike(bike);
        svc.telemetry.record_rental(station_entity, user_entity, true);
        debug!(user = ?user_entity, station = ?station_entity, "reserved bike rented");
        after_successful_rental(&mut svc, user_entity, &mut user);
    } else {
        attempt_walkup_rental(&mut svc, user_entity, &mut user, station_entity);
    }
}
