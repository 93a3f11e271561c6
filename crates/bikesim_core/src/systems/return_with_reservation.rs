//! The user reaches the station holding a slot reservation. The held slot is
//! released first so the dock is guaranteed to succeed; a failure there is an
//! invariant violation, not a simulated condition.

use bevy_ecs::prelude::{Entity, Query, Res, ResMut};
use tracing::debug;

use crate::clock::{CurrentEvent, EventKind, SimulationClock};
use crate::ecs::{Bike, Station, User};
use crate::recommendation::RecommendationSystem;
use crate::reservations::{cancel_slot_reservation, return_bike, Reservations};
use crate::rngs::SimulationRng;
use crate::routing::RouteProviderResource;
use crate::scenario::{ReservationValiditySecs, SimulationBounds};
use crate::systems::common::{after_successful_return, attempt_walkup_return, JourneyServices};
use crate::telemetry::SimTelemetry;

#[allow(clippy::too_many_arguments)]
pub fn return_with_reservation_system(
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
    if event.0.kind != EventKind::ArrivesAtStationToReturnBikeWithReservation {
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
        let bike = user.drop_bike();
        let docked = {
            let Ok((_, mut station)) = svc.stations.get_mut(station_entity) else {
                return;
            };
            cancel_slot_reservation(svc.reservations, reservation, &mut station);
            return_bike(&mut station, bike)
        };
        assert!(docked, "a slot reservation must guarantee a free slot");
        svc.reservations.resolve(reservation, now);
        svc.telemetry.record_return(station_entity, user_entity, true);
        debug!(user = ?user_entity, station = ?station_entity, "bike returned into reserved slot");
        after_successful_return(&mut svc, user_entity, &mut user);
    } else {
        attempt_walkup_return(&mut svc, user_entity, &mut user, station_entity);
    }
}
