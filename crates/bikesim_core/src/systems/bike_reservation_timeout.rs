//! A bike reservation's hold ran out before the user arrived.
//!
//! Timeouts are not pre-emptive: this event is always scheduled at
//! `start + validity` and must be a no-op when the reservation was already
//! resolved by an earlier arrival.

use bevy_ecs::prelude::{Entity, Query, Res, ResMut};
use tracing::debug;

use crate::clock::{CurrentEvent, EventKind, SimulationClock};
use crate::ecs::{Bike, Station, User};
use crate::memory::MemoryFact;
use crate::recommendation::RecommendationSystem;
use crate::reservations::{cancel_bike_reservation, Reservations};
use crate::rngs::SimulationRng;
use crate::routing::RouteProviderResource;
use crate::scenario::{ReservationValiditySecs, SimulationBounds};
use crate::systems::common::{after_bike_timeout, JourneyServices};
use crate::telemetry::SimTelemetry;

#[allow(clippy::too_many_arguments)]
pub fn bike_reservation_timeout_system(
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
    if event.0.kind != EventKind::BikeReservationTimeout {
        return;
    }
    let (Some(user_entity), Some(reservation)) = (event.0.user, event.0.reservation) else {
        return;
    };
    if !reservations.get(reservation).is_active() {
        // Resolved before the timeout fired.
        return;
    }

    let station_entity = reservations.get(reservation).station;
    {
        let Ok((_, mut station)) = stations.get_mut(station_entity) else {
            return;
        };
        cancel_bike_reservation(&reservations, reservation, &mut station, &mut bikes);
    }
    reservations.expire(reservation, validity.0);

    let Ok(mut user) = users.get_mut(user_entity) else {
        return;
    };
    // The user got as far as the hold lasted.
    if let Some(route) = &user.route {
        user.position = route.position_after(validity.0, user.velocity_ms());
    }
    let now = clock.now();
    user.memory.update(MemoryFact::BikeReservationTimeout, now);
    debug!(user = ?user_entity, station = ?station_entity, "bike reservation timed out");

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
    after_bike_timeout(&mut svc, user_entity, &mut user);
}
