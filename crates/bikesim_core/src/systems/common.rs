//! Shared journey-planning flow used by the event systems.
//!
//! Every branch of a user's journey funnels through here: choosing a station,
//! picking a route, deciding whether to pre-reserve, and scheduling the
//! follow-up events. Resource-contention failures are fed back into the
//! agent's memory and resolved by a fresh decision, never by an error.

use bevy_ecs::prelude::{Entity, Query};
use h3o::LatLng;
use rand::rngs::StdRng;
use tracing::{debug, warn};

use crate::clock::{EventKind, SimulationClock};
use crate::ecs::{Bike, Station, User, UserState};
use crate::memory::MemoryFact;
use crate::recommendation::{RecommendationSystem, StationSnapshot};
use crate::reservations::{
    self, remove_bike_without_reservation, reserve_bike, reserve_slot, ReservationId, Reservations,
};
use crate::routing::{Route, RouteError, RouteProvider};
use crate::spatial::BoundingBox;
use crate::strategies::{DecisionCtx, UserStrategy};
use crate::telemetry::{JourneyOutcome, SimTelemetry};

/// Everything an event needs to advance a journey, borrowed from the system's
/// parameters for the duration of one `execute`.
pub struct JourneyServices<'w1, 's1, 'd1, 'w2, 's2, 'd2, 'a> {
    pub clock: &'a mut SimulationClock,
    pub reservations: &'a mut Reservations,
    pub rng: &'a mut StdRng,
    pub telemetry: &'a mut SimTelemetry,
    pub validity_secs: u64,
    pub bounds: BoundingBox,
    pub recommender: RecommendationSystem,
    pub routes: &'a dyn RouteProvider,
    pub stations: &'a mut Query<'w1, 's1, (Entity, &'d1 mut Station)>,
    pub bikes: &'a mut Query<'w2, 's2, &'d2 mut Bike>,
}

/// Deterministic read-only view of every station, captured per decision round.
pub fn station_directory(
    stations: &Query<(Entity, &mut Station)>,
) -> Vec<StationSnapshot> {
    let mut directory: Vec<StationSnapshot> = stations
        .iter()
        .map(|(entity, station)| StationSnapshot {
            entity,
            position: station.position(),
            capacity: station.capacity(),
            available_bikes: station.available_bikes(),
            available_slots: station.available_slots(),
        })
        .collect();
    directory.sort_by_key(|s| s.entity);
    directory
}

/// Runs one strategy question against a fresh decision context.
fn decide<T, F>(
    svc: &mut JourneyServices,
    user: &User,
    directory: &[StationSnapshot],
    arrival_time_secs: Option<u64>,
    question: F,
) -> T
where
    F: FnOnce(&UserStrategy, &mut DecisionCtx) -> T,
{
    let mut ctx = DecisionCtx {
        now: svc.clock.now(),
        position: user.position,
        return_anchor: user.destination_place,
        memory: &user.memory,
        stations: directory,
        recommender: &svc.recommender,
        bounds: &svc.bounds,
        arrival_time_secs,
        rng: &mut *svc.rng,
    };
    question(&user.strategy, &mut ctx)
}

pub fn leave_system(
    svc: &mut JourneyServices,
    user_entity: Entity,
    user: &mut User,
    outcome: JourneyOutcome,
) {
    user.state = UserState::LeftSystem;
    user.destination_station = None;
    user.route = None;
    svc.telemetry
        .record_leave(user_entity, svc.clock.now(), outcome);
    debug!(user = ?user_entity, ?outcome, "user leaves the system");
}

/// Candidate routes from the provider, one picked by the user.
fn select_route(
    svc: &mut JourneyServices,
    user: &User,
    from: LatLng,
    to: LatLng,
) -> Result<Route, RouteError> {
    let candidates = svc.routes.all_routes(from, to)?;
    let route = user.strategy.determine_route(&candidates, svc.rng)?;
    Ok(route.clone())
}

fn station_position(svc: &JourneyServices, station: Entity) -> Option<LatLng> {
    svc.stations.get(station).ok().map(|(_, s)| s.position())
}

/// Schedules the leg toward a station holding an active reservation: the
/// arrival is only enqueued when the user can make it before expiry, the
/// timeout always is. The arrival goes in first so that at equal instants it
/// resolves the reservation and the timeout becomes a no-op.
fn schedule_reserved_leg(
    svc: &mut JourneyServices,
    user_entity: Entity,
    reservation: ReservationId,
    travel_secs: u64,
    arrival_kind: EventKind,
    timeout_kind: EventKind,
) {
    if travel_secs <= svc.validity_secs {
        svc.clock
            .schedule_reservation_in(travel_secs, arrival_kind, user_entity, reservation);
    }
    svc.clock
        .schedule_reservation_in(svc.validity_secs, timeout_kind, user_entity, reservation);
}

enum FailedReservationNext {
    Left,
    WalkThereAnyway,
    PickAnotherStation,
}

/// Decision chain after a reservation came back `Failed`.
fn after_failed_reservation(
    svc: &mut JourneyServices,
    user_entity: Entity,
    user: &mut User,
    directory: &[StationSnapshot],
) -> FailedReservationNext {
    let leaves = decide(svc, user, directory, None, |s, ctx| {
        s.decides_to_leave_system_after_failed_reservation(ctx)
    });
    if leaves {
        leave_system(svc, user_entity, user, JourneyOutcome::Abandoned);
        return FailedReservationNext::Left;
    }
    let switches = decide(svc, user, directory, None, |s, ctx| {
        s.decides_to_determine_other_station_after_failed_reservation(ctx)
    });
    if switches {
        FailedReservationNext::PickAnotherStation
    } else {
        FailedReservationNext::WalkThereAnyway
    }
}

/// The user picks a station to rent at, a route, and whether to pre-reserve;
/// the resulting events are scheduled. Bounded by the number of stations so a
/// run of failed reservations within one instant cannot spin forever.
pub fn plan_rental(svc: &mut JourneyServices, user_entity: Entity, user: &mut User) {
    let max_attempts = svc.stations.iter().count().max(1);
    for _ in 0..max_attempts {
        let directory = station_directory(svc.stations);
        let chosen = decide(svc, user, &directory, None, |s, ctx| {
            s.determine_station_to_rent_bike(ctx)
        });
        let Some(station_entity) = chosen else {
            leave_system(svc, user_entity, user, JourneyOutcome::Abandoned);
            return;
        };
        user.destination_station = Some(station_entity);
        let Some(station_pos) = station_position(svc, station_entity) else {
            leave_system(svc, user_entity, user, JourneyOutcome::Abandoned);
            return;
        };
        let route = match select_route(svc, user, user.position, station_pos) {
            Ok(route) => route,
            Err(_) => {
                // No destination reachable.
                leave_system(svc, user_entity, user, JourneyOutcome::Abandoned);
                return;
            }
        };
        let travel_secs = route.travel_time_secs(user.velocity_ms());
        user.route = Some(route);

        let reserves = decide(svc, user, &directory, Some(travel_secs), |s, ctx| {
            s.decides_to_reserve_bike_at_new_decided_station(ctx)
        });
        if !reserves {
            svc.clock.schedule_in(
                travel_secs,
                EventKind::ArrivesAtStationToRentBikeWithoutReservation,
                Some(user_entity),
            );
            return;
        }

        if try_bike_reservation(svc, user_entity, user, station_entity, travel_secs) {
            return;
        }
        match after_failed_reservation(svc, user_entity, user, &directory) {
            FailedReservationNext::Left => return,
            FailedReservationNext::WalkThereAnyway => {
                svc.clock.schedule_in(
                    travel_secs,
                    EventKind::ArrivesAtStationToRentBikeWithoutReservation,
                    Some(user_entity),
                );
                return;
            }
            FailedReservationNext::PickAnotherStation => continue,
        }
    }
    leave_system(svc, user_entity, user, JourneyOutcome::Abandoned);
}

/// Attempts a bike reservation; on success schedules the reserved leg and
/// returns `true`. On failure records the memory fact and returns `false`.
fn try_bike_reservation(
    svc: &mut JourneyServices,
    user_entity: Entity,
    user: &mut User,
    station_entity: Entity,
    travel_secs: u64,
) -> bool {
    let now = svc.clock.now();
    let Ok((_, mut station)) = svc.stations.get_mut(station_entity) else {
        return false;
    };
    let reservation = reserve_bike(
        svc.reservations,
        station_entity,
        &mut station,
        svc.bikes,
        user_entity,
        now,
    );
    user.reservation = Some(reservation);
    if svc.reservations.get(reservation).is_active() {
        debug!(user = ?user_entity, station = ?station_entity, "bike reserved");
        schedule_reserved_leg(
            svc,
            user_entity,
            reservation,
            travel_secs,
            EventKind::ArrivesAtStationToRentBikeWithReservation,
            EventKind::BikeReservationTimeout,
        );
        true
    } else {
        user.memory
            .update(MemoryFact::FailedBikeReservation(station_entity), now);
        false
    }
}

/// The user picks a station to return at; mirrors [`plan_rental`] over slots.
pub fn plan_return(svc: &mut JourneyServices, user_entity: Entity, user: &mut User) {
    let max_attempts = svc.stations.iter().count().max(1);
    for _ in 0..max_attempts {
        let directory = station_directory(svc.stations);
        let chosen = decide(svc, user, &directory, None, |s, ctx| {
            s.determine_station_to_return_bike(ctx)
        });
        let Some(station_entity) = chosen else {
            warn!(user = ?user_entity, "no return station reachable, user leaves with the bike");
            leave_system(svc, user_entity, user, JourneyOutcome::Abandoned);
            return;
        };
        user.destination_station = Some(station_entity);
        let Some(station_pos) = station_position(svc, station_entity) else {
            leave_system(svc, user_entity, user, JourneyOutcome::Abandoned);
            return;
        };
        let route = match select_route(svc, user, user.position, station_pos) {
            Ok(route) => route,
            Err(_) => {
                warn!(user = ?user_entity, "no route to any return station, user leaves with the bike");
                leave_system(svc, user_entity, user, JourneyOutcome::Abandoned);
                return;
            }
        };
        let travel_secs = route.travel_time_secs(user.velocity_ms());
        user.route = Some(route);

        let reserves = decide(svc, user, &directory, Some(travel_secs), |s, ctx| {
            s.decides_to_reserve_slot_at_new_decided_station(ctx)
        });
        if !reserves {
            svc.clock.schedule_in(
                travel_secs,
                EventKind::ArrivesAtStationToReturnBikeWithoutReservation,
                Some(user_entity),
            );
            return;
        }

        if try_slot_reservation(svc, user_entity, user, station_entity, travel_secs) {
            return;
        }
        match after_failed_reservation(svc, user_entity, user, &directory) {
            FailedReservationNext::Left => return,
            FailedReservationNext::WalkThereAnyway => {
                svc.clock.schedule_in(
                    travel_secs,
                    EventKind::ArrivesAtStationToReturnBikeWithoutReservation,
                    Some(user_entity),
                );
                return;
            }
            FailedReservationNext::PickAnotherStation => continue,
        }
    }
    leave_system(svc, user_entity, user, JourneyOutcome::Abandoned);
}

fn try_slot_reservation(
    svc: &mut JourneyServices,
    user_entity: Entity,
    user: &mut User,
    station_entity: Entity,
    travel_secs: u64,
) -> bool {
    let now = svc.clock.now();
    let Ok((_, mut station)) = svc.stations.get_mut(station_entity) else {
        return false;
    };
    let reservation = reserve_slot(
        svc.reservations,
        station_entity,
        &mut station,
        user_entity,
        now,
    );
    user.reservation = Some(reservation);
    if svc.reservations.get(reservation).is_active() {
        debug!(user = ?user_entity, station = ?station_entity, "slot reserved");
        schedule_reserved_leg(
            svc,
            user_entity,
            reservation,
            travel_secs,
            EventKind::ArrivesAtStationToReturnBikeWithReservation,
            EventKind::SlotReservationTimeout,
        );
        true
    } else {
        user.memory
            .update(MemoryFact::FailedSlotReservation(station_entity), now);
        false
    }
}

/// After a timeout the user may keep heading to the same station, with or
/// without a fresh reservation.
pub fn continue_rental_at_same_station(
    svc: &mut JourneyServices,
    user_entity: Entity,
    user: &mut User,
) {
    let Some(station_entity) = user.destination_station else {
        plan_rental(svc, user_entity, user);
        return;
    };
    let Some(station_pos) = station_position(svc, station_entity) else {
        leave_system(svc, user_entity, user, JourneyOutcome::Abandoned);
        return;
    };
    let route = match select_route(svc, user, user.position, station_pos) {
        Ok(route) => route,
        Err(_) => {
            leave_system(svc, user_entity, user, JourneyOutcome::Abandoned);
            return;
        }
    };
    let travel_secs = route.travel_time_secs(user.velocity_ms());
    user.route = Some(route);

    let directory = station_directory(svc.stations);
    let re_reserves = decide(svc, user, &directory, Some(travel_secs), |s, ctx| {
        s.decides_to_reserve_bike_at_same_station_after_timeout(ctx)
    });
    if re_reserves {
        if try_bike_reservation(svc, user_entity, user, station_entity, travel_secs) {
            return;
        }
        match after_failed_reservation(svc, user_entity, user, &directory) {
            FailedReservationNext::Left => return,
            FailedReservationNext::PickAnotherStation => {
                plan_rental(svc, user_entity, user);
                return;
            }
            FailedReservationNext::WalkThereAnyway => {}
        }
    }
    svc.clock.schedule_in(
        travel_secs,
        EventKind::ArrivesAtStationToRentBikeWithoutReservation,
        Some(user_entity),
    );
}

/// Slot analogue of [`continue_rental_at_same_station`].
pub fn continue_return_at_same_station(
    svc: &mut JourneyServices,
    user_entity: Entity,
    user: &mut User,
) {
    let Some(station_entity) = user.destination_station else {
        plan_return(svc, user_entity, user);
        return;
    };
    let Some(station_pos) = station_position(svc, station_entity) else {
        leave_system(svc, user_entity, user, JourneyOutcome::Abandoned);
        return;
    };
    let route = match select_route(svc, user, user.position, station_pos) {
        Ok(route) => route,
        Err(_) => {
            leave_system(svc, user_entity, user, JourneyOutcome::Abandoned);
            return;
        }
    };
    let travel_secs = route.travel_time_secs(user.velocity_ms());
    user.route = Some(route);

    let directory = station_directory(svc.stations);
    let re_reserves = decide(svc, user, &directory, Some(travel_secs), |s, ctx| {
        s.decides_to_reserve_slot_at_same_station_after_timeout(ctx)
    });
    if re_reserves {
        if try_slot_reservation(svc, user_entity, user, station_entity, travel_secs) {
            return;
        }
        match after_failed_reservation(svc, user_entity, user, &directory) {
            FailedReservationNext::Left => return,
            FailedReservationNext::PickAnotherStation => {
                plan_return(svc, user_entity, user);
                return;
            }
            FailedReservationNext::WalkThereAnyway => {}
        }
    }
    svc.clock.schedule_in(
        travel_secs,
        EventKind::ArrivesAtStationToReturnBikeWithoutReservation,
        Some(user_entity),
    );
}

/// Rented: either head straight to a return station or ride to a waypoint
/// first and decide about returning there.
pub fn after_successful_rental(svc: &mut JourneyServices, user_entity: Entity, user: &mut User) {
    let directory = station_directory(svc.stations);
    let directly = decide(svc, user, &directory, None, |s, ctx| {
        s.decides_to_return_bike_directly(ctx)
    });
    if directly {
        plan_return(svc, user_entity, user);
        return;
    }
    let point = decide(svc, user, &directory, None, |s, ctx| s.decides_next_point(ctx));
    let route = match select_route(svc, user, user.position, point) {
        Ok(route) => route,
        Err(_) => {
            plan_return(svc, user_entity, user);
            return;
        }
    };
    let travel_secs = route.travel_time_secs(user.velocity_ms());
    user.route = Some(route);
    user.destination_station = None;
    svc.clock.schedule_in(
        travel_secs,
        EventKind::UserWantsToReturnBike,
        Some(user_entity),
    );
}

/// Returned: walk to the final city destination when there is one, otherwise
/// the journey ends at the dock.
pub fn after_successful_return(svc: &mut JourneyServices, user_entity: Entity, user: &mut User) {
    user.destination_station = None;
    let Some(place) = user.destination_place else {
        leave_system(svc, user_entity, user, JourneyOutcome::Completed);
        return;
    };
    let route = match select_route(svc, user, user.position, place) {
        Ok(route) => route,
        Err(_) => {
            leave_system(svc, user_entity, user, JourneyOutcome::Completed);
            return;
        }
    };
    let travel_secs = route.travel_time_secs(user.velocity_ms());
    user.route = Some(route);
    svc.clock.schedule_in(
        travel_secs,
        EventKind::UserArrivesAtDestinationInCity,
        Some(user_entity),
    );
}

/// Decision chain after a bike reservation timed out: leave, pick another
/// station, or keep walking to the same one.
pub fn after_bike_timeout(svc: &mut JourneyServices, user_entity: Entity, user: &mut User) {
    let directory = station_directory(svc.stations);
    let leaves = decide(svc, user, &directory, None, |s, ctx| {
        s.decides_to_leave_system_after_timeout(ctx)
    });
    if leaves {
        leave_system(svc, user_entity, user, JourneyOutcome::Abandoned);
        return;
    }
    let switches = decide(svc, user, &directory, None, |s, ctx| {
        s.decides_to_determine_other_station_after_timeout(ctx)
    });
    if switches {
        plan_rental(svc, user_entity, user);
    } else {
        continue_rental_at_same_station(svc, user_entity, user);
    }
}

/// Slot analogue of [`after_bike_timeout`].
pub fn after_slot_timeout(svc: &mut JourneyServices, user_entity: Entity, user: &mut User) {
    let directory = station_directory(svc.stations);
    let leaves = decide(svc, user, &directory, None, |s, ctx| {
        s.decides_to_leave_system_after_timeout(ctx)
    });
    if leaves {
        warn!(user = ?user_entity, "user gives up after slot timeout and leaves with the bike");
        leave_system(svc, user_entity, user, JourneyOutcome::Abandoned);
        return;
    }
    let switches = decide(svc, user, &directory, None, |s, ctx| {
        s.decides_to_determine_other_station_after_timeout(ctx)
    });
    if switches {
        plan_return(svc, user_entity, user);
    } else {
        continue_return_at_same_station(svc, user_entity, user);
    }
}

/// Walk-up rental attempt at `station_entity`; the station may have emptied
/// since the user decided to come.
pub fn attempt_walkup_rental(
    svc: &mut JourneyServices,
    user_entity: Entity,
    user: &mut User,
    station_entity: Entity,
) {
    let removed = match svc.stations.get_mut(station_entity) {
        Ok((_, mut station)) => remove_bike_without_reservation(&mut station, svc.bikes),
        Err(_) => None,
    };
    match removed {
        Some(bike) => {
            user.take_bike(bike);
            svc.telemetry.record_rental(station_entity, user_entity, true);
            debug!(user = ?user_entity, station = ?station_entity, "bike rented");
            after_successful_rental(svc, user_entity, user);
        }
        None => {
            svc.telemetry.record_rental(station_entity, user_entity, false);
            user.memory
                .update(MemoryFact::BikesUnavailable(station_entity), svc.clock.now());
            let directory = station_directory(svc.stations);
            let leaves = decide(svc, user, &directory, None, |s, ctx| {
                s.decides_to_leave_system_when_resource_unavailable(ctx)
            });
            if leaves {
                leave_system(svc, user_entity, user, JourneyOutcome::Abandoned);
            } else {
                plan_rental(svc, user_entity, user);
            }
        }
    }
}

/// Walk-up return attempt at `station_entity`; the station may have filled up
/// since the user decided to come.
pub fn attempt_walkup_return(
    svc: &mut JourneyServices,
    user_entity: Entity,
    user: &mut User,
    station_entity: Entity,
) {
    let Some(bike) = user.bike else {
        panic!("user arrived to return a bike while holding none");
    };
    let returned = match svc.stations.get_mut(station_entity) {
        Ok((_, mut station)) => reservations::return_bike(&mut station, bike),
        Err(_) => false,
    };
    if returned {
        user.drop_bike();
        svc.telemetry.record_return(station_entity, user_entity, true);
        debug!(user = ?user_entity, station = ?station_entity, "bike returned");
        after_successful_return(svc, user_entity, user);
    } else {
        svc.telemetry.record_return(station_entity, user_entity, false);
        user.memory
            .update(MemoryFact::SlotsUnavailable(station_entity), svc.clock.now());
        let directory = station_directory(svc.stations);
        let leaves = decide(svc, user, &directory, None, |s, ctx| {
            s.decides_to_leave_system_when_resource_unavailable(ctx)
        });
        if leaves {
            warn!(user = ?user_entity, "user gives up returning and leaves with the bike");
            leave_system(svc, user_entity, user, JourneyOutcome::Abandoned);
        } else {
            plan_return(svc, user_entity, user);
        }
    }
}
