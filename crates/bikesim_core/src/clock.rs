//! Simulation clock: the time-ordered event queue driving the run.
//!
//! Events are ordered by `(instant, seq)`; `seq` is assigned at schedule time
//! and strictly increases, so events sharing an instant replay in the order
//! they were scheduled. Popping an event advances the clock to its instant.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bevy_ecs::prelude::{Entity, Resource};

use crate::reservations::ReservationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    UserAppears,
    BikeReservationTimeout,
    SlotReservationTimeout,
    ArrivesAtStationToRentBikeWithReservation,
    ArrivesAtStationToRentBikeWithoutReservation,
    UserWantsToReturnBike,
    ArrivesAtStationToReturnBikeWithReservation,
    ArrivesAtStationToReturnBikeWithoutReservation,
    UserArrivesAtDestinationInCity,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::UserAppears,
        EventKind::BikeReservationTimeout,
        EventKind::SlotReservationTimeout,
        EventKind::ArrivesAtStationToRentBikeWithReservation,
        EventKind::ArrivesAtStationToRentBikeWithoutReservation,
        EventKind::UserWantsToReturnBike,
        EventKind::ArrivesAtStationToReturnBikeWithReservation,
        EventKind::ArrivesAtStationToReturnBikeWithoutReservation,
        EventKind::UserArrivesAtDestinationInCity,
    ];

    /// Stable tag used by the history sink and the parquet export.
    pub fn tag(&self) -> &'static str {
        match self {
            EventKind::UserAppears => "user_appears",
            EventKind::BikeReservationTimeout => "bike_reservation_timeout",
            EventKind::SlotReservationTimeout => "slot_reservation_timeout",
            EventKind::ArrivesAtStationToRentBikeWithReservation => {
                "arrives_at_station_to_rent_bike_with_reservation"
            }
            EventKind::ArrivesAtStationToRentBikeWithoutReservation => {
                "arrives_at_station_to_rent_bike_without_reservation"
            }
            EventKind::UserWantsToReturnBike => "user_wants_to_return_bike",
            EventKind::ArrivesAtStationToReturnBikeWithReservation => {
                "arrives_at_station_to_return_bike_with_reservation"
            }
            EventKind::ArrivesAtStationToReturnBikeWithoutReservation => {
                "arrives_at_station_to_return_bike_without_reservation"
            }
            EventKind::UserArrivesAtDestinationInCity => "user_arrives_at_destination_in_city",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub instant: u64,
    /// Schedule-time insertion order; breaks ties between equal instants.
    pub seq: u64,
    pub kind: EventKind,
    pub user: Option<Entity>,
    pub reservation: Option<ReservationId>,
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering to make BinaryHeap a min-heap by (instant, seq).
        other
            .instant
            .cmp(&self.instant)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The event popped for the current step; systems gate on its kind.
#[derive(Debug, Clone, Copy, Resource)]
pub struct CurrentEvent(pub Event);

#[derive(Debug, Default, Resource)]
pub struct SimulationClock {
    now: u64,
    next_seq: u64,
    events: BinaryHeap<Event>,
}

impl SimulationClock {
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn schedule_at(&mut self, instant: u64, kind: EventKind, user: Option<Entity>) {
        self.push(instant, kind, user, None);
    }

    pub fn schedule_in(&mut self, delay: u64, kind: EventKind, user: Option<Entity>) {
        self.push(self.now + delay, kind, user, None);
    }

    pub fn schedule_reservation_at(
        &mut self,
        instant: u64,
        kind: EventKind,
        user: Entity,
        reservation: ReservationId,
    ) {
        self.push(instant, kind, Some(user), Some(reservation));
    }

    pub fn schedule_reservation_in(
        &mut self,
        delay: u64,
        kind: EventKind,
        user: Entity,
        reservation: ReservationId,
    ) {
        self.push(self.now + delay, kind, Some(user), Some(reservation));
    }

    fn push(
        &mut self,
        instant: u64,
        kind: EventKind,
        user: Option<Entity>,
        reservation: Option<ReservationId>,
    ) {
        debug_assert!(
            instant >= self.now,
            "event instant must be >= current time"
        );
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push(Event {
            instant,
            seq,
            kind,
            user,
            reservation,
        });
    }

    /// Extracts the earliest event and advances the clock to its instant.
    pub fn pop_next(&mut self) -> Option<Event> {
        let event = self.events.pop()?;
        self.now = event.instant;
        Some(event)
    }

    pub fn next_event_time(&self) -> Option<u64> {
        self.events.peek().map(|e| e.instant)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_pops_events_in_time_order() {
        let mut clock = SimulationClock::default();
        clock.schedule_at(10, EventKind::UserAppears, None);
        clock.schedule_at(5, EventKind::UserAppears, None);
        clock.schedule_at(20, EventKind::UserAppears, None);

        let first = clock.pop_next().expect("first event");
        assert_eq!(first.instant, 5);
        assert_eq!(clock.now(), 5);

        let second = clock.pop_next().expect("second event");
        assert_eq!(second.instant, 10);
        assert_eq!(clock.now(), 10);

        let third = clock.pop_next().expect("third event");
        assert_eq!(third.instant, 20);
        assert_eq!(clock.now(), 20);

        assert!(clock.pop_next().is_none());
        assert!(clock.is_empty());
    }

    #[test]
    fn equal_instants_replay_in_schedule_order() {
        let mut clock = SimulationClock::default();
        clock.schedule_at(7, EventKind::UserWantsToReturnBike, None);
        clock.schedule_at(7, EventKind::UserAppears, None);
        clock.schedule_at(7, EventKind::BikeReservationTimeout, None);

        let kinds: Vec<EventKind> = std::iter::from_fn(|| clock.pop_next())
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::UserWantsToReturnBike,
                EventKind::UserAppears,
                EventKind::BikeReservationTimeout,
            ]
        );
    }

    #[test]
    fn schedule_in_is_relative_to_now() {
        let mut clock = SimulationClock::default();
        clock.schedule_at(10, EventKind::UserAppears, None);
        clock.pop_next().expect("event");
        clock.schedule_in(5, EventKind::UserWantsToReturnBike, None);
        let event = clock.pop_next().expect("relative event");
        assert_eq!(event.instant, 15);
    }
}
