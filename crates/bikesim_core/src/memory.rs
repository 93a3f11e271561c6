//! Per-user memory of failed attempts: reservation timeouts, failed
//! reservations, failed rentals and returns, and which stations were tried
//! at which instant. Strategies consult it to rule out stations and to decide
//! when to give up.

use bevy_ecs::prelude::Entity;

/// A negative fact worth remembering: something the user tried that did not
/// happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryFact {
    BikeReservationTimeout,
    SlotReservationTimeout,
    FailedBikeReservation(Entity),
    FailedSlotReservation(Entity),
    BikesUnavailable(Entity),
    SlotsUnavailable(Entity),
}

#[derive(Debug, Clone, Default)]
pub struct UserMemory {
    reservation_timeouts: u32,
    failed_reservations: u32,
    failed_rentals: u32,
    failed_returns: u32,
    bike_reservation_failures: Vec<(Entity, u64)>,
    slot_reservation_failures: Vec<(Entity, u64)>,
    rental_failures: Vec<(Entity, u64)>,
    return_failures: Vec<(Entity, u64)>,
}

impl UserMemory {
    pub fn update(&mut self, fact: MemoryFact, instant: u64) {
        match fact {
            MemoryFact::BikeReservationTimeout | MemoryFact::SlotReservationTimeout => {
                self.reservation_timeouts += 1;
            }
            MemoryFact::FailedBikeReservation(station) => {
                self.failed_reservations += 1;
                self.bike_reservation_failures.push((station, instant));
            }
            MemoryFact::FailedSlotReservation(station) => {
                self.failed_reservations += 1;
                self.slot_reservation_failures.push((station, instant));
            }
            MemoryFact::BikesUnavailable(station) => {
                self.failed_rentals += 1;
                self.rental_failures.push((station, instant));
            }
            MemoryFact::SlotsUnavailable(station) => {
                self.failed_returns += 1;
                self.return_failures.push((station, instant));
            }
        }
    }

    pub fn reservation_timeouts(&self) -> u32 {
        self.reservation_timeouts
    }

    pub fn failed_reservations(&self) -> u32 {
        self.failed_reservations
    }

    pub fn failed_rentals(&self) -> u32 {
        self.failed_rentals
    }

    pub fn failed_returns(&self) -> u32 {
        self.failed_returns
    }

    /// Stations where a bike reservation failed at exactly `instant`; used to
    /// skip stations already tried within the same decision round.
    pub fn stations_with_failed_bike_reservation_at(&self, instant: u64) -> Vec<Entity> {
        self.bike_reservation_failures
            .iter()
            .filter(|(_, at)| *at == instant)
            .map(|(station, _)| *station)
            .collect()
    }

    pub fn stations_with_failed_slot_reservation_at(&self, instant: u64) -> Vec<Entity> {
        self.slot_reservation_failures
            .iter()
            .filter(|(_, at)| *at == instant)
            .map(|(station, _)| *station)
            .collect()
    }

    /// Stations where a walk-up rental ever failed.
    pub fn stations_with_failed_rentals(&self) -> Vec<Entity> {
        self.rental_failures.iter().map(|(s, _)| *s).collect()
    }

    /// Stations where a walk-up return ever failed.
    pub fn stations_with_failed_returns(&self) -> Vec<Entity> {
        self.return_failures.iter().map(|(s, _)| *s).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_fact_categories() {
        let mut memory = UserMemory::default();
        let station = Entity::from_raw(3);
        memory.update(MemoryFact::BikeReservationTimeout, 10);
        memory.update(MemoryFact::SlotReservationTimeout, 20);
        memory.update(MemoryFact::FailedBikeReservation(station), 30);
        memory.update(MemoryFact::BikesUnavailable(station), 40);
        memory.update(MemoryFact::SlotsUnavailable(station), 50);

        assert_eq!(memory.reservation_timeouts(), 2);
        assert_eq!(memory.failed_reservations(), 1);
        assert_eq!(memory.failed_rentals(), 1);
        assert_eq!(memory.failed_returns(), 1);
    }

    #[test]
    fn same_instant_failures_are_queryable() {
        let mut memory = UserMemory::default();
        let a = Entity::from_raw(1);
        let b = Entity::from_raw(2);
        memory.update(MemoryFact::FailedBikeReservation(a), 5);
        memory.update(MemoryFact::FailedBikeReservation(b), 5);
        memory.update(MemoryFact::FailedBikeReservation(a), 9);

        let at_five = memory.stations_with_failed_bike_reservation_at(5);
        assert_eq!(at_five, vec![a, b]);
        assert_eq!(memory.stations_with_failed_bike_reservation_at(7), vec![]);
    }
}
