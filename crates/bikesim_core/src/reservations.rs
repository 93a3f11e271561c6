//! Reservation manager: time-boxed holds on station bikes and slots.
//!
//! The [`Reservations`] ledger owns every [`Reservation`] record; users and
//! events refer to them by [`ReservationId`]. The six functions at the bottom
//! of this module are the only legal mutators of a station's counters; they
//! panic on any state that would violate the station invariants.
//!
//! Resource contention is not an error: a reservation that cannot acquire its
//! resource is born `Failed` and callers branch on the state.

use bevy_ecs::prelude::{Entity, Query, Resource};

use crate::ecs::{Bike, Station};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReservationId(u32);

impl ReservationId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationKind {
    Bike,
    Slot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationState {
    Active,
    Failed,
    Expired,
    Successful,
}

#[derive(Debug, Clone)]
pub struct Reservation {
    pub id: ReservationId,
    pub kind: ReservationKind,
    pub state: ReservationState,
    pub start_instant: u64,
    /// Set when the reservation reaches a terminal state.
    pub end_instant: Option<u64>,
    pub user: Entity,
    pub station: Entity,
    /// The concrete bike held back; only for bike reservations born active.
    pub bike: Option<Entity>,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.state == ReservationState::Active
    }
}

/// Ledger of every reservation made during the run.
#[derive(Debug, Default, Resource)]
pub struct Reservations {
    records: Vec<Reservation>,
}

impl Reservations {
    pub fn get(&self, id: ReservationId) -> &Reservation {
        &self.records[id.index()]
    }

    pub fn all(&self) -> &[Reservation] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn create(
        &mut self,
        kind: ReservationKind,
        state: ReservationState,
        start_instant: u64,
        end_instant: Option<u64>,
        user: Entity,
        station: Entity,
        bike: Option<Entity>,
    ) -> ReservationId {
        let id = ReservationId(self.records.len() as u32);
        self.records.push(Reservation {
            id,
            kind,
            state,
            start_instant,
            end_instant,
            user,
            station,
            bike,
        });
        id
    }

    /// Active -> Expired. The end instant is the moment the hold ran out.
    pub fn expire(&mut self, id: ReservationId, validity_secs: u64) {
        let record = &mut self.records[id.index()];
        assert!(
            record.state == ReservationState::Active,
            "expiring a reservation that is not active (state {:?})",
            record.state
        );
        record.state = ReservationState::Expired;
        record.end_instant = Some(record.start_instant + validity_secs);
    }

    /// Active -> Successful, at the instant the user claimed the resource.
    pub fn resolve(&mut self, id: ReservationId, instant: u64) {
        let record = &mut self.records[id.index()];
        assert!(
            record.state == ReservationState::Active,
            "resolving a reservation that is not active (state {:?})",
            record.state
        );
        record.state = ReservationState::Successful;
        record.end_instant = Some(instant);
    }
}

fn newest_unreserved_bike(station: &Station, bikes: &Query<&mut Bike>) -> Entity {
    station
        .docked_bikes()
        .iter()
        .rev()
        .copied()
        .find(|&entity| bikes.get(entity).map(|bike| !bike.reserved).unwrap_or(false))
        .unwrap_or_else(|| panic!("station counters say a bike is available but none is unreserved"))
}

fn set_bike_reserved(bikes: &mut Query<&mut Bike>, entity: Entity, reserved: bool) {
    match bikes.get_mut(entity) {
        Ok(mut bike) => bike.reserved = reserved,
        Err(_) => panic!("bike entity vanished from the world"),
    }
}

/// Try to reserve a bike. On success the newest unreserved docked bike is
/// held back and an active reservation is returned; otherwise a failed
/// reservation is recorded with no effect on the counters.
pub fn reserve_bike(
    reservations: &mut Reservations,
    station_entity: Entity,
    station: &mut Station,
    bikes: &mut Query<&mut Bike>,
    user: Entity,
    now: u64,
) -> ReservationId {
    if station.available_bikes() == 0 {
        return reservations.create(
            ReservationKind::Bike,
            ReservationState::Failed,
            now,
            Some(now),
            user,
            station_entity,
            None,
        );
    }
    let bike_entity = newest_unreserved_bike(station, bikes);
    set_bike_reserved(bikes, bike_entity, true);
    station.hold_bike();
    reservations.create(
        ReservationKind::Bike,
        ReservationState::Active,
        now,
        None,
        user,
        station_entity,
        Some(bike_entity),
    )
}

/// Try to reserve a slot; symmetric to [`reserve_bike`] over free slots.
pub fn reserve_slot(
    reservations: &mut Reservations,
    station_entity: Entity,
    station: &mut Station,
    user: Entity,
    now: u64,
) -> ReservationId {
    if station.available_slots() == 0 {
        return reservations.create(
            ReservationKind::Slot,
            ReservationState::Failed,
            now,
            Some(now),
            user,
            station_entity,
            None,
        );
    }
    station.hold_slot();
    reservations.create(
        ReservationKind::Slot,
        ReservationState::Active,
        now,
        None,
        user,
        station_entity,
        None,
    )
}

/// Release the hold of an active bike reservation without claiming the bike.
pub fn cancel_bike_reservation(
    reservations: &Reservations,
    id: ReservationId,
    station: &mut Station,
    bikes: &mut Query<&mut Bike>,
) {
    let record = reservations.get(id);
    assert!(
        record.kind == ReservationKind::Bike && record.is_active(),
        "cancelling a bike reservation that is not active"
    );
    let bike_entity = record
        .bike
        .unwrap_or_else(|| panic!("active bike reservation holds no bike"));
    set_bike_reserved(bikes, bike_entity, false);
    station.release_bike_hold();
}

/// Release the hold of an active slot reservation without docking.
pub fn cancel_slot_reservation(
    reservations: &Reservations,
    id: ReservationId,
    station: &mut Station,
) {
    let record = reservations.get(id);
    assert!(
        record.kind == ReservationKind::Slot && record.is_active(),
        "cancelling a slot reservation that is not active"
    );
    station.release_slot_hold();
}

/// Physically remove the reserved bike. The reservation must be active or
/// freshly resolved; its hold is released as part of the removal.
pub fn remove_bike_with_reservation(
    reservations: &Reservations,
    id: ReservationId,
    station: &mut Station,
    bikes: &mut Query<&mut Bike>,
) -> Entity {
    let record = reservations.get(id);
    assert!(
        record.kind == ReservationKind::Bike,
        "removing a bike with a slot reservation"
    );
    assert!(
        matches!(
            record.state,
            ReservationState::Active | ReservationState::Successful
        ),
        "removing a bike with a reservation in state {:?}",
        record.state
    );
    let bike_entity = record
        .bike
        .unwrap_or_else(|| panic!("bike reservation holds no bike"));
    station.release_bike_hold();
    set_bike_reserved(bikes, bike_entity, false);
    station.undock(bike_entity);
    bike_entity
}

/// Walk-up removal. Returns `None`, touching nothing, when no bike is
/// available (the station may have emptied since the user decided to come).
pub fn remove_bike_without_reservation(
    station: &mut Station,
    bikes: &mut Query<&mut Bike>,
) -> Option<Entity> {
    if station.available_bikes() == 0 {
        return None;
    }
    let bike_entity = newest_unreserved_bike(station, bikes);
    station.undock(bike_entity);
    Some(bike_entity)
}

/// Dock a bike. Returns `false`, touching nothing, when no slot is free.
pub fn return_bike(station: &mut Station, bike: Entity) -> bool {
    if station.available_slots() == 0 {
        return false;
    }
    station.dock(bike);
    true
}
