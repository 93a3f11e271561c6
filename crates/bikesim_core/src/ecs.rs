//! ECS components: bikes, stations and users.
//!
//! Station counters are private; the reservation manager in
//! [`crate::reservations`] is the only module that mutates them, through the
//! `pub(crate)` mutators below. Every mutator re-checks the station capacity
//! invariants and panics on violation (a violation is a core bug, not a
//! simulated-world condition).

use bevy_ecs::prelude::{Component, Entity};
use h3o::LatLng;
use rand::Rng;

use crate::memory::UserMemory;
use crate::reservations::ReservationId;
use crate::routing::Route;
use crate::strategies::UserStrategy;

/// A bike: docked at exactly one station or held by exactly one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Component)]
pub struct Bike {
    /// Held back for an active bike reservation while still physically docked.
    pub reserved: bool,
}

/// A docking station with a fixed number of slots.
#[derive(Debug, Clone, Component)]
pub struct Station {
    position: LatLng,
    capacity: usize,
    docked: Vec<Entity>,
    reserved_bikes: usize,
    reserved_slots: usize,
}

impl Station {
    pub fn new(position: LatLng, capacity: usize) -> Self {
        Self {
            position,
            capacity,
            docked: Vec::with_capacity(capacity),
            reserved_bikes: 0,
            reserved_slots: 0,
        }
    }

    pub fn position(&self) -> LatLng {
        self.position
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn docked_bikes(&self) -> &[Entity] {
        &self.docked
    }

    pub fn docked_count(&self) -> usize {
        self.docked.len()
    }

    pub fn reserved_bikes(&self) -> usize {
        self.reserved_bikes
    }

    pub fn reserved_slots(&self) -> usize {
        self.reserved_slots
    }

    /// Docked bikes not held back by a reservation.
    pub fn available_bikes(&self) -> usize {
        self.docked.len() - self.reserved_bikes
    }

    /// Free slots not held back by a reservation.
    pub fn available_slots(&self) -> usize {
        self.capacity - self.docked.len() - self.reserved_slots
    }

    pub(crate) fn hold_bike(&mut self) {
        assert!(
            self.available_bikes() > 0,
            "reserving a bike at a station with none available"
        );
        self.reserved_bikes += 1;
        self.assert_invariants();
    }

    pub(crate) fn release_bike_hold(&mut self) {
        assert!(
            self.reserved_bikes > 0,
            "releasing a bike hold would drive reservedBikes negative"
        );
        self.reserved_bikes -= 1;
        self.assert_invariants();
    }

    pub(crate) fn hold_slot(&mut self) {
        assert!(
            self.available_slots() > 0,
            "reserving a slot at a station with none available"
        );
        self.reserved_slots += 1;
        self.assert_invariants();
    }

    pub(crate) fn release_slot_hold(&mut self) {
        assert!(
            self.reserved_slots > 0,
            "releasing a slot hold would drive reservedSlots negative"
        );
        self.reserved_slots -= 1;
        self.assert_invariants();
    }

    pub(crate) fn dock(&mut self, bike: Entity) {
        assert!(
            self.docked.len() < self.capacity,
            "docking a bike at a full station"
        );
        self.docked.push(bike);
        self.assert_invariants();
    }

    pub(crate) fn undock(&mut self, bike: Entity) {
        let index = self
            .docked
            .iter()
            .position(|&b| b == bike)
            .unwrap_or_else(|| panic!("removing a bike that is not docked here"));
        self.docked.remove(index);
        self.assert_invariants();
    }

    fn assert_invariants(&self) {
        assert!(
            self.docked.len() <= self.capacity,
            "station holds more bikes than its capacity"
        );
        assert!(
            self.reserved_bikes <= self.docked.len(),
            "more reserved bikes than docked bikes"
        );
        assert!(
            self.reserved_slots <= self.capacity - self.docked.len(),
            "more reserved slots than free slots"
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserState {
    /// Created by an entry point, UserAppears not yet executed.
    Pending,
    Walking,
    Cycling,
    LeftSystem,
}

/// A simulated user: shared journey state plus the decision strategy bound to
/// it. Strategy-specific behaviour lives in [`UserStrategy`], not in subtypes.
#[derive(Debug, Component)]
pub struct User {
    pub state: UserState,
    pub position: LatLng,
    /// `None` while walking; the rented bike while cycling.
    pub bike: Option<Entity>,
    /// Station the user is currently heading to, if any.
    pub destination_station: Option<Entity>,
    /// Most recent reservation, if any.
    pub reservation: Option<ReservationId>,
    /// Final (non-station) destination reached after returning the bike.
    pub destination_place: Option<LatLng>,
    /// Route currently being travelled, kept for mid-route position updates.
    pub route: Option<Route>,
    pub walking_velocity_ms: f64,
    pub cycling_velocity_ms: f64,
    pub memory: UserMemory,
    pub strategy: UserStrategy,
}

impl User {
    /// Velocities are sampled per-user: walking 3-7 km/h, cycling 10-20 km/h.
    pub fn new<R: Rng>(
        position: LatLng,
        destination_place: Option<LatLng>,
        strategy: UserStrategy,
        rng: &mut R,
    ) -> Self {
        let walking_velocity_ms = rng.gen_range(3..8) as f64 / 3.6;
        let cycling_velocity_ms = rng.gen_range(10..21) as f64 / 3.6;
        Self {
            state: UserState::Pending,
            position,
            bike: None,
            destination_station: None,
            reservation: None,
            destination_place,
            route: None,
            walking_velocity_ms,
            cycling_velocity_ms,
            memory: UserMemory::default(),
            strategy,
        }
    }

    pub fn has_bike(&self) -> bool {
        self.bike.is_some()
    }

    /// Current velocity in m/s: cycling while holding a bike, walking otherwise.
    pub fn velocity_ms(&self) -> f64 {
        if self.has_bike() {
            self.cycling_velocity_ms
        } else {
            self.walking_velocity_ms
        }
    }

    pub(crate) fn take_bike(&mut self, bike: Entity) {
        assert!(
            self.bike.is_none(),
            "user asked to hold two bikes at once"
        );
        self.bike = Some(bike);
        self.state = UserState::Cycling;
    }

    pub(crate) fn drop_bike(&mut self) -> Entity {
        let bike = self
            .bike
            .take()
            .unwrap_or_else(|| panic!("user returning a bike while holding none"));
        self.state = UserState::Walking;
        bike
    }
}
