//! History sink: write-only record of the run for later analysis.
//!
//! The runner reports every dequeued event before execution and the entities
//! it touched after execution; entity creation registers an initial snapshot.
//! The core never reads any of this back.

use bevy_ecs::prelude::{Entity, Resource, World};

use crate::clock::{Event, EventKind};
use crate::ecs::{Station, User, UserState};
use crate::reservations::Reservations;

/// Snapshot of one user at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct UserSnapshot {
    pub entity: Entity,
    pub lat: f64,
    pub lng: f64,
    pub state: UserState,
    pub has_bike: bool,
}

/// Snapshot of one station's counters at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct StationRecord {
    pub entity: Entity,
    pub capacity: usize,
    pub docked: usize,
    pub reserved_bikes: usize,
    pub reserved_slots: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TouchedEntity {
    User(UserSnapshot),
    Station(StationRecord),
}

/// One executed event: its scheduling key, kind tag and the state of the
/// entities it touched after execution.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub instant: u64,
    pub seq: u64,
    pub kind: EventKind,
    pub touched: Vec<TouchedEntity>,
}

#[derive(Debug, Default, Resource)]
pub struct SimHistory {
    pub initial_users: Vec<UserSnapshot>,
    pub initial_stations: Vec<StationRecord>,
    entries: Vec<HistoryEntry>,
}

impl SimHistory {
    pub fn register_user(&mut self, snapshot: UserSnapshot) {
        self.initial_users.push(snapshot);
    }

    pub fn register_station(&mut self, record: StationRecord) {
        self.initial_stations.push(record);
    }

    /// Reported when the event is dequeued, before execution.
    pub fn record_dequeued(&mut self, event: &Event) {
        self.entries.push(HistoryEntry {
            instant: event.instant,
            seq: event.seq,
            kind: event.kind,
            touched: Vec::new(),
        });
    }

    /// Reported after execution with the touched-entity snapshots.
    pub fn record_executed(&mut self, touched: Vec<TouchedEntity>) {
        if let Some(entry) = self.entries.last_mut() {
            entry.touched = touched;
        }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// The executed `(instant, seq, kind)` sequence; two runs of the same
    /// configuration and seed must produce identical signatures.
    pub fn event_signature(&self) -> Vec<(u64, u64, EventKind)> {
        self.entries
            .iter()
            .map(|e| (e.instant, e.seq, e.kind))
            .collect()
    }
}

pub fn snapshot_user(entity: Entity, user: &User) -> UserSnapshot {
    UserSnapshot {
        entity,
        lat: user.position.lat(),
        lng: user.position.lng(),
        state: user.state,
        has_bike: user.has_bike(),
    }
}

pub fn snapshot_station(entity: Entity, station: &Station) -> StationRecord {
    StationRecord {
        entity,
        capacity: station.capacity(),
        docked: station.docked_count(),
        reserved_bikes: station.reserved_bikes(),
        reserved_slots: station.reserved_slots(),
    }
}

/// Entities an executed event touched: the subject user, the station it is
/// bound to (directly or through the event's reservation).
pub fn capture_touched(world: &World, event: &Event) -> Vec<TouchedEntity> {
    let mut touched = Vec::new();
    let mut station_entities = Vec::new();

    if let Some(user_entity) = event.user {
        if let Some(user) = world.get::<User>(user_entity) {
            touched.push(TouchedEntity::User(snapshot_user(user_entity, user)));
            if let Some(station) = user.destination_station {
                station_entities.push(station);
            }
        }
    }
    if let Some(reservation) = event.reservation {
        if let Some(ledger) = world.get_resource::<Reservations>() {
            station_entities.push(ledger.get(reservation).station);
        }
    }

    station_entities.dedup();
    for entity in station_entities {
        if let Some(station) = world.get::<Station>(entity) {
            touched.push(TouchedEntity::Station(snapshot_station(entity, station)));
        }
    }
    touched
}
