//! Telemetry / KPIs: rental and return counters per station and per user,
//! plus one journey record per user that left the system.

use std::collections::HashMap;

use bevy_ecs::prelude::{Entity, Resource};

/// Rental/return attempt counters for one station or one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RentalsAndReturns {
    pub successful_rentals: u32,
    pub failed_rentals: u32,
    pub successful_returns: u32,
    pub failed_returns: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JourneyOutcome {
    /// The user finished the journey: bike returned (or never needed).
    Completed,
    /// The user gave up and left the system.
    Abandoned,
}

#[derive(Debug, Clone)]
pub struct JourneyRecord {
    pub user: Entity,
    pub left_at: u64,
    pub outcome: JourneyOutcome,
}

/// Collects simulation telemetry. Insert as a resource to record attempts.
#[derive(Debug, Default, Resource)]
pub struct SimTelemetry {
    per_station: HashMap<Entity, RentalsAndReturns>,
    per_user: HashMap<Entity, RentalsAndReturns>,
    pub journeys: Vec<JourneyRecord>,
}

impl SimTelemetry {
    pub fn record_rental(&mut self, station: Entity, user: Entity, success: bool) {
        let station_stats = self.per_station.entry(station).or_default();
        let user_stats = self.per_user.entry(user).or_default();
        if success {
            station_stats.successful_rentals += 1;
            user_stats.successful_rentals += 1;
        } else {
            station_stats.failed_rentals += 1;
            user_stats.failed_rentals += 1;
        }
    }

    pub fn record_return(&mut self, station: Entity, user: Entity, success: bool) {
        let station_stats = self.per_station.entry(station).or_default();
        let user_stats = self.per_user.entry(user).or_default();
        if success {
            station_stats.successful_returns += 1;
            user_stats.successful_returns += 1;
        } else {
            station_stats.failed_returns += 1;
            user_stats.failed_returns += 1;
        }
    }

    pub fn record_leave(&mut self, user: Entity, left_at: u64, outcome: JourneyOutcome) {
        self.journeys.push(JourneyRecord {
            user,
            left_at,
            outcome,
        });
    }

    pub fn station_stats(&self, station: Entity) -> RentalsAndReturns {
        self.per_station.get(&station).copied().unwrap_or_default()
    }

    pub fn user_stats(&self, user: Entity) -> RentalsAndReturns {
        self.per_user.get(&user).copied().unwrap_or_default()
    }

    pub fn completed_journeys(&self) -> usize {
        self.journeys
            .iter()
            .filter(|j| j.outcome == JourneyOutcome::Completed)
            .count()
    }

    pub fn abandoned_journeys(&self) -> usize {
        self.journeys
            .iter()
            .filter(|j| j.outcome == JourneyOutcome::Abandoned)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_split_by_station_and_user() {
        let mut telemetry = SimTelemetry::default();
        let station = Entity::from_raw(1);
        let user = Entity::from_raw(2);
        telemetry.record_rental(station, user, true);
        telemetry.record_rental(station, user, false);
        telemetry.record_return(station, user, true);

        let stats = telemetry.station_stats(station);
        assert_eq!(stats.successful_rentals, 1);
        assert_eq!(stats.failed_rentals, 1);
        assert_eq!(stats.successful_returns, 1);
        assert_eq!(telemetry.user_stats(user), stats);
        assert_eq!(telemetry.station_stats(Entity::from_raw(9)), RentalsAndReturns::default());
    }

    #[test]
    fn journey_outcomes_are_counted() {
        let mut telemetry = SimTelemetry::default();
        telemetry.record_leave(Entity::from_raw(1), 10, JourneyOutcome::Completed);
        telemetry.record_leave(Entity::from_raw(2), 20, JourneyOutcome::Abandoned);
        assert_eq!(telemetry.completed_journeys(), 1);
        assert_eq!(telemetry.abandoned_journeys(), 1);
    }
}
