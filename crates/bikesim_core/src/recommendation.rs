//! Station recommendation: rankings over the station directory, consumed by
//! the user strategies to pick rental and return destinations.
//!
//! All rankings only consider stations within `max_distance_m` of the queried
//! position and are fully deterministic (ties break on entity id).

use bevy_ecs::prelude::{Entity, Resource};
use h3o::LatLng;

use crate::spatial::distance_m;

/// Read-only view of one station, captured before a decision round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationSnapshot {
    pub entity: Entity,
    pub position: LatLng,
    pub capacity: usize,
    pub available_bikes: usize,
    pub available_slots: usize,
}

/// Walking distance users are willing to consider, in meters.
const DEFAULT_MAX_DISTANCE_M: f64 = 1_500.0;

#[derive(Debug, Clone, Copy, Resource)]
pub struct RecommendationSystem {
    pub max_distance_m: f64,
}

impl Default for RecommendationSystem {
    fn default() -> Self {
        Self {
            max_distance_m: DEFAULT_MAX_DISTANCE_M,
        }
    }
}

impl RecommendationSystem {
    fn within_range(&self, position: LatLng, stations: &[StationSnapshot]) -> Vec<StationSnapshot> {
        stations
            .iter()
            .filter(|s| distance_m(s.position, position) <= self.max_distance_m)
            .copied()
            .collect()
    }

    fn sort_by_key_then_entity<K, F>(
        mut stations: Vec<StationSnapshot>,
        key: F,
    ) -> Vec<StationSnapshot>
    where
        K: PartialOrd,
        F: Fn(&StationSnapshot) -> K,
    {
        stations.sort_by(|a, b| {
            key(a)
                .partial_cmp(&key(b))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entity.cmp(&b.entity))
        });
        stations
    }

    /// Stations ordered by linear distance from `position`.
    pub fn by_distance(&self, position: LatLng, stations: &[StationSnapshot]) -> Vec<StationSnapshot> {
        let candidates = self.within_range(position, stations);
        Self::sort_by_key_then_entity(candidates, |s| distance_m(s.position, position))
    }

    /// Stations ordered by available bikes, most first.
    pub fn by_available_bikes(
        &self,
        position: LatLng,
        stations: &[StationSnapshot],
    ) -> Vec<StationSnapshot> {
        let candidates = self.within_range(position, stations);
        Self::sort_by_key_then_entity(candidates, |s| -(s.available_bikes as f64))
    }

    /// Stations ordered by available slots, most first.
    pub fn by_available_slots(
        &self,
        position: LatLng,
        stations: &[StationSnapshot],
    ) -> Vec<StationSnapshot> {
        let candidates = self.within_range(position, stations);
        Self::sort_by_key_then_entity(candidates, |s| -(s.available_slots as f64))
    }

    /// Stations ordered by the ratio distance / available bikes; stations with
    /// no bikes rank last.
    pub fn by_distance_bike_ratio(
        &self,
        position: LatLng,
        stations: &[StationSnapshot],
    ) -> Vec<StationSnapshot> {
        let candidates = self.within_range(position, stations);
        Self::sort_by_key_then_entity(candidates, |s| {
            if s.available_bikes == 0 {
                f64::INFINITY
            } else {
                distance_m(s.position, position) / s.available_bikes as f64
            }
        })
    }

    /// Stations ordered by the ratio distance / available slots; stations with
    /// no slots rank last.
    pub fn by_distance_slot_ratio(
        &self,
        position: LatLng,
        stations: &[StationSnapshot],
    ) -> Vec<StationSnapshot> {
        let candidates = self.within_range(position, stations);
        Self::sort_by_key_then_entity(candidates, |s| {
            if s.available_slots == 0 {
                f64::INFINITY
            } else {
                distance_m(s.position, position) / s.available_slots as f64
            }
        })
    }

    /// Recommended stations to rent at: nearest first, better-stocked first
    /// among equally distant ones. Empty stations stay in the ranking; the
    /// caller finds out through a failed reservation or rental.
    pub fn rank_stations_to_rent(
        &self,
        position: LatLng,
        stations: &[StationSnapshot],
    ) -> Vec<StationSnapshot> {
        let candidates = self.within_range(position, stations);
        Self::sort_by_key_then_entity(candidates, |s| {
            (distance_m(s.position, position), -(s.available_bikes as f64))
        })
    }

    /// Recommended stations to return at: nearest first, freer first among
    /// equally distant ones.
    pub fn rank_stations_to_return(
        &self,
        position: LatLng,
        stations: &[StationSnapshot],
    ) -> Vec<StationSnapshot> {
        let candidates = self.within_range(position, stations);
        Self::sort_by_key_then_entity(candidates, |s| {
            (distance_m(s.position, position), -(s.available_slots as f64))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lng: f64) -> LatLng {
        LatLng::new(lat, lng).expect("valid point")
    }

    fn snapshot(id: u32, lat: f64, lng: f64, bikes: usize, slots: usize) -> StationSnapshot {
        StationSnapshot {
            entity: Entity::from_raw(id),
            position: point(lat, lng),
            capacity: bikes + slots,
            available_bikes: bikes,
            available_slots: slots,
        }
    }

    #[test]
    fn ranks_rent_candidates_by_distance_keeping_empty_ones() {
        let system = RecommendationSystem::default();
        let user = point(40.420, -3.700);
        let near_empty = snapshot(1, 40.4205, -3.700, 0, 5);
        let near = snapshot(2, 40.421, -3.700, 2, 3);
        let far = snapshot(3, 40.426, -3.700, 4, 1);
        let ranked = system.rank_stations_to_rent(user, &[far, near_empty, near]);
        assert_eq!(
            ranked.iter().map(|s| s.entity).collect::<Vec<_>>(),
            vec![near_empty.entity, near.entity, far.entity],
            "an empty station is still recommended; the user discovers the shortage"
        );
    }

    #[test]
    fn distant_stations_are_never_recommended() {
        let system = RecommendationSystem::default();
        let user = point(40.42, -3.70);
        let out_of_range = snapshot(1, 40.60, -3.70, 5, 5);
        assert!(system.by_distance(user, &[out_of_range]).is_empty());
    }

    #[test]
    fn ratio_ranking_prefers_well_stocked_nearby_stations() {
        let system = RecommendationSystem::default();
        let user = point(40.420, -3.700);
        // Slightly farther but much better stocked.
        let stocked = snapshot(1, 40.422, -3.700, 8, 2);
        let close_scarce = snapshot(2, 40.421, -3.700, 1, 9);
        let drained = snapshot(3, 40.4205, -3.700, 0, 10);
        let ranked = system.by_distance_bike_ratio(user, &[close_scarce, stocked, drained]);
        assert_eq!(ranked[0].entity, stocked.entity);
        assert_eq!(ranked.last().map(|s| s.entity), Some(drained.entity));
    }
}
