//! User decision strategies: the pluggable policy behind every journey
//! branch.
//!
//! One [`UserStrategy`] variant per built-in archetype, all answering the
//! same question set. Strategy parameters are sampled once at user creation
//! from the run's seeded RNG; decisions read a [`DecisionCtx`] snapshot so
//! they stay free of ECS plumbing and can be unit-tested in isolation.

use bevy_ecs::prelude::Entity;
use h3o::LatLng;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::memory::UserMemory;
use crate::recommendation::{RecommendationSystem, StationSnapshot};
use crate::routing::{Route, RouteError};
use crate::spatial::{distance_m, BoundingBox};

/// Below this remaining travel time a user keeps walking to the previously
/// chosen station instead of re-reserving there after a timeout.
const SAME_STATION_MIN_ARRIVAL_SECS: u64 = 180;

/// Everything a strategy may look at when answering a decision question.
pub struct DecisionCtx<'a> {
    pub now: u64,
    pub position: LatLng,
    /// Final city destination, used to anchor return-station choices.
    pub return_anchor: Option<LatLng>,
    pub memory: &'a UserMemory,
    pub stations: &'a [StationSnapshot],
    pub recommender: &'a RecommendationSystem,
    pub bounds: &'a BoundingBox,
    /// Seconds left to reach the current destination, when known.
    pub arrival_time_secs: Option<u64>,
    pub rng: &'a mut StdRng,
}

/// Configuration tag naming a user archetype. Mapped to a strategy by
/// [`UserStrategy::from_tag`]; adding an archetype means adding a variant
/// here and an arm there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UserTypeTag {
    Obedient,
    Random,
    DistanceRestriction,
    Uninformed,
    AvailableResources,
    Tourist,
    Weigher,
}

/// How many failures of each kind a user tolerates before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Patience {
    pub min_reservation_timeouts: u32,
    pub min_reservation_attempts: u32,
    pub min_resource_failures: u32,
}

impl Patience {
    fn sample(rng: &mut StdRng) -> Self {
        Self {
            min_reservation_timeouts: rng.gen_range(2..5),
            min_reservation_attempts: rng.gen_range(3..7),
            min_resource_failures: rng.gen_range(2..5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceRestrictionParams {
    pub patience: Patience,
    /// Stations farther than this are never considered.
    pub max_distance_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouristParams {
    pub patience: Patience,
    /// The destination is picked at random among this many nearest stations.
    pub selection_size: usize,
    /// Percent chance (0-100) of reserving at a newly decided station.
    pub bike_reservation_pct: u32,
    pub slot_reservation_pct: u32,
    /// Percent chance of switching stations after a timeout / failed attempt.
    pub switch_station_pct: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeigherParams {
    pub patience: Patience,
    pub reservation_pct: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserStrategy {
    /// Follows the recommendation system to the letter.
    Obedient(Patience),
    /// Every decision is a coin flip; nearest untried station wins.
    Random,
    /// Ratio-based choice restricted to a maximum walking distance.
    DistanceRestriction(DistanceRestrictionParams),
    /// Naive: ignores availability entirely and never reserves.
    Uninformed,
    /// Greedy on available resources, reserves whenever possible.
    AvailableResources(Patience),
    /// Visits a point of interest; picks among nearby stations at random and
    /// prefers the longest route.
    Tourist(TouristParams),
    /// Weighs distance against availability.
    Weigher(WeigherParams),
}

impl UserStrategy {
    /// Explicit registry mapping a configuration tag to a strategy.
    pub fn from_tag(tag: UserTypeTag, rng: &mut StdRng) -> Self {
        match tag {
            UserTypeTag::Obedient => UserStrategy::Obedient(Patience::sample(rng)),
            UserTypeTag::Random => UserStrategy::Random,
            UserTypeTag::DistanceRestriction => {
                UserStrategy::DistanceRestriction(DistanceRestrictionParams {
                    patience: Patience::sample(rng),
                    max_distance_m: rng.gen_range(600..1_501) as f64,
                })
            }
            UserTypeTag::Uninformed => UserStrategy::Uninformed,
            UserTypeTag::AvailableResources => {
                UserStrategy::AvailableResources(Patience::sample(rng))
            }
            UserTypeTag::Tourist => UserStrategy::Tourist(TouristParams {
                patience: Patience::sample(rng),
                selection_size: 3,
                bike_reservation_pct: rng.gen_range(30..70),
                slot_reservation_pct: rng.gen_range(30..70),
                switch_station_pct: rng.gen_range(30..70),
            }),
            UserTypeTag::Weigher => UserStrategy::Weigher(WeigherParams {
                patience: Patience::sample(rng),
                reservation_pct: rng.gen_range(40..80),
            }),
        }
    }

    /// The naive archetype, handy as a fixed-behaviour default in tests.
    pub fn uninformed() -> Self {
        UserStrategy::Uninformed
    }

    fn patience(&self) -> Option<&Patience> {
        match self {
            UserStrategy::Obedient(p) | UserStrategy::AvailableResources(p) => Some(p),
            UserStrategy::DistanceRestriction(p) => Some(&p.patience),
            UserStrategy::Tourist(p) => Some(&p.patience),
            UserStrategy::Weigher(p) => Some(&p.patience),
            UserStrategy::Random | UserStrategy::Uninformed => None,
        }
    }

    fn every_station_tried(ctx: &DecisionCtx<'_>) -> bool {
        ctx.memory
            .stations_with_failed_bike_reservation_at(ctx.now)
            .len()
            >= ctx.stations.len()
    }

    pub fn decides_to_leave_system_after_timeout(&self, ctx: &mut DecisionCtx<'_>) -> bool {
        match self.patience() {
            Some(p) => ctx.memory.reservation_timeouts() >= p.min_reservation_timeouts,
            None => match self {
                UserStrategy::Random => Self::every_station_tried(ctx),
                _ => ctx.rng.gen_bool(0.5),
            },
        }
    }

    pub fn decides_to_leave_system_after_failed_reservation(&self, ctx: &mut DecisionCtx<'_>) -> bool {
        match self.patience() {
            Some(p) => ctx.memory.failed_reservations() >= p.min_reservation_attempts,
            None => match self {
                UserStrategy::Random => Self::every_station_tried(ctx),
                _ => ctx.rng.gen_bool(0.5),
            },
        }
    }

    pub fn decides_to_leave_system_when_resource_unavailable(&self, ctx: &mut DecisionCtx<'_>) -> bool {
        let failures = ctx.memory.failed_rentals() + ctx.memory.failed_returns();
        match self.patience() {
            Some(p) => failures >= p.min_resource_failures,
            None => match self {
                UserStrategy::Random => Self::every_station_tried(ctx),
                _ => ctx.rng.gen_bool(0.5),
            },
        }
    }

    pub fn determine_station_to_rent_bike(&self, ctx: &mut DecisionCtx<'_>) -> Option<Entity> {
        let position = ctx.position;
        match self {
            UserStrategy::Obedient(_) => ctx
                .recommender
                .rank_stations_to_rent(position, ctx.stations)
                .into_iter()
                .find(|s| !(s.position == position && s.available_bikes == 0))
                .map(|s| s.entity),
            UserStrategy::Random => {
                let tried = ctx.memory.stations_with_failed_bike_reservation_at(ctx.now);
                let mut candidates: Vec<StationSnapshot> = ctx
                    .stations
                    .iter()
                    .filter(|s| !tried.contains(&s.entity))
                    .copied()
                    .collect();
                if candidates.is_empty() {
                    candidates = ctx.stations.to_vec();
                }
                ctx.recommender
                    .by_distance(position, &candidates)
                    .first()
                    .map(|s| s.entity)
            }
            UserStrategy::DistanceRestriction(params) => ctx
                .recommender
                .by_distance_bike_ratio(position, ctx.stations)
                .into_iter()
                .find(|s| distance_m(s.position, position) <= params.max_distance_m)
                .map(|s| s.entity),
            UserStrategy::Uninformed => {
                let tried = ctx.memory.stations_with_failed_rentals();
                ctx.recommender
                    .by_distance(position, ctx.stations)
                    .into_iter()
                    .find(|s| !tried.contains(&s.entity))
                    .map(|s| s.entity)
            }
            UserStrategy::AvailableResources(_) => ctx
                .recommender
                .by_available_bikes(position, ctx.stations)
                .into_iter()
                .find(|s| s.available_bikes > 0)
                .map(|s| s.entity),
            UserStrategy::Tourist(params) => {
                let nearest = ctx.recommender.by_distance(position, ctx.stations);
                let pool = &nearest[..nearest.len().min(params.selection_size)];
                if pool.is_empty() {
                    return None;
                }
                Some(pool[ctx.rng.gen_range(0..pool.len())].entity)
            }
            UserStrategy::Weigher(_) => ctx
                .recommender
                .by_distance_bike_ratio(position, ctx.stations)
                .into_iter()
                .find(|s| s.available_bikes > 0)
                .map(|s| s.entity),
        }
    }

    pub fn determine_station_to_return_bike(&self, ctx: &mut DecisionCtx<'_>) -> Option<Entity> {
        // Return choices anchor on the final destination when there is one.
        let anchor = ctx.return_anchor.unwrap_or(ctx.position);
        match self {
            UserStrategy::Obedient(_) => ctx
                .recommender
                .rank_stations_to_return(anchor, ctx.stations)
                .into_iter()
                .find(|s| s.position != ctx.position)
                .map(|s| s.entity),
            UserStrategy::Random => {
                let tried = ctx.memory.stations_with_failed_slot_reservation_at(ctx.now);
                let mut candidates: Vec<StationSnapshot> = ctx
                    .stations
                    .iter()
                    .filter(|s| !tried.contains(&s.entity))
                    .copied()
                    .collect();
                if candidates.is_empty() {
                    candidates = ctx.stations.to_vec();
                }
                ctx.recommender
                    .by_distance(anchor, &candidates)
                    .first()
                    .map(|s| s.entity)
            }
            UserStrategy::DistanceRestriction(params) => ctx
                .recommender
                .by_distance_slot_ratio(anchor, ctx.stations)
                .into_iter()
                .find(|s| distance_m(s.position, ctx.position) <= params.max_distance_m)
                .map(|s| s.entity),
            UserStrategy::Uninformed => {
                let tried = ctx.memory.stations_with_failed_returns();
                ctx.recommender
                    .by_distance(anchor, ctx.stations)
                    .into_iter()
                    .find(|s| !tried.contains(&s.entity))
                    .map(|s| s.entity)
            }
            UserStrategy::AvailableResources(_) => ctx
                .recommender
                .by_available_slots(anchor, ctx.stations)
                .into_iter()
                .find(|s| s.available_slots > 0)
                .map(|s| s.entity),
            UserStrategy::Tourist(params) => {
                let nearest = ctx.recommender.by_distance(anchor, ctx.stations);
                let pool = &nearest[..nearest.len().min(params.selection_size)];
                if pool.is_empty() {
                    return None;
                }
                Some(pool[ctx.rng.gen_range(0..pool.len())].entity)
            }
            UserStrategy::Weigher(_) => ctx
                .recommender
                .by_distance_slot_ratio(anchor, ctx.stations)
                .into_iter()
                .find(|s| s.available_slots > 0)
                .map(|s| s.entity),
        }
    }

    fn far_from_destination(ctx: &DecisionCtx<'_>) -> bool {
        ctx.arrival_time_secs.unwrap_or(u64::MAX) > SAME_STATION_MIN_ARRIVAL_SECS
    }

    pub fn decides_to_reserve_bike_at_same_station_after_timeout(
        &self,
        ctx: &mut DecisionCtx<'_>,
    ) -> bool {
        match self {
            UserStrategy::Uninformed => false,
            UserStrategy::Random => ctx.rng.gen_bool(0.5),
            UserStrategy::Obedient(_) | UserStrategy::AvailableResources(_) => {
                Self::far_from_destination(ctx)
            }
            UserStrategy::DistanceRestriction(_)
            | UserStrategy::Tourist(_)
            | UserStrategy::Weigher(_) => {
                Self::far_from_destination(ctx) && ctx.rng.gen_bool(0.5)
            }
        }
    }

    pub fn decides_to_reserve_bike_at_new_decided_station(
        &self,
        ctx: &mut DecisionCtx<'_>,
    ) -> bool {
        match self {
            UserStrategy::Uninformed => false,
            UserStrategy::Random => ctx.rng.gen_bool(0.5),
            UserStrategy::Obedient(_) | UserStrategy::AvailableResources(_) => true,
            UserStrategy::DistanceRestriction(_) => ctx.rng.gen_bool(0.5),
            UserStrategy::Tourist(params) => {
                ctx.rng.gen_range(0..100) < params.bike_reservation_pct
            }
            UserStrategy::Weigher(params) => ctx.rng.gen_range(0..100) < params.reservation_pct,
        }
    }

    pub fn decides_to_reserve_slot_at_same_station_after_timeout(
        &self,
        ctx: &mut DecisionCtx<'_>,
    ) -> bool {
        match self {
            UserStrategy::Uninformed => false,
            UserStrategy::Random => ctx.rng.gen_bool(0.5),
            UserStrategy::Obedient(_) | UserStrategy::AvailableResources(_) => {
                Self::far_from_destination(ctx)
            }
            UserStrategy::DistanceRestriction(_)
            | UserStrategy::Tourist(_)
            | UserStrategy::Weigher(_) => Self::far_from_destination(ctx),
        }
    }

    pub fn decides_to_reserve_slot_at_new_decided_station(
        &self,
        ctx: &mut DecisionCtx<'_>,
    ) -> bool {
        match self {
            UserStrategy::Uninformed => false,
            UserStrategy::Random => ctx.rng.gen_bool(0.5),
            UserStrategy::Obedient(_) | UserStrategy::AvailableResources(_) => true,
            UserStrategy::DistanceRestriction(_) => ctx.rng.gen_bool(0.5),
            UserStrategy::Tourist(params) => {
                ctx.rng.gen_range(0..100) < params.slot_reservation_pct
            }
            UserStrategy::Weigher(params) => ctx.rng.gen_range(0..100) < params.reservation_pct,
        }
    }

    /// Non-station waypoint to ride to after renting.
    pub fn decides_next_point(&self, ctx: &mut DecisionCtx<'_>) -> LatLng {
        match self {
            UserStrategy::Tourist(_) | UserStrategy::Uninformed => ctx
                .return_anchor
                .unwrap_or_else(|| ctx.bounds.random_point(ctx.rng)),
            _ => ctx.bounds.random_point(ctx.rng),
        }
    }

    /// Whether to head straight to a return station after renting.
    pub fn decides_to_return_bike_directly(&self, ctx: &mut DecisionCtx<'_>) -> bool {
        match self {
            UserStrategy::Obedient(_) | UserStrategy::AvailableResources(_) => true,
            UserStrategy::Tourist(_) => false,
            _ => ctx.rng.gen_bool(0.5),
        }
    }

    pub fn decides_to_determine_other_station_after_timeout(
        &self,
        ctx: &mut DecisionCtx<'_>,
    ) -> bool {
        match self {
            UserStrategy::Obedient(_)
            | UserStrategy::AvailableResources(_)
            | UserStrategy::Weigher(_) => true,
            UserStrategy::Tourist(params) => {
                ctx.rng.gen_range(0..100) < params.switch_station_pct
            }
            _ => ctx.rng.gen_bool(0.5),
        }
    }

    pub fn decides_to_determine_other_station_after_failed_reservation(
        &self,
        ctx: &mut DecisionCtx<'_>,
    ) -> bool {
        match self {
            UserStrategy::Obedient(_)
            | UserStrategy::AvailableResources(_)
            | UserStrategy::Weigher(_) => true,
            UserStrategy::Tourist(params) => {
                ctx.rng.gen_range(0..100) < params.switch_station_pct
            }
            _ => ctx.rng.gen_bool(0.5),
        }
    }

    /// Picks one of the candidate routes; fails when the list is empty.
    pub fn determine_route<'r>(
        &self,
        routes: &'r [Route],
        rng: &mut StdRng,
    ) -> Result<&'r Route, RouteError> {
        if routes.is_empty() {
            return Err(RouteError::NoCandidates);
        }
        let index = match self {
            // Candidates come shortest-first; the tourist stretches the trip.
            UserStrategy::Tourist(_) => routes.len() - 1,
            UserStrategy::Random => rng.gen_range(0..routes.len()),
            _ => 0,
        };
        Ok(&routes[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

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

    struct Fixture {
        memory: UserMemory,
        stations: Vec<StationSnapshot>,
        recommender: RecommendationSystem,
        bounds: BoundingBox,
        rng: StdRng,
    }

    impl Fixture {
        fn new(stations: Vec<StationSnapshot>) -> Self {
            Self {
                memory: UserMemory::default(),
                stations,
                recommender: RecommendationSystem::default(),
                bounds: BoundingBox::default(),
                rng: StdRng::seed_from_u64(42),
            }
        }

        fn ctx(&mut self, position: LatLng) -> DecisionCtx<'_> {
            DecisionCtx {
                now: 0,
                position,
                return_anchor: None,
                memory: &self.memory,
                stations: &self.stations,
                recommender: &self.recommender,
                bounds: &self.bounds,
                arrival_time_secs: None,
                rng: &mut self.rng,
            }
        }
    }

    #[test]
    fn obedient_picks_the_top_recommendation() {
        let near = snapshot(1, 40.421, -3.700, 2, 2);
        let far = snapshot(2, 40.425, -3.700, 5, 0);
        let mut fixture = Fixture::new(vec![far, near]);
        let mut rng = StdRng::seed_from_u64(1);
        let strategy = UserStrategy::from_tag(UserTypeTag::Obedient, &mut rng);
        let mut ctx = fixture.ctx(point(40.420, -3.700));
        assert_eq!(
            strategy.determine_station_to_rent_bike(&mut ctx),
            Some(near.entity)
        );
    }

    #[test]
    fn available_resources_prefers_the_fullest_station() {
        let near_scarce = snapshot(1, 40.421, -3.700, 1, 5);
        let stocked = snapshot(2, 40.424, -3.700, 6, 0);
        let mut fixture = Fixture::new(vec![near_scarce, stocked]);
        let mut rng = StdRng::seed_from_u64(1);
        let strategy = UserStrategy::from_tag(UserTypeTag::AvailableResources, &mut rng);
        let mut ctx = fixture.ctx(point(40.420, -3.700));
        assert_eq!(
            strategy.determine_station_to_rent_bike(&mut ctx),
            Some(stocked.entity)
        );
    }

    #[test]
    fn uninformed_ignores_availability_but_remembers_failures() {
        let near_empty = snapshot(1, 40.421, -3.700, 0, 5);
        let far = snapshot(2, 40.424, -3.700, 3, 2);
        let mut fixture = Fixture::new(vec![near_empty, far]);
        let strategy = UserStrategy::uninformed();

        let mut ctx = fixture.ctx(point(40.420, -3.700));
        assert_eq!(
            strategy.determine_station_to_rent_bike(&mut ctx),
            Some(near_empty.entity),
            "the naive user walks to the nearest station even when empty"
        );

        fixture.memory.update(
            crate::memory::MemoryFact::BikesUnavailable(near_empty.entity),
            10,
        );
        let mut ctx = fixture.ctx(point(40.420, -3.700));
        assert_eq!(
            strategy.determine_station_to_rent_bike(&mut ctx),
            Some(far.entity),
            "a failed rental rules the station out"
        );
    }

    #[test]
    fn uninformed_never_reserves() {
        let mut fixture = Fixture::new(vec![snapshot(1, 40.421, -3.700, 2, 2)]);
        let strategy = UserStrategy::uninformed();
        let mut ctx = fixture.ctx(point(40.420, -3.700));
        assert!(!strategy.decides_to_reserve_bike_at_new_decided_station(&mut ctx));
        assert!(!strategy.decides_to_reserve_slot_at_new_decided_station(&mut ctx));
    }

    #[test]
    fn tourist_picks_among_nearest_and_longest_route() {
        let stations: Vec<StationSnapshot> = (0u32..5)
            .map(|i| snapshot(i, 40.420 + f64::from(i) * 0.001, -3.700, 2, 2))
            .collect();
        let mut fixture = Fixture::new(stations.clone());
        let mut rng = StdRng::seed_from_u64(9);
        let strategy = UserStrategy::from_tag(UserTypeTag::Tourist, &mut rng);

        for _ in 0..20 {
            let mut ctx = fixture.ctx(point(40.4195, -3.700));
            let chosen = strategy
                .determine_station_to_rent_bike(&mut ctx)
                .expect("station");
            let pool: Vec<Entity> = stations[..3].iter().map(|s| s.entity).collect();
            assert!(pool.contains(&chosen), "tourist left the nearest-3 pool");
        }

        let short = Route::new(vec![point(40.42, -3.70), point(40.421, -3.70)]).expect("route");
        let long =
            Route::new(vec![point(40.42, -3.70), point(40.43, -3.71), point(40.421, -3.70)])
                .expect("route");
        let routes = vec![short, long.clone()];
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(strategy.determine_route(&routes, &mut rng).expect("route"), &long);
    }

    #[test]
    fn determine_route_fails_on_empty_candidates() {
        let strategy = UserStrategy::uninformed();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            strategy.determine_route(&[], &mut rng).err(),
            Some(RouteError::NoCandidates)
        );
    }

    #[test]
    fn patience_counters_trigger_leaving() {
        let mut fixture = Fixture::new(vec![snapshot(1, 40.421, -3.700, 2, 2)]);
        let strategy = UserStrategy::Obedient(Patience {
            min_reservation_timeouts: 2,
            min_reservation_attempts: 3,
            min_resource_failures: 2,
        });

        let mut ctx = fixture.ctx(point(40.420, -3.700));
        assert!(!strategy.decides_to_leave_system_after_timeout(&mut ctx));

        fixture
            .memory
            .update(crate::memory::MemoryFact::BikeReservationTimeout, 1);
        fixture
            .memory
            .update(crate::memory::MemoryFact::SlotReservationTimeout, 2);
        let mut ctx = fixture.ctx(point(40.420, -3.700));
        assert!(strategy.decides_to_leave_system_after_timeout(&mut ctx));
    }

    #[test]
    fn random_leaves_once_every_station_was_tried() {
        let a = snapshot(1, 40.421, -3.700, 0, 2);
        let b = snapshot(2, 40.422, -3.700, 0, 2);
        let mut fixture = Fixture::new(vec![a, b]);
        let strategy = UserStrategy::Random;

        fixture
            .memory
            .update(crate::memory::MemoryFact::FailedBikeReservation(a.entity), 0);
        let mut ctx = fixture.ctx(point(40.420, -3.700));
        assert!(!UserStrategy::every_station_tried(&ctx));
        drop(ctx);

        fixture
            .memory
            .update(crate::memory::MemoryFact::FailedBikeReservation(b.entity), 0);
        let mut ctx = fixture.ctx(point(40.420, -3.700));
        assert!(strategy.decides_to_leave_system_after_failed_reservation(&mut ctx));
    }
}
