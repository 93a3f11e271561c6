use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::routing::RouteProviderKind;
use crate::spatial::BoundingBox;
use crate::strategies::UserTypeTag;

/// Default hold on a reserved bike or slot, in seconds.
pub const DEFAULT_RESERVATION_VALIDITY_SECS: u64 = 180;

/// Default simulated horizon: one hour.
pub const DEFAULT_TOTAL_TIME_SECS: u64 = 3_600;

/// How long a reservation holds its resource before expiring.
#[derive(Debug, Clone, Copy, Resource)]
pub struct ReservationValiditySecs(pub u64);

/// The area users and waypoints are generated in.
#[derive(Debug, Clone, Copy, Resource)]
pub struct SimulationBounds(pub BoundingBox);

/// Half-open window `[start, end)` of simulated seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: u64,
    pub end: u64,
}

impl TimeRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn contains(&self, instant: u64) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// One station as consumed from the already-parsed configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    pub latitude: f64,
    pub longitude: f64,
    pub capacity: usize,
    pub initial_bikes: usize,
}

/// A source of initial `UserAppears` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EntryPoint {
    /// A single user appearing at a fixed instant and position.
    Single {
        instant: u64,
        latitude: f64,
        longitude: f64,
        user_type: UserTypeTag,
        /// Optional final (non-station) destination in the city.
        #[serde(default)]
        destination: Option<(f64, f64)>,
    },
    /// Users appearing with exponential inter-arrival times (Poisson
    /// process), optionally scattered within `radius_m` of the anchor and
    /// limited to an active time window.
    Poisson {
        rate_per_sec: f64,
        latitude: f64,
        longitude: f64,
        user_type: UserTypeTag,
        #[serde(default)]
        radius_m: Option<f64>,
        #[serde(default)]
        time_range: Option<TimeRange>,
        #[serde(default)]
        max_users: Option<usize>,
    },
}

/// Configuration/input errors, surfaced before the scheduler starts.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A station declares more initial bikes than slots.
    StationOverCapacity { index: usize },
    /// A Poisson entry point declares a non-positive rate.
    NonPositiveRate { index: usize },
    /// A time range ends before it starts.
    EmptyTimeRange { index: usize },
    /// A latitude/longitude pair outside the valid range.
    InvalidCoordinates { index: usize },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::StationOverCapacity { index } => {
                write!(f, "station #{index} declares more initial bikes than capacity")
            }
            ConfigError::NonPositiveRate { index } => {
                write!(f, "entry point #{index} declares a non-positive arrival rate")
            }
            ConfigError::EmptyTimeRange { index } => {
                write!(f, "entry point #{index} declares an empty time range")
            }
            ConfigError::InvalidCoordinates { index } => {
                write!(f, "entry #{index} declares coordinates outside the valid range")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parameters for building a simulation scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationParams {
    pub seed: u64,
    /// Entry points stop producing users at this horizon.
    pub total_time_secs: u64,
    pub reservation_validity_secs: u64,
    /// Walking distance the recommendation system considers.
    pub max_recommendation_distance_m: f64,
    pub bounds: BoundingBox,
    pub stations: Vec<StationConfig>,
    pub entry_points: Vec<EntryPoint>,
    pub route_provider_kind: RouteProviderKind,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            seed: 0,
            total_time_secs: DEFAULT_TOTAL_TIME_SECS,
            reservation_validity_secs: DEFAULT_RESERVATION_VALIDITY_SECS,
            max_recommendation_distance_m: 1_500.0,
            bounds: BoundingBox::default(),
            stations: Vec::new(),
            entry_points: Vec::new(),
            route_provider_kind: RouteProviderKind::default(),
        }
    }
}

impl SimulationParams {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_total_time_secs(mut self, total_time_secs: u64) -> Self {
        self.total_time_secs = total_time_secs;
        self
    }

    pub fn with_reservation_validity_secs(mut self, validity: u64) -> Self {
        self.reservation_validity_secs = validity;
        self
    }

    pub fn with_station(mut self, station: StationConfig) -> Self {
        self.stations.push(station);
        self
    }

    pub fn with_entry_point(mut self, entry_point: EntryPoint) -> Self {
        self.entry_points.push(entry_point);
        self
    }

    pub fn with_route_provider(mut self, kind: RouteProviderKind) -> Self {
        self.route_provider_kind = kind;
        self
    }

    /// Parsing and schema validation are external; this only re-checks the
    /// constraints the core relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, station) in self.stations.iter().enumerate() {
            if station.initial_bikes > station.capacity {
                return Err(ConfigError::StationOverCapacity { index });
            }
        }
        for (index, entry_point) in self.entry_points.iter().enumerate() {
            if let EntryPoint::Poisson {
                rate_per_sec,
                time_range,
                ..
            } = entry_point
            {
                if *rate_per_sec <= 0.0 {
                    return Err(ConfigError::NonPositiveRate { index });
                }
                if let Some(range) = time_range {
                    if range.duration() == 0 {
                        return Err(ConfigError::EmptyTimeRange { index });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn over_capacity_station_is_rejected() {
        let params = SimulationParams::default().with_station(StationConfig {
            latitude: 40.42,
            longitude: -3.70,
            capacity: 2,
            initial_bikes: 3,
        });
        assert_eq!(
            params.validate(),
            Err(ConfigError::StationOverCapacity { index: 0 })
        );
    }

    #[test]
    fn poisson_rate_must_be_positive() {
        let params = SimulationParams::default().with_entry_point(EntryPoint::Poisson {
            rate_per_sec: 0.0,
            latitude: 40.42,
            longitude: -3.70,
            user_type: UserTypeTag::Random,
            radius_m: None,
            time_range: None,
            max_users: None,
        });
        assert_eq!(params.validate(), Err(ConfigError::NonPositiveRate { index: 0 }));
    }

    #[test]
    fn params_round_trip_as_json() {
        let params = SimulationParams::default()
            .with_seed(7)
            .with_station(StationConfig {
                latitude: 40.42,
                longitude: -3.70,
                capacity: 10,
                initial_bikes: 5,
            })
            .with_entry_point(EntryPoint::Single {
                instant: 30,
                latitude: 40.43,
                longitude: -3.71,
                user_type: UserTypeTag::Tourist,
                destination: Some((40.44, -3.72)),
            });
        let json = serde_json::to_string(&params).expect("serialize");
        let back: SimulationParams = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.seed, 7);
        assert_eq!(back.stations, params.stations);
        assert_eq!(back.entry_points, params.entry_points);
    }
}
