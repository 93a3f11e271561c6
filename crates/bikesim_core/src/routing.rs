//! Pluggable route providers: trait abstraction for routing backends.
//!
//! Two implementations, selectable via [`RouteProviderKind`]:
//!
//! - **`GreatCircleRouteProvider`**: a single haversine segment.
//! - **`H3GridRouteProvider`**: a path along H3 grid cell centers, with the
//!   direct segment offered as an alternative route.
//!
//! The provider is stored as a `Box<dyn RouteProvider>` ECS resource and
//! queried by the event systems to obtain travel times and the candidate
//! routes handed to `determine_route`.

use bevy_ecs::prelude::Resource;
use h3o::LatLng;
use serde::{Deserialize, Serialize};

use crate::spatial::{distance_m, grid_path_cells_cached, reached_point, to_cell};

/// Route computation failures. Recovered locally: the requesting event treats
/// them as "no destination reachable" and falls back to the agent's
/// leave-system decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    /// The backend could not produce a path between the points.
    NoRouteFound,
    /// A route was requested from an empty candidate list.
    NoCandidates,
}

impl std::fmt::Display for RouteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteError::NoRouteFound => write!(f, "no route found between the points"),
            RouteError::NoCandidates => write!(f, "no candidate routes to choose from"),
        }
    }
}

impl std::error::Error for RouteError {}

/// A concrete path between two points, as an ordered list of waypoints.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    points: Vec<LatLng>,
    total_distance_m: f64,
}

impl Route {
    /// Builds a route from at least two waypoints (start and end may coincide).
    pub fn new(points: Vec<LatLng>) -> Result<Self, RouteError> {
        if points.len() < 2 {
            return Err(RouteError::NoRouteFound);
        }
        let total_distance_m = points
            .windows(2)
            .map(|pair| distance_m(pair[0], pair[1]))
            .sum();
        Ok(Self {
            points,
            total_distance_m,
        })
    }

    pub fn points(&self) -> &[LatLng] {
        &self.points
    }

    pub fn start(&self) -> LatLng {
        self.points[0]
    }

    pub fn end(&self) -> LatLng {
        self.points[self.points.len() - 1]
    }

    pub fn distance_m(&self) -> f64 {
        self.total_distance_m
    }

    /// Whole seconds needed to travel the route at `velocity_ms` (truncated,
    /// matching `time = distance / velocity` on integer clocks).
    pub fn travel_time_secs(&self, velocity_ms: f64) -> u64 {
        if velocity_ms <= 0.0 {
            return 0;
        }
        (self.total_distance_m / velocity_ms) as u64
    }

    /// Position reached after travelling for `secs` at `velocity_ms`, walking
    /// the waypoints in order. Clamps to the route end.
    pub fn position_after(&self, secs: u64, velocity_ms: f64) -> LatLng {
        let mut remaining = secs as f64 * velocity_ms;
        for pair in self.points.windows(2) {
            let segment = distance_m(pair[0], pair[1]);
            if remaining < segment {
                return reached_point(pair[0], pair[1], remaining);
            }
            remaining -= segment;
        }
        self.end()
    }
}

/// Trait for routing backends. Implementations must be `Send + Sync` so the
/// provider can be stored as a shared ECS resource.
pub trait RouteProvider: Send + Sync {
    /// The shortest route between two points.
    fn shortest_route(&self, from: LatLng, to: LatLng) -> Result<Route, RouteError>;

    /// All candidate routes, shortest first.
    fn all_routes(&self, from: LatLng, to: LatLng) -> Result<Vec<Route>, RouteError> {
        self.shortest_route(from, to).map(|route| vec![route])
    }

    fn has_alternatives(&self, from: LatLng, to: LatLng) -> bool {
        self.all_routes(from, to)
            .map(|routes| routes.len() > 1)
            .unwrap_or(false)
    }
}

/// ECS resource wrapping a boxed route provider.
#[derive(Resource)]
pub struct RouteProviderResource(pub Box<dyn RouteProvider>);

/// Which routing backend to use. Stored in the simulation parameters so a
/// parameter set round-trips as JSON.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum RouteProviderKind {
    /// Straight-line haversine segment between the points.
    GreatCircle,
    /// Path along H3 grid cell centers, direct segment as alternative.
    #[default]
    H3Grid,
}

pub fn build_route_provider(kind: &RouteProviderKind) -> Box<dyn RouteProvider> {
    match kind {
        RouteProviderKind::GreatCircle => Box::new(GreatCircleRouteProvider),
        RouteProviderKind::H3Grid => Box::new(H3GridRouteProvider),
    }
}

/// Single haversine segment; never fails.
pub struct GreatCircleRouteProvider;

impl RouteProvider for GreatCircleRouteProvider {
    fn shortest_route(&self, from: LatLng, to: LatLng) -> Result<Route, RouteError> {
        Route::new(vec![from, to])
    }
}

/// Routes along the H3 hexagonal grid; the grid path approximates a street
/// network and is slightly longer than the direct segment.
pub struct H3GridRouteProvider;

impl H3GridRouteProvider {
    fn grid_route(&self, from: LatLng, to: LatLng) -> Option<Route> {
        let cells = grid_path_cells_cached(to_cell(from), to_cell(to))?;
        let mut points = Vec::with_capacity(cells.len() + 2);
        points.push(from);
        points.extend(cells.into_iter().map(LatLng::from));
        points.push(to);
        Route::new(points).ok()
    }
}

impl RouteProvider for H3GridRouteProvider {
    fn shortest_route(&self, from: LatLng, to: LatLng) -> Result<Route, RouteError> {
        let mut routes = self.all_routes(from, to)?;
        Ok(routes.remove(0))
    }

    fn all_routes(&self, from: LatLng, to: LatLng) -> Result<Vec<Route>, RouteError> {
        let direct = Route::new(vec![from, to])?;
        let mut routes = vec![direct];
        if let Some(grid) = self.grid_route(from, to) {
            if grid.points() != routes[0].points() {
                routes.push(grid);
            }
        }
        routes.sort_by(|a, b| {
            a.distance_m()
                .partial_cmp(&b.distance_m())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(routes)
    }
}
