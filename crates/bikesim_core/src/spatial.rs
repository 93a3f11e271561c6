//! Spatial operations: haversine distances, bounded random points and cached
//! H3 grid paths.
//!
//! Positions are `h3o::LatLng` pairs in degrees. Stations and users are
//! snapped onto the H3 grid at resolution 9 (~240m cells) when a grid path is
//! needed; everything else works on raw coordinates.

use std::num::NonZeroUsize;
use std::sync::{Mutex, OnceLock};

use h3o::{CellIndex, LatLng, Resolution};
use lru::LruCache;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// H3 resolution used to snap positions onto the grid (~240m cell size).
pub const GRID_RESOLUTION: Resolution = Resolution::Nine;

/// Haversine distance between two points in meters.
pub fn distance_m(a: LatLng, b: LatLng) -> f64 {
    let (lat1, lng1) = (a.lat().to_radians(), a.lng().to_radians());
    let (lat2, lng2) = (b.lat().to_radians(), b.lng().to_radians());
    let dlat = lat2 - lat1;
    let dlng = lng2 - lng1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlng = (dlng * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlng * sin_dlng;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Snap a position onto the H3 grid.
pub fn to_cell(point: LatLng) -> CellIndex {
    point.to_cell(GRID_RESOLUTION)
}

/// Point reached after travelling `travelled_m` meters from `from` towards
/// `to`, by linear interpolation in coordinate space. Clamps to `to` when the
/// travelled distance meets or exceeds the segment length.
pub fn reached_point(from: LatLng, to: LatLng, travelled_m: f64) -> LatLng {
    let total = distance_m(from, to);
    if total <= 0.0 || travelled_m >= total {
        return to;
    }
    let fraction = (travelled_m / total).clamp(0.0, 1.0);
    let lat = from.lat() + (to.lat() - from.lat()) * fraction;
    let lng = from.lng() + (to.lng() - from.lng()) * fraction;
    LatLng::new(lat, lng).expect("interpolation stays within valid coordinates")
}

/// Rectangular area users and waypoints are generated in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lng_min: f64,
    pub lng_max: f64,
}

impl BoundingBox {
    pub fn contains(&self, point: LatLng) -> bool {
        point.lat() >= self.lat_min
            && point.lat() <= self.lat_max
            && point.lng() >= self.lng_min
            && point.lng() <= self.lng_max
    }

    /// Uniformly random point inside the box.
    pub fn random_point<R: Rng>(&self, rng: &mut R) -> LatLng {
        let lat = rng.gen_range(self.lat_min..=self.lat_max);
        let lng = rng.gen_range(self.lng_min..=self.lng_max);
        LatLng::new(lat, lng).expect("bounding box holds valid coordinates")
    }
}

impl Default for BoundingBox {
    /// Madrid city center (approx), the original deployment area.
    fn default() -> Self {
        Self {
            lat_min: 40.38,
            lat_max: 40.48,
            lng_min: -3.75,
            lng_max: -3.62,
        }
    }
}

/// Uniformly random point within `radius_m` meters of `center`.
///
/// Radius is sqrt-distributed so points are uniform over the disk area, with
/// an equirectangular offset (fine at city scale).
pub fn random_point_in_circle<R: Rng>(center: LatLng, radius_m: f64, rng: &mut R) -> LatLng {
    let angle = rng.gen_range(0.0..std::f64::consts::TAU);
    let distance = radius_m * rng.gen::<f64>().sqrt();
    let dlat = (distance * angle.cos()) / EARTH_RADIUS_M;
    let dlng = (distance * angle.sin()) / (EARTH_RADIUS_M * center.lat().to_radians().cos());
    let lat = (center.lat() + dlat.to_degrees()).clamp(-90.0, 90.0);
    let lng = center.lng() + dlng.to_degrees();
    LatLng::new(lat, lng).expect("offset stays within valid coordinates")
}

/// Path cache for the grid route provider.
/// Only caches successful paths; failures are not cached (will retry, which is fine).
struct PathCache {
    cache: Mutex<LruCache<(CellIndex, CellIndex), Vec<CellIndex>>>,
}

impl PathCache {
    fn new() -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(5_000).expect("cache size must be non-zero"),
            )),
        }
    }

    fn get_or_compute(&self, from: CellIndex, to: CellIndex) -> Option<Vec<CellIndex>> {
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(_) => return Self::compute_path(from, to),
        };
        if let Some(cached) = cache.get(&(from, to)) {
            return Some(cached.clone());
        }
        let path = Self::compute_path(from, to);
        if let Some(cells) = &path {
            cache.put((from, to), cells.clone());
        }
        path
    }

    fn compute_path(from: CellIndex, to: CellIndex) -> Option<Vec<CellIndex>> {
        from.grid_path_cells(to).ok().and_then(|path| {
            let cells: Vec<CellIndex> = path.filter_map(|cell| cell.ok()).collect();
            if cells.is_empty() {
                None
            } else {
                Some(cells)
            }
        })
    }
}

static PATH_CACHE: OnceLock<PathCache> = OnceLock::new();

/// Cells along the H3 grid path between two cells, cached.
pub fn grid_path_cells_cached(from: CellIndex, to: CellIndex) -> Option<Vec<CellIndex>> {
    PATH_CACHE.get_or_init(PathCache::new).get_or_compute(from, to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn point(lat: f64, lng: f64) -> LatLng {
        LatLng::new(lat, lng).expect("valid point")
    }

    #[test]
    fn distance_is_symmetric_and_zero_on_self() {
        let a = point(40.42, -3.70);
        let b = point(40.43, -3.69);
        assert_eq!(distance_m(a, a), 0.0);
        let d1 = distance_m(a, b);
        let d2 = distance_m(b, a);
        assert!((d1 - d2).abs() < 1e-6);
        // ~1.4km between the two points
        assert!(d1 > 1_000.0 && d1 < 2_000.0);
    }

    #[test]
    fn reached_point_clamps_to_destination() {
        let a = point(40.42, -3.70);
        let b = point(40.43, -3.70);
        assert_eq!(reached_point(a, b, 1e9), b);
        let halfway = reached_point(a, b, distance_m(a, b) / 2.0);
        assert!((halfway.lat() - 40.425).abs() < 1e-6);
    }

    #[test]
    fn random_points_stay_in_bounds() {
        let bounds = BoundingBox::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert!(bounds.contains(bounds.random_point(&mut rng)));
        }
    }

    #[test]
    fn circle_points_stay_within_radius() {
        let center = point(40.42, -3.70);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let p = random_point_in_circle(center, 500.0, &mut rng);
            assert!(distance_m(center, p) <= 505.0, "point escaped the circle");
        }
    }

    #[test]
    fn grid_path_connects_endpoints() {
        let from = to_cell(point(40.42, -3.70));
        let to = to_cell(point(40.43, -3.69));
        let path = grid_path_cells_cached(from, to).expect("path");
        assert_eq!(path.first(), Some(&from));
        assert_eq!(path.last(), Some(&to));
    }
}
