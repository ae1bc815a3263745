//! # Geohash Proximity Utilities
//!
//! Geohash-based closeness and radius containment shared by the clustering and
//! recommendation engines.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`are_close`] | Two geohashes share the first `P` characters |
//! | [`common_prefix_len`] | Ordinal proximity: length of the shared prefix |
//! | [`is_within_radius`] | Two-phase (cell then great-circle) radius test |
//! | [`haversine_distance`] | Great-circle distance between two GPS points |
//! | [`encode_geohash`] / [`decode_geohash`] | Conversions to and from [`GpsPoint`] |
//!
//! ## Example
//!
//! ```rust
//! use nearby_engine::geo_utils::{self, ProximityConfig};
//!
//! assert!(geo_utils::are_close("9h9j4", "9h9j5", 4));
//! assert!(!geo_utils::are_close("9h9j4", "9h9k4", 4));
//! assert_eq!(geo_utils::common_prefix_len("9h9j4", "9h9k4"), 3);
//!
//! let config = ProximityConfig::default();
//! let inside = config.is_within_radius("9h9j4", "9h9j4", 1.0, |_, _| 0.0);
//! assert_eq!(inside, Some(true));
//! ```
//!
//! ## Algorithm Notes
//!
//! "Close" is an approximation: two hashes are the same place when they fall
//! in the same cell at resolution `P`. Points either side of a cell boundary
//! are never close, however near they are physically.
//!
//! The radius test first picks the coarsest resolution whose smallest cell
//! dimension still bounds the requested radius, so that any point within the
//! radius must lie in the center's cell or one of its 8 neighbors. Only those
//! candidates are decoded and measured.

use geo::{Coord, Distance, Haversine, Point};
use log::{debug, warn};

use crate::GpsPoint;

/// Meters in one statute mile.
pub const METERS_PER_MILE: f64 = 1609.344;

/// One row of the radius lookup table: requests up to `radius_miles` are
/// answered by comparing cells at `resolution` characters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RadiusResolution {
    pub radius_miles: f64,
    pub resolution: usize,
}

impl RadiusResolution {
    pub const fn new(radius_miles: f64, resolution: usize) -> Self {
        Self { radius_miles, resolution }
    }
}

/// Configuration for geohash proximity checks.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProximityConfig {
    /// Number of leading characters two geohashes must share to be "close".
    /// Default: 8 (a cell of roughly 38m x 19m)
    pub close_prefix_len: usize,

    /// Precision used when encoding place coordinates.
    /// Default: 9
    pub place_precision: usize,

    /// Radius lookup table. Each radius is the smallest cell dimension at that
    /// resolution, rounded down.
    pub radius_table: Vec<RadiusResolution>,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            close_prefix_len: 8,
            place_precision: 9,
            radius_table: vec![
                RadiusResolution::new(3100.0, 1),
                RadiusResolution::new(387.0, 2),
                RadiusResolution::new(96.0, 3),
                RadiusResolution::new(12.0, 4),
                RadiusResolution::new(3.0, 5),
                RadiusResolution::new(0.37, 6),
                RadiusResolution::new(0.09, 7),
                RadiusResolution::new(0.011, 8),
            ],
        }
    }
}

impl ProximityConfig {
    /// Whether two geohashes are the same place at the configured prefix length.
    #[inline]
    pub fn are_close(&self, a: &str, b: &str) -> bool {
        are_close(a, b, self.close_prefix_len)
    }

    /// Radius test using the configured table and a caller-supplied distance
    /// function (meters). See [`is_within_radius`].
    pub fn is_within_radius<F>(
        &self,
        center: &str,
        hash: &str,
        radius_miles: f64,
        distance_fn: F,
    ) -> Option<bool>
    where
        F: Fn(&GpsPoint, &GpsPoint) -> f64,
    {
        is_within_radius(center, hash, radius_miles, &self.radius_table, distance_fn)
    }
}

// =============================================================================
// Prefix Functions
// =============================================================================

/// Leading `len` characters of a geohash (the whole hash if it is shorter).
#[inline]
pub fn truncate(hash: &str, len: usize) -> &str {
    match hash.char_indices().nth(len) {
        Some((idx, _)) => &hash[..idx],
        None => hash,
    }
}

/// True iff the first `prefix_len` characters of both hashes match.
///
/// # Example
///
/// ```rust
/// use nearby_engine::geo_utils::are_close;
///
/// assert!(are_close("9q8yyk8yt", "9q8yyk8yv", 8));
/// assert!(!are_close("9q8yyk8yt", "9q8yyk9yt", 8));
/// ```
#[inline]
pub fn are_close(a: &str, b: &str, prefix_len: usize) -> bool {
    truncate(a, prefix_len) == truncate(b, prefix_len)
}

/// Length of the longest common prefix of two geohashes.
///
/// Higher means physically closer. This is an ordinal proxy, not a metric.
pub fn common_prefix_len(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
}

// =============================================================================
// Radius Containment
// =============================================================================

/// Resolution to compare cells at for a requested radius.
///
/// Picks the smallest configured radius that is still `>= radius_miles`.
/// Returns `None` when no row is large enough.
pub fn resolution_for_radius(radius_miles: f64, table: &[RadiusResolution]) -> Option<usize> {
    table
        .iter()
        .filter(|row| row.radius_miles >= radius_miles)
        .min_by(|a, b| a.radius_miles.total_cmp(&b.radius_miles))
        .map(|row| row.resolution)
}

/// Check whether `hash` lies within `radius_miles` of `center`.
///
/// Two-phase filter:
/// 1. Truncate both hashes to the resolution chosen by
///    [`resolution_for_radius`]. The point is *possibly within* when the
///    truncated cells are equal or `hash`'s cell is one of the 8 neighbors of
///    `center`'s cell.
/// 2. Only for possible matches, decode both hashes and compare
///    `distance_fn(center, point)` (meters) against the radius.
///
/// # Returns
///
/// - `Some(true)` / `Some(false)` for a supported radius
/// - `None` when the radius exceeds every row of the table; the caller should
///   fall back to a supported radius
/// - `None` when either hash is shorter than the chosen resolution, since
///   there is no cell to compare at that resolution
///
/// Hashes that cannot be decoded are reported as `Some(false)`.
pub fn is_within_radius<F>(
    center: &str,
    hash: &str,
    radius_miles: f64,
    table: &[RadiusResolution],
    distance_fn: F,
) -> Option<bool>
where
    F: Fn(&GpsPoint, &GpsPoint) -> f64,
{
    let resolution = resolution_for_radius(radius_miles, table)?;
    if center.chars().count() < resolution || hash.chars().count() < resolution {
        debug!(
            "Geohash pair ({}, {}) is coarser than resolution {}",
            center, hash, resolution
        );
        return None;
    }

    let center_cell = truncate(center, resolution);
    let hash_cell = truncate(hash, resolution);

    let possibly_within = center_cell == hash_cell || is_neighbor_cell(center_cell, hash_cell);
    if !possibly_within {
        return Some(false);
    }

    let (Some(center_point), Some(point)) = (decode_geohash(center), decode_geohash(hash)) else {
        warn!(
            "Cannot decode geohash pair ({}, {}) for radius check",
            center, hash
        );
        return Some(false);
    };

    let meters = distance_fn(&center_point, &point);
    Some(meters <= radius_miles * METERS_PER_MILE)
}

/// [`is_within_radius`] with [`haversine_distance`] as the distance function.
pub fn is_within_radius_haversine(
    center: &str,
    hash: &str,
    radius_miles: f64,
    table: &[RadiusResolution],
) -> Option<bool> {
    is_within_radius(center, hash, radius_miles, table, haversine_distance)
}

fn is_neighbor_cell(center_cell: &str, cell: &str) -> bool {
    match geohash::neighbors(center_cell) {
        Ok(n) => [&n.n, &n.ne, &n.e, &n.se, &n.s, &n.sw, &n.w, &n.nw]
            .iter()
            .any(|neighbor| neighbor.as_str() == cell),
        Err(e) => {
            warn!("Cannot compute neighbors of {}: {}", center_cell, e);
            false
        }
    }
}

// =============================================================================
// Encoding and Distance
// =============================================================================

/// Encode a GPS point as a geohash of `precision` characters.
///
/// Returns `None` for out-of-range coordinates.
pub fn encode_geohash(point: &GpsPoint, precision: usize) -> Option<String> {
    if !point.is_valid() {
        return None;
    }
    let coord = Coord {
        x: point.longitude,
        y: point.latitude,
    };
    geohash::encode(coord, precision).ok()
}

/// Decode a geohash to the center of its cell.
pub fn decode_geohash(hash: &str) -> Option<GpsPoint> {
    geohash::decode(hash)
        .ok()
        .map(|(coord, _, _)| GpsPoint::new(coord.y, coord.x))
}

/// Calculate the great-circle distance between two GPS points in meters.
///
/// ```rust
/// use nearby_engine::{GpsPoint, geo_utils};
///
/// let london = GpsPoint::new(51.5074, -0.1278);
/// let paris = GpsPoint::new(48.8566, 2.3522);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 1000.0);
/// ```
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_are_close_prefix() {
        assert!(are_close("9h9j4", "9h9j5", 4));
        assert!(!are_close("9h9j4", "9h9k4", 4));
        assert!(are_close("9h9j4", "9h9j4", 8));
    }

    #[test]
    fn test_are_close_short_hash() {
        // A hash shorter than P only matches an identical hash
        assert!(!are_close("9h9", "9h9j4", 4));
        assert!(are_close("9h9", "9h9", 4));
    }

    #[test]
    fn test_common_prefix_len() {
        assert_eq!(common_prefix_len("9q8yyk", "9q8yyz"), 5);
        assert_eq!(common_prefix_len("9q8yyk", "dr5reg"), 0);
        assert_eq!(common_prefix_len("9q8", "9q8yyk"), 3);
        assert_eq!(common_prefix_len("", "9q8"), 0);
    }

    #[test]
    fn test_resolution_for_radius() {
        let table = ProximityConfig::default().radius_table;
        assert_eq!(resolution_for_radius(1.0, &table), Some(5));
        assert_eq!(resolution_for_radius(3.0, &table), Some(5));
        assert_eq!(resolution_for_radius(0.05, &table), Some(7));
        assert_eq!(resolution_for_radius(50.0, &table), Some(3));
        assert_eq!(resolution_for_radius(10_000.0, &table), None);
    }

    #[test]
    fn test_within_radius_same_cell() {
        let config = ProximityConfig::default();
        let within = config.is_within_radius("9h9j4", "9h9j4", 1.0, |_, _| 0.0);
        assert_eq!(within, Some(true));
    }

    #[test]
    fn test_within_radius_unsupported() {
        let config = ProximityConfig::default();
        let within = config.is_within_radius("9h9j4", "9h9j4", 5000.0, |_, _| 0.0);
        assert_eq!(within, None);
    }

    #[test]
    fn test_within_radius_hash_coarser_than_resolution() {
        let config = ProximityConfig::default();
        // 0.01 miles needs 8 characters
        assert_eq!(
            config.is_within_radius("9h9j4", "9h9j4", 0.01, |_, _| 0.0),
            None
        );
        assert_eq!(
            config.is_within_radius("9h9j4bcd", "9h9j4", 0.01, |_, _| 0.0),
            None
        );
        assert_eq!(
            config.is_within_radius("9h9j4bcd", "9h9j4bcd", 0.01, |_, _| 0.0),
            Some(true)
        );
    }

    #[test]
    fn test_within_radius_far_cell_skips_distance() {
        let config = ProximityConfig::default();
        let result = config.is_within_radius("9q8yyk", "dr5reg", 1.0, |_, _| {
            panic!("distance must not be computed for faraway cells")
        });
        assert_eq!(result, Some(false));
    }

    #[test]
    fn test_within_radius_neighbor_cell() {
        let config = ProximityConfig::default();
        let center = "9q8yy";
        let east = geohash::neighbors(center).unwrap().e;
        let check = |meters: f64| config.is_within_radius(center, &east, 3.0, |_, _| meters);
        assert_eq!(check(100.0), Some(true));
        assert_eq!(check(1.0e6), Some(false));
    }

    #[test]
    fn test_within_radius_haversine() {
        let config = ProximityConfig::default();
        let a = encode_geohash(&GpsPoint::new(37.7749, -122.4194), 9).unwrap();
        let b = encode_geohash(&GpsPoint::new(37.7760, -122.4180), 9).unwrap();
        let table = &config.radius_table;
        assert_eq!(is_within_radius_haversine(&a, &b, 1.0, table), Some(true));
        assert_eq!(is_within_radius_haversine(&a, &b, 0.05, table), Some(false));
    }

    #[test]
    fn test_encode_decode() {
        let point = GpsPoint::new(57.64911, 10.40744);
        let hash = encode_geohash(&point, 11).unwrap();
        assert_eq!(hash, "u4pruydqqvj");

        let decoded = decode_geohash(&hash).unwrap();
        assert!(approx_eq(decoded.latitude, point.latitude, 1e-4));
        assert!(approx_eq(decoded.longitude, point.longitude, 1e-4));
    }

    #[test]
    fn test_encode_invalid_point() {
        assert!(encode_geohash(&GpsPoint::new(95.0, 0.0), 8).is_none());
        assert!(decode_geohash("not-a-hash!").is_none());
    }

    #[test]
    fn test_haversine_distance_same_point() {
        let p = GpsPoint::new(51.5074, -0.1278);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }
}
