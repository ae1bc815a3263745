//! Grouping of active users into location clusters.
//!
//! A single pass over the locations: each one joins the first existing
//! cluster whose representative geohash is close to it, or starts a new one.
//! Representatives are fixed at creation and clusters are never merged, so two
//! clusters whose representatives straddle a cell boundary stay separate.

use log::debug;

use crate::geo_utils::{self, ProximityConfig};
use crate::{UserGeohash, UserId};

/// Users that are at the same place.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct LocationCluster {
    /// Geohash of the first location seen for this cluster
    pub geohash: String,
    /// Members in discovery order
    pub user_ids: Vec<UserId>,
}

/// Group locations into clusters of close geohashes.
///
/// Clusters are returned in order of first-seen location. Every input
/// location lands in exactly one cluster. O(n·k) for k clusters.
///
/// # Example
/// ```
/// use nearby_engine::{find_clusters, ProximityConfig, UserGeohash};
///
/// let config = ProximityConfig {
///     close_prefix_len: 4,
///     ..ProximityConfig::default()
/// };
/// let clusters = find_clusters(
///     &[UserGeohash::new("a", "9h9j4"), UserGeohash::new("b", "dr5re")],
///     &config,
/// );
/// assert_eq!(clusters.len(), 2);
/// ```
pub fn find_clusters(locations: &[UserGeohash], config: &ProximityConfig) -> Vec<LocationCluster> {
    let mut clusters: Vec<LocationCluster> = Vec::new();

    for location in locations {
        match clusters
            .iter_mut()
            .find(|c| config.are_close(&c.geohash, &location.geohash))
        {
            Some(cluster) => cluster.user_ids.push(location.user_id.clone()),
            None => clusters.push(LocationCluster {
                geohash: location.geohash.clone(),
                user_ids: vec![location.user_id.clone()],
            }),
        }
    }

    debug!(
        "Clustered {} locations into {} clusters",
        locations.len(),
        clusters.len()
    );
    clusters
}

/// Keep clusters whose representative lies within `radius_miles` of `center`.
///
/// Returns `None` when the radius is not supported by the configured table,
/// or when `center` is too coarse for the resolution the radius needs.
/// Representatives that are too coarse are left out.
pub fn clusters_within_radius(
    center: &str,
    radius_miles: f64,
    clusters: &[LocationCluster],
    config: &ProximityConfig,
) -> Option<Vec<LocationCluster>> {
    let resolution = geo_utils::resolution_for_radius(radius_miles, &config.radius_table)?;
    if center.chars().count() < resolution {
        return None;
    }

    let distance_fn = geo_utils::haversine_distance;
    let within = |c: &&LocationCluster| {
        config
            .is_within_radius(center, &c.geohash, radius_miles, distance_fn)
            .unwrap_or(false)
    };
    Some(clusters.iter().filter(within).cloned().collect())
}
