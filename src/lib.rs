//! # Nearby Engine
//!
//! Social-graph discovery and geohash-based place recommendation for a
//! location-aware social app.
//!
//! This library provides:
//! - "People you may know" via a weighted breadth-first traversal of the
//!   friendship graph, with an incremental cache that survives small graph changes
//! - Ranking of nearby places by social presence, interest similarity, visit
//!   history and distance, tunable through explicit feedback
//! - Geohash proximity checks and clustering of active users
//!
//! The engines never talk to the network or a database themselves. Records are
//! fetched through the async traits in [`collaborators`]; results are returned
//! in memory for the caller to render or persist.
//!
//! ## Features
//!
//! - **`serde`** - Serialize/Deserialize for public records and configuration
//! - **`parallel`** - Parallel candidate scoring with rayon
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use nearby_engine::{find_clusters, ProximityConfig, UserGeohash};
//!
//! let locations = vec![
//!     UserGeohash::new("alice", "9h9j4"),
//!     UserGeohash::new("bob", "9h9j4"),
//!     UserGeohash::new("carol", "9h9j5"),
//! ];
//!
//! let config = ProximityConfig {
//!     close_prefix_len: 4,
//!     ..ProximityConfig::default()
//! };
//! let clusters = find_clusters(&locations, &config);
//! assert_eq!(clusters.len(), 1);
//! assert_eq!(clusters[0].user_ids, vec!["alice", "bob", "carol"]);
//! ```

use std::collections::BTreeSet;

pub mod clusters;
pub mod collaborators;
pub mod discovery;
pub mod error;
pub mod geo_utils;
pub mod recommend;

pub use clusters::{clusters_within_radius, find_clusters, LocationCluster};
pub use collaborators::{LocationSource, PlaceSearch, UserDirectory, WeightStore};
pub use discovery::cache::{CachedSuggestedProfile, SuggestionCache};
pub use discovery::session::DiscoverySession;
pub use discovery::{discover, rank_suggestions, DiscoveryConfig, SuggestedProfile};
pub use error::{CollaboratorError, DiscoveryError, FeedbackError, RecommendError};
pub use geo_utils::{
    are_close, common_prefix_len, is_within_radius, ProximityConfig, RadiusResolution,
};
pub use recommend::feedback::{FeedbackConfig, FeedbackLoop, Preference, WeightAdjustment};
pub use recommend::{
    fetch_and_recommend, recommend_places, ActiveUser, Dimension, NearbyQuery, PlaceCandidate,
    PlaceRecommendation, PlaceVisitRecord, RecommendConfig, RecommendationSet, RecommendationStats,
    UserPresence, WeightConfig,
};

#[cfg(feature = "parallel")]
pub use recommend::recommend_places_parallel;

/// Identifier of a user as issued by the identity collaborator.
pub type UserId = String;

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use nearby_engine::GpsPoint;
/// let point = GpsPoint::new(51.5074, -0.1278); // London
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Snapshot of a user as returned by the identity collaborator.
///
/// The engines treat it as immutable; a fresh snapshot is fetched whenever
/// the latest friend or block lists matter.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct UserRecord {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    /// Fixed-length 0/1 interest vector
    pub interests: Vec<u8>,
    pub friends: BTreeSet<UserId>,
    pub blocked_users: BTreeSet<UserId>,
}

impl UserRecord {
    pub fn new(
        id: impl Into<UserId>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            ..Self::default()
        }
    }

    /// Display name used in friend paths.
    pub fn full_name(&self) -> String {
        match (self.first_name.is_empty(), self.last_name.is_empty()) {
            (false, false) => format!("{} {}", self.first_name, self.last_name),
            (false, true) => self.first_name.clone(),
            (true, _) => self.last_name.clone(),
        }
    }

    pub fn is_friend(&self, id: &str) -> bool {
        self.friends.contains(id)
    }

    pub fn has_blocked(&self, id: &str) -> bool {
        self.blocked_users.contains(id)
    }
}

/// Current location of one active user.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct UserGeohash {
    pub user_id: UserId,
    pub geohash: String,
}

impl UserGeohash {
    pub fn new(user_id: impl Into<UserId>, geohash: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            geohash: geohash.into(),
        }
    }
}

/// One hop in a discovery path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct FriendPathNode {
    pub user_id: UserId,
    pub user_name: String,
}

impl FriendPathNode {
    pub fn new(user_id: impl Into<UserId>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
        }
    }
}

impl From<&UserRecord> for FriendPathNode {
    fn from(user: &UserRecord) -> Self {
        Self {
            user_id: user.id.clone(),
            user_name: user.full_name(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
