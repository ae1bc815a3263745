//! # Place Recommendation
//!
//! Scores candidate places against the querying user's social, interest and
//! visit context.
//!
//! ## Per-candidate signals
//! - `friend_count`, `count`: active users close to the place (friends / everyone)
//! - `avg_similarity`: mean interest angle to those users in radians (lower = more alike)
//! - `geohash_distance`: shared prefix with the user's own geohash (higher = closer)
//! - `num_visits`, `visit_score`: the user's own past visits, weighted by
//!   duration and recency
//! - `is_liked_type`: the place category is in the user's liked types
//!
//! The score is a weighted sum of the signals; similarity is subtracted since a
//! smaller angle means more alike. Each weight except `friend` is the persisted
//! weight plus the live session adjustment; a friend delta is persisted but only
//! takes effect once it is part of the stored weights.

pub mod feedback;

use std::collections::BTreeSet;
use std::f64::consts::FRAC_PI_2;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};

use crate::collaborators::{LocationSource, PlaceSearch, UserDirectory};
use crate::error::{RecommendError, RecommendResult};
use crate::geo_utils::{self, ProximityConfig};
use crate::{GpsPoint, UserId, UserRecord};

pub use feedback::WeightAdjustment;

const SECONDS_PER_DAY: f64 = 86_400.0;

// ============================================================================
// Types
// ============================================================================

/// A place returned by the external place-search provider.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct PlaceCandidate {
    pub id: String,
    pub display_name: String,
    pub address: String,
    pub primary_type: String,
    pub location: GpsPoint,
}

/// One of the user's own past visits.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlaceVisitRecord {
    pub geohash: String,
    /// Unix seconds at the start of the visit
    pub timestamp: i64,
    /// Seconds spent
    pub duration: i64,
}

/// A scoring dimension that feedback can adjust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Dimension {
    Friend,
    PastVisit,
    Count,
    Similarity,
    Distance,
    Type,
}

impl Dimension {
    pub const ALL: [Dimension; 6] = [
        Dimension::Friend,
        Dimension::PastVisit,
        Dimension::Count,
        Dimension::Similarity,
        Dimension::Distance,
        Dimension::Type,
    ];
}

/// Persisted per-user weights.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct WeightConfig {
    pub friend: f64,
    pub past_visit: f64,
    pub count: f64,
    pub similarity: f64,
    pub distance: f64,
    pub place_type: f64,
    pub liked_types: BTreeSet<String>,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            friend: 1.0,
            past_visit: 1.0,
            count: 1.0,
            similarity: 1.0,
            distance: 1.0,
            place_type: 1.0,
            liked_types: BTreeSet::new(),
        }
    }
}

impl WeightConfig {
    pub fn weight(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Friend => self.friend,
            Dimension::PastVisit => self.past_visit,
            Dimension::Count => self.count,
            Dimension::Similarity => self.similarity,
            Dimension::Distance => self.distance,
            Dimension::Type => self.place_type,
        }
    }

    /// Weight used for scoring: the persisted weight plus the live session
    /// adjustment. The friend weight ignores the live adjustment.
    #[inline]
    pub fn effective(&self, dimension: Dimension, adjustment: &WeightAdjustment) -> f64 {
        match dimension {
            Dimension::Friend => self.friend,
            _ => self.weight(dimension) + adjustment.get(dimension),
        }
    }
}

/// An active user together with their current location.
#[derive(Debug, Clone)]
pub struct ActiveUser {
    pub user: UserRecord,
    pub geohash: String,
}

/// Who is at a place right now.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct UserPresence {
    pub count: usize,
    /// Mean interest angle in radians; π/2 when nobody is present
    pub avg_similarity: f64,
    pub friend_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct PlaceRecommendation {
    pub place: PlaceCandidate,
    pub geohash: String,
    pub geohash_distance: usize,
    pub num_visits: usize,
    pub visit_score: f64,
    pub is_liked_type: bool,
    pub user_data: UserPresence,
    pub score: f64,
}

/// Averages across the whole candidate set.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct RecommendationStats {
    pub avg_friend_count: f64,
    pub avg_visit_score: f64,
    pub avg_count: f64,
    pub avg_similarity: f64,
    pub avg_geohash_distance: f64,
}

impl RecommendationStats {
    pub fn from_recommendations(recommendations: &[PlaceRecommendation]) -> Self {
        if recommendations.is_empty() {
            return Self::default();
        }

        Self {
            avg_friend_count: mean(recommendations, |r| r.user_data.friend_count as f64),
            avg_visit_score: mean(recommendations, |r| r.visit_score),
            avg_count: mean(recommendations, |r| r.user_data.count as f64),
            avg_similarity: mean(recommendations, |r| r.user_data.avg_similarity),
            avg_geohash_distance: mean(recommendations, |r| r.geohash_distance as f64),
        }
    }
}

fn mean<F>(recommendations: &[PlaceRecommendation], f: F) -> f64
where
    F: Fn(&PlaceRecommendation) -> f64,
{
    recommendations.iter().map(f).sum::<f64>() / recommendations.len() as f64
}

/// Ranked places with the averages used by the "like" heuristic.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecommendationSet {
    pub recommendations: Vec<PlaceRecommendation>,
    pub stats: RecommendationStats,
}

/// Configuration for place scoring.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecommendConfig {
    pub proximity: ProximityConfig,
    /// Days after which a visit counts half as much.
    /// Default: 30.0
    pub visit_half_life_days: f64,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self { proximity: ProximityConfig::default(), visit_half_life_days: 30.0 }
    }
}

/// Everything known about the querying user for one scoring pass.
#[derive(Debug, Clone, Copy)]
pub struct RecommendContext<'a> {
    pub user: &'a UserRecord,
    pub user_geohash: &'a str,
    pub active_users: &'a [ActiveUser],
    pub visits: &'a [PlaceVisitRecord],
    pub weights: &'a WeightConfig,
    pub adjustment: &'a WeightAdjustment,
    /// Unix seconds used as "now" for visit recency
    pub now: i64,
}

// ============================================================================
// Scoring
// ============================================================================

/// Score and rank candidate places.
///
/// Candidates whose coordinates cannot be geohashed are skipped. The result
/// is sorted by descending score; ties keep input order.
pub fn recommend_places(
    candidates: &[PlaceCandidate],
    ctx: &RecommendContext<'_>,
    config: &RecommendConfig,
) -> RecommendationSet {
    let recommendations: Vec<PlaceRecommendation> = candidates
        .iter()
        .filter_map(|candidate| score_place(candidate, ctx, config))
        .collect();

    finish(recommendations, ctx)
}

/// Parallel version of [`recommend_places`] for large candidate sets.
#[cfg(feature = "parallel")]
pub fn recommend_places_parallel(
    candidates: &[PlaceCandidate],
    ctx: &RecommendContext<'_>,
    config: &RecommendConfig,
) -> RecommendationSet {
    use rayon::prelude::*;

    let recommendations: Vec<PlaceRecommendation> = candidates
        .par_iter()
        .filter_map(|candidate| score_place(candidate, ctx, config))
        .collect();

    finish(recommendations, ctx)
}

fn finish(
    mut recommendations: Vec<PlaceRecommendation>,
    ctx: &RecommendContext<'_>,
) -> RecommendationSet {
    let stats = RecommendationStats::from_recommendations(&recommendations);
    recommendations.sort_by(|a, b| b.score.total_cmp(&a.score));

    info!(
        "Ranked {} places for {}",
        recommendations.len(),
        ctx.user.id
    );
    RecommendationSet { recommendations, stats }
}

/// Score a single candidate. `None` if its location cannot be geohashed.
pub fn score_place(
    candidate: &PlaceCandidate,
    ctx: &RecommendContext<'_>,
    config: &RecommendConfig,
) -> Option<PlaceRecommendation> {
    let proximity = &config.proximity;

    let Some(geohash) = geo_utils::encode_geohash(&candidate.location, proximity.place_precision)
    else {
        warn!(
            "Skipping place {} with invalid location {:?}",
            candidate.id, candidate.location
        );
        return None;
    };

    let user_data = presence_at(&geohash, ctx, proximity);
    let geohash_distance = geo_utils::common_prefix_len(&geohash, ctx.user_geohash);

    let visits_here: Vec<&PlaceVisitRecord> = ctx
        .visits
        .iter()
        .filter(|v| proximity.are_close(&v.geohash, &geohash))
        .collect();
    let num_visits = visits_here.len();
    let visit_score: f64 = visits_here
        .iter()
        .map(|v| visit_weight(v, ctx.now, config.visit_half_life_days))
        .sum();

    let is_liked_type = ctx.weights.liked_types.contains(&candidate.primary_type);

    let w = |d: Dimension| ctx.weights.effective(d, ctx.adjustment);
    let score = user_data.friend_count as f64 * ctx.weights.friend
        + visit_score * w(Dimension::PastVisit)
        + user_data.count as f64 * w(Dimension::Count)
        - user_data.avg_similarity * w(Dimension::Similarity)
        + geohash_distance as f64 * w(Dimension::Distance)
        + if is_liked_type { w(Dimension::Type) } else { 0.0 };

    debug!(
        "Place {}: {} present ({} friends), {} visits, prefix {}, score {:.3}",
        candidate.id, user_data.count, user_data.friend_count, num_visits, geohash_distance, score
    );

    Some(PlaceRecommendation {
        place: candidate.clone(),
        geohash,
        geohash_distance,
        num_visits,
        visit_score,
        is_liked_type,
        user_data,
        score,
    })
}

/// Active users (other than the querying user) close to `geohash`.
fn presence_at(
    geohash: &str,
    ctx: &RecommendContext<'_>,
    proximity: &ProximityConfig,
) -> UserPresence {
    let present: Vec<&ActiveUser> = ctx
        .active_users
        .iter()
        .filter(|a| a.user.id != ctx.user.id)
        .filter(|a| proximity.are_close(&a.geohash, geohash))
        .collect();

    let count = present.len();
    let friend_count = present
        .iter()
        .filter(|a| ctx.user.is_friend(&a.user.id))
        .count();
    let avg_similarity = if count == 0 {
        FRAC_PI_2
    } else {
        present
            .iter()
            .map(|a| interest_angle(&ctx.user.interests, &a.user.interests))
            .sum::<f64>()
            / count as f64
    };

    UserPresence { count, avg_similarity, friend_count }
}

/// Angle between two interest vectors, in radians.
///
/// 0 means identical interests; π/2 means nothing in common. A vector with
/// no interests set is maximally dissimilar to everything.
pub fn interest_angle(a: &[u8], b: &[u8]) -> f64 {
    let magnitude = |v: &[u8]| v.iter().map(|&x| f64::from(x).powi(2)).sum::<f64>().sqrt();
    let (norm_a, norm_b) = (magnitude(a), magnitude(b));
    if norm_a == 0.0 || norm_b == 0.0 {
        return FRAC_PI_2;
    }

    let dot: f64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| f64::from(x) * f64::from(y))
        .sum();
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0).acos()
}

/// Weight of one past visit: minutes spent, halved every `half_life_days`.
pub fn visit_weight(visit: &PlaceVisitRecord, now: i64, half_life_days: f64) -> f64 {
    let minutes = visit.duration.max(0) as f64 / 60.0;
    if half_life_days <= 0.0 || !half_life_days.is_finite() {
        return minutes;
    }
    let elapsed_days = now.saturating_sub(visit.timestamp).max(0) as f64 / SECONDS_PER_DAY;
    minutes * 0.5_f64.powf(elapsed_days / half_life_days)
}

// ============================================================================
// Fetch and Recommend
// ============================================================================

/// A nearby-places request.
#[derive(Debug, Clone)]
pub struct NearbyQuery {
    pub user_id: UserId,
    pub center: GpsPoint,
    pub radius_meters: f64,
    /// Categories to search for; empty means any
    pub category_filter: Vec<String>,
}

/// Fetch everything a scoring pass needs through the collaborators, then rank.
///
/// Active users whose records do not resolve are left out of the presence
/// counts.
pub async fn fetch_and_recommend<D, L, P>(
    directory: &D,
    locations: &L,
    places: &P,
    query: &NearbyQuery,
    weights: &WeightConfig,
    adjustment: &WeightAdjustment,
    config: &RecommendConfig,
) -> RecommendResult<RecommendationSet>
where
    D: UserDirectory + ?Sized,
    L: LocationSource + ?Sized,
    P: PlaceSearch + ?Sized,
{
    let user = directory
        .fetch_user(&query.user_id)
        .await?
        .ok_or_else(|| RecommendError::UserNotFound(query.user_id.clone()))?;

    let center = query.center;
    let user_geohash = geo_utils::encode_geohash(&center, config.proximity.place_precision)
        .ok_or(RecommendError::InvalidLocation(
            center.latitude,
            center.longitude,
        ))?;

    let mut active_users = Vec::new();
    for location in locations.fetch_active_locations().await? {
        if location.user_id == user.id {
            continue;
        }
        match directory.fetch_user(&location.user_id).await {
            Ok(Some(record)) => active_users.push(ActiveUser {
                user: record,
                geohash: location.geohash,
            }),
            Ok(None) => debug!("Active user {} no longer resolves", location.user_id),
            Err(e) => warn!("Failed to fetch active user {}: {}", location.user_id, e),
        }
    }

    let visits = locations.fetch_visit_history(&user.id).await?;
    let candidates = places
        .search_nearby_places(query.center, query.radius_meters, &query.category_filter)
        .await?;

    info!(
        "Scoring {} places for {} against {} active users and {} visits",
        candidates.len(),
        user.id,
        active_users.len(),
        visits.len()
    );

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64);

    let ctx = RecommendContext {
        user: &user,
        user_geohash: &user_geohash,
        active_users: &active_users,
        visits: &visits,
        weights,
        adjustment,
        now,
    };
    Ok(recommend_places(&candidates, &ctx, config))
}

// ============================================================================
// Tests
// ============================================================================
