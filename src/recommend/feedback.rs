//! Explicit feedback on recommendations.
//!
//! Coarse preferences ("closer", "more popular", ...) become a fixed-size
//! step on one scoring dimension. A "like" on a place stores its category as
//! a liked type and steps whichever dimension made that place stand out from
//! the rest of the candidate set.
//!
//! Every delta is persisted through the [`WeightStore`] first and only then
//! added to the live session adjustment.

use log::{debug, info};

use super::{Dimension, PlaceRecommendation, RecommendationStats, WeightConfig};
use crate::collaborators::WeightStore;
use crate::error::{FeedbackError, FeedbackResult};

/// Signed change to the six scoring weights. Absent fields are zero.
///
/// A zero value is a valid no-op; only non-finite values are rejected.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct WeightAdjustment {
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub friend_adjustment: Option<f64>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub past_visit_adjustment: Option<f64>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub count_adjustment: Option<f64>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub similarity_adjustment: Option<f64>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub distance_adjustment: Option<f64>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub type_adjustment: Option<f64>,
}

impl WeightAdjustment {
    /// An adjustment touching a single dimension.
    pub fn single(dimension: Dimension, delta: f64) -> Self {
        let mut adjustment = Self::default();
        adjustment.set(dimension, delta);
        adjustment
    }

    fn slot(&self, dimension: Dimension) -> &Option<f64> {
        match dimension {
            Dimension::Friend => &self.friend_adjustment,
            Dimension::PastVisit => &self.past_visit_adjustment,
            Dimension::Count => &self.count_adjustment,
            Dimension::Similarity => &self.similarity_adjustment,
            Dimension::Distance => &self.distance_adjustment,
            Dimension::Type => &self.type_adjustment,
        }
    }

    fn slot_mut(&mut self, dimension: Dimension) -> &mut Option<f64> {
        match dimension {
            Dimension::Friend => &mut self.friend_adjustment,
            Dimension::PastVisit => &mut self.past_visit_adjustment,
            Dimension::Count => &mut self.count_adjustment,
            Dimension::Similarity => &mut self.similarity_adjustment,
            Dimension::Distance => &mut self.distance_adjustment,
            Dimension::Type => &mut self.type_adjustment,
        }
    }

    /// Value for a dimension, zero when absent.
    #[inline]
    pub fn get(&self, dimension: Dimension) -> f64 {
        self.slot(dimension).unwrap_or(0.0)
    }

    pub fn set(&mut self, dimension: Dimension, value: f64) {
        *self.slot_mut(dimension) = Some(value);
    }

    /// Add another adjustment on top of this one.
    pub fn accumulate(&mut self, other: &WeightAdjustment) {
        for dimension in Dimension::ALL {
            if other.slot(dimension).is_some() {
                let total = self.get(dimension) + other.get(dimension);
                self.set(dimension, total);
            }
        }
    }

    /// True when every dimension is zero or absent.
    pub fn is_noop(&self) -> bool {
        Dimension::ALL.iter().all(|&d| self.get(d) == 0.0)
    }

    pub fn validate(&self) -> FeedbackResult<()> {
        match Dimension::ALL.into_iter().find(|&d| !self.get(d).is_finite()) {
            Some(dimension) => Err(FeedbackError::NonFinite(dimension)),
            None => Ok(()),
        }
    }
}

/// Coarse preference a user can express about the list they were shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Preference {
    Closer,
    Farther,
    MorePopular,
    LessPopular,
    MoreFriends,
    FewerFriends,
    MoreSimilar,
    LessSimilar,
    MoreVisited,
    LessVisited,
    MoreLikedTypes,
    FewerLikedTypes,
}

impl Preference {
    pub fn dimension(self) -> Dimension {
        match self {
            Preference::Closer | Preference::Farther => Dimension::Distance,
            Preference::MorePopular | Preference::LessPopular => Dimension::Count,
            Preference::MoreFriends | Preference::FewerFriends => Dimension::Friend,
            Preference::MoreSimilar | Preference::LessSimilar => Dimension::Similarity,
            Preference::MoreVisited | Preference::LessVisited => Dimension::PastVisit,
            Preference::MoreLikedTypes | Preference::FewerLikedTypes => Dimension::Type,
        }
    }

    /// +1 or -1. A larger similarity weight penalises dissimilar places
    /// harder, so "more similar" is positive too.
    pub fn sign(self) -> f64 {
        match self {
            Preference::Closer
            | Preference::MorePopular
            | Preference::MoreFriends
            | Preference::MoreSimilar
            | Preference::MoreVisited
            | Preference::MoreLikedTypes => 1.0,
            _ => -1.0,
        }
    }

    pub fn adjustment(self, step: f64) -> WeightAdjustment {
        WeightAdjustment::single(self.dimension(), self.sign() * step)
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeedbackConfig {
    /// Magnitude of one preference click.
    /// Default: 1.0
    pub step: f64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self { step: 1.0 }
    }
}

/// The dimension on which `place` is furthest above the candidate-set
/// average, relative to that average. Similarity counts in reverse (a
/// smaller angle is better). `None` when nothing is above average.
pub fn strongest_dimension(
    place: &PlaceRecommendation,
    stats: &RecommendationStats,
) -> Option<Dimension> {
    let excess = |value: f64, mean: f64| (value - mean) / mean.abs().max(f64::EPSILON);
    let data = &place.user_data;

    [
        (Dimension::Friend, excess(data.friend_count as f64, stats.avg_friend_count)),
        (Dimension::PastVisit, excess(place.visit_score, stats.avg_visit_score)),
        (Dimension::Count, excess(data.count as f64, stats.avg_count)),
        (Dimension::Similarity, -excess(data.avg_similarity, stats.avg_similarity)),
        (
            Dimension::Distance,
            excess(place.geohash_distance as f64, stats.avg_geohash_distance),
        ),
    ]
    .into_iter()
    .filter(|(_, e)| *e > 0.0)
    .fold(None, |best: Option<(Dimension, f64)>, (d, e)| match best {
        Some((_, best_e)) if best_e >= e => best,
        _ => Some((d, e)),
    })
    .map(|(d, _)| d)
}

/// Owns a user's weights and live adjustment for one session.
pub struct FeedbackLoop<S> {
    store: S,
    weights: WeightConfig,
    adjustment: WeightAdjustment,
    config: FeedbackConfig,
}

impl<S: WeightStore> FeedbackLoop<S> {
    pub fn new(store: S, weights: WeightConfig, config: FeedbackConfig) -> Self {
        Self {
            store,
            weights,
            adjustment: WeightAdjustment::default(),
            config,
        }
    }

    pub fn weights(&self) -> &WeightConfig {
        &self.weights
    }

    /// Sum of all deltas applied this session.
    pub fn adjustment(&self) -> &WeightAdjustment {
        &self.adjustment
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persist and apply a coarse preference. Returns the delta sent.
    pub async fn apply_preference(
        &mut self,
        preference: Preference,
    ) -> FeedbackResult<WeightAdjustment> {
        let delta = preference.adjustment(self.config.step);
        self.apply_adjustment(&delta).await?;
        info!("Applied preference {:?}", preference);
        Ok(delta)
    }

    /// Persist an arbitrary delta, then fold it into the live adjustment.
    pub async fn apply_adjustment(&mut self, delta: &WeightAdjustment) -> FeedbackResult<()> {
        delta.validate()?;
        self.store.persist_weight_adjustment(delta).await?;
        self.adjustment.accumulate(delta);
        debug!("Live adjustment is now {:?}", self.adjustment);
        Ok(())
    }

    /// Record a "like" on a place.
    ///
    /// Adds its category to the liked types if new, then steps the dimension
    /// on which the place stood out most. Returns that dimension.
    pub async fn like_place(
        &mut self,
        place: &PlaceRecommendation,
        stats: &RecommendationStats,
    ) -> FeedbackResult<Option<Dimension>> {
        let tag = &place.place.primary_type;
        if !self.weights.liked_types.contains(tag) {
            self.store.persist_liked_type(tag).await?;
            self.weights.liked_types.insert(tag.clone());
            info!("Added liked type {}", tag);
        }

        let strongest = strongest_dimension(place, stats);
        if let Some(dimension) = strongest {
            let delta = WeightAdjustment::single(dimension, self.config.step);
            self.apply_adjustment(&delta).await?;
            info!("Liked {} for its {:?}", place.place.id, dimension);
        }
        Ok(strongest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CollaboratorError, CollaboratorResult};
    use crate::recommend::tests::place;
    use crate::recommend::UserPresence;
    use futures::future::{BoxFuture, FutureExt};
    use std::f64::consts::FRAC_PI_2;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        adjustments: Mutex<Vec<WeightAdjustment>>,
        liked: Mutex<Vec<String>>,
        reject: bool,
    }

    impl WeightStore for RecordingStore {
        fn persist_weight_adjustment<'a>(
            &'a self,
            delta: &'a WeightAdjustment,
        ) -> BoxFuture<'a, CollaboratorResult<()>> {
            async move {
                if self.reject {
                    return Err(CollaboratorError::Rejected("read only".into()));
                }
                self.adjustments.lock().unwrap().push(delta.clone());
                Ok(())
            }
            .boxed()
        }

        fn persist_liked_type<'a>(&'a self, tag: &'a str) -> BoxFuture<'a, CollaboratorResult<()>> {
            async move {
                self.liked.lock().unwrap().push(tag.to_string());
                Ok(())
            }
            .boxed()
        }
    }

    fn feedback_loop(store: RecordingStore, step: f64) -> FeedbackLoop<RecordingStore> {
        FeedbackLoop::new(store, WeightConfig::default(), FeedbackConfig { step })
    }

    fn recommendation(
        kind: &str,
        count: usize,
        friends: usize,
        similarity: f64,
        prefix: usize,
    ) -> PlaceRecommendation {
        PlaceRecommendation {
            place: place("p", 0.0, 0.0, kind),
            geohash: "s00000000".into(),
            geohash_distance: prefix,
            num_visits: 0,
            visit_score: 0.0,
            is_liked_type: false,
            user_data: UserPresence {
                count,
                avg_similarity: similarity,
                friend_count: friends,
            },
            score: 0.0,
        }
    }

    fn stats() -> RecommendationStats {
        RecommendationStats {
            avg_friend_count: 1.0,
            avg_visit_score: 0.0,
            avg_count: 2.0,
            avg_similarity: 1.0,
            avg_geohash_distance: 4.0,
        }
    }

    #[tokio::test]
    async fn test_closer_sends_single_distance_delta() {
        let mut feedback = feedback_loop(RecordingStore::default(), 1.0);
        feedback.apply_preference(Preference::Closer).await.unwrap();

        let sent = feedback.store().adjustments.lock().unwrap().clone();
        let expected = WeightAdjustment {
            distance_adjustment: Some(1.0),
            ..Default::default()
        };
        assert_eq!(sent, vec![expected]);
        for dimension in Dimension::ALL {
            let expected = if dimension == Dimension::Distance { 1.0 } else { 0.0 };
            assert_eq!(sent[0].get(dimension), expected);
        }
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_closer_wire_shape() {
        let json = serde_json::to_value(Preference::Closer.adjustment(1.0)).unwrap();
        assert_eq!(json, serde_json::json!({ "distanceAdjustment": 1.0 }));
    }

    #[tokio::test]
    async fn test_preferences_accumulate() {
        let mut feedback = feedback_loop(RecordingStore::default(), 0.5);
        feedback.apply_preference(Preference::MorePopular).await.unwrap();
        feedback.apply_preference(Preference::MorePopular).await.unwrap();
        feedback.apply_preference(Preference::Farther).await.unwrap();

        assert_eq!(feedback.adjustment().get(Dimension::Count), 1.0);
        assert_eq!(feedback.adjustment().get(Dimension::Distance), -0.5);
        assert_eq!(feedback.adjustment().get(Dimension::Friend), 0.0);
    }

    #[tokio::test]
    async fn test_zero_adjustment_is_noop() {
        let mut feedback = feedback_loop(RecordingStore::default(), 1.0);
        let zero = WeightAdjustment::single(Dimension::Count, 0.0);
        assert!(zero.is_noop());

        feedback.apply_adjustment(&zero).await.unwrap();
        assert!(feedback.adjustment().is_noop());
    }

    #[tokio::test]
    async fn test_non_finite_rejected() {
        let mut feedback = feedback_loop(RecordingStore::default(), 1.0);
        let bad = WeightAdjustment::single(Dimension::Similarity, f64::NAN);

        let err = feedback.apply_adjustment(&bad).await.unwrap_err();
        assert!(matches!(err, FeedbackError::NonFinite(Dimension::Similarity)));
        let sent = feedback.store().adjustments.lock().unwrap();
        assert!(sent.is_empty());
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_adjustment_untouched() {
        let store = RecordingStore {
            reject: true,
            ..Default::default()
        };
        let mut feedback = feedback_loop(store, 1.0);

        assert!(feedback.apply_preference(Preference::Closer).await.is_err());
        assert!(feedback.adjustment().is_noop());
    }

    #[test]
    fn test_strongest_dimension() {
        let strongest = |rec: PlaceRecommendation| strongest_dimension(&rec, &stats());

        // Count 3x the average beats a prefix slightly above average
        let popular = recommendation("cafe", 6, 1, 1.0, 5);
        assert_eq!(strongest(popular), Some(Dimension::Count));
        // Much more similar than average
        let similar = recommendation("cafe", 2, 1, 0.1, 4);
        assert_eq!(strongest(similar), Some(Dimension::Similarity));
        // Nothing stands out
        let plain = recommendation("cafe", 0, 0, FRAC_PI_2, 0);
        assert_eq!(strongest(plain), None);
    }

    #[tokio::test]
    async fn test_like_place() {
        let mut feedback = feedback_loop(RecordingStore::default(), 1.0);
        let liked = recommendation("museum", 1, 3, 1.0, 4);

        let nudged = feedback.like_place(&liked, &stats()).await.unwrap();
        assert_eq!(nudged, Some(Dimension::Friend));
        assert!(feedback.weights().liked_types.contains("museum"));
        assert_eq!(feedback.adjustment().get(Dimension::Friend), 1.0);

        // Liking the same category again does not persist it twice
        feedback.like_place(&liked, &stats()).await.unwrap();
        let liked_types = feedback.store().liked.lock().unwrap().clone();
        assert_eq!(liked_types, vec!["museum".to_string()]);
        assert_eq!(feedback.adjustment().get(Dimension::Friend), 2.0);
    }
}
