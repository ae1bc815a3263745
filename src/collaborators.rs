//! Boundary traits for the external collaborators the engines consume.
//!
//! Implementations own transport, persistence and authentication. Every
//! method may suspend; the engines await them one at a time.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::CollaboratorResult;
use crate::recommend::feedback::WeightAdjustment;
use crate::recommend::{PlaceCandidate, PlaceVisitRecord};
use crate::{GpsPoint, UserGeohash, UserRecord};

/// Identity collaborator plus the pairwise closeness cost between connected users.
pub trait UserDirectory: Send + Sync {
    /// Full record for `id`, or `None` when it no longer resolves.
    fn fetch_user<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, CollaboratorResult<Option<UserRecord>>>;

    /// Additive edge cost between two connected users (lower = closer).
    ///
    /// Derived from message volume and friendship duration. Must be finite and
    /// non-negative; other values are treated as a missing edge.
    fn fetch_pair_closeness<'a>(
        &'a self,
        a: &'a str,
        b: &'a str,
    ) -> BoxFuture<'a, CollaboratorResult<f64>>;
}

impl<T: UserDirectory + ?Sized> UserDirectory for &T {
    fn fetch_user<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, CollaboratorResult<Option<UserRecord>>> {
        (**self).fetch_user(id)
    }

    fn fetch_pair_closeness<'a>(
        &'a self,
        a: &'a str,
        b: &'a str,
    ) -> BoxFuture<'a, CollaboratorResult<f64>> {
        (**self).fetch_pair_closeness(a, b)
    }
}

impl<T: UserDirectory + ?Sized> UserDirectory for Arc<T> {
    fn fetch_user<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, CollaboratorResult<Option<UserRecord>>> {
        (**self).fetch_user(id)
    }

    fn fetch_pair_closeness<'a>(
        &'a self,
        a: &'a str,
        b: &'a str,
    ) -> BoxFuture<'a, CollaboratorResult<f64>> {
        (**self).fetch_pair_closeness(a, b)
    }
}

/// Location and movement history collaborator.
pub trait LocationSource: Send + Sync {
    /// Current location of every active user.
    fn fetch_active_locations(&self) -> BoxFuture<'_, CollaboratorResult<Vec<UserGeohash>>>;

    fn fetch_visit_history<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, CollaboratorResult<Vec<PlaceVisitRecord>>>;
}

/// External place-search provider.
pub trait PlaceSearch: Send + Sync {
    /// Places within `radius_meters` of `center`, optionally limited to the
    /// given categories (empty = no filter).
    fn search_nearby_places<'a>(
        &'a self,
        center: GpsPoint,
        radius_meters: f64,
        category_filter: &'a [String],
    ) -> BoxFuture<'a, CollaboratorResult<Vec<PlaceCandidate>>>;
}

/// Weights persistence collaborator.
pub trait WeightStore: Send + Sync {
    fn persist_weight_adjustment<'a>(
        &'a self,
        delta: &'a WeightAdjustment,
    ) -> BoxFuture<'a, CollaboratorResult<()>>;

    fn persist_liked_type<'a>(&'a self, tag: &'a str) -> BoxFuture<'a, CollaboratorResult<()>>;
}
