//! Error types shared by the discovery and recommendation engines.

use thiserror::Error;

use crate::recommend::Dimension;
use crate::UserId;

/// Failure reported by an external collaborator (identity, location, places,
/// weights persistence).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollaboratorError {
    #[error("record not found")]
    NotFound,
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Errors that abort a discovery run.
///
/// Only the querying user's own record is required; every other failed fetch
/// during traversal is a dead end and never surfaces here.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("querying user {0} could not be resolved")]
    UserNotFound(UserId),
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

/// Errors from [`crate::recommend::fetch_and_recommend`]. Scoring itself never fails.
#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("querying user {0} could not be resolved")]
    UserNotFound(UserId),
    #[error("location ({0}, {1}) cannot be geohashed")]
    InvalidLocation(f64, f64),
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("adjustment for {0:?} is not a finite number")]
    NonFinite(Dimension),
    #[error("failed to persist feedback: {0}")]
    Persist(#[from] CollaboratorError),
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
pub type RecommendResult<T> = Result<T, RecommendError>;
pub type FeedbackResult<T> = Result<T, FeedbackError>;
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;
