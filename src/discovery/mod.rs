//! # Social Graph Discovery
//!
//! "People you may know" by weighted breadth-first traversal of the
//! friendship graph.
//!
//! ## Algorithm
//! 1. Fetch the querying user's friends and block list
//! 2. Seed a FIFO queue with every direct friend (or a single one, for cache
//!    repair), each at `degree = closeness(user, friend)`
//! 3. Direct friends are expanded once from their seed and never suggested
//! 4. Other users are suggested if eligible; a user already suggested is only
//!    replaced, and re-expanded, when reached at a strictly lower degree
//! 5. Stop when the queue drains
//!
//! `degree` accumulates pairwise closeness costs along the path, so a long
//! chain of close friends can beat a short chain of distant ones.

pub mod cache;
pub mod session;

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use log::{debug, info, warn};

use crate::collaborators::UserDirectory;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::{FriendPathNode, UserId, UserRecord};

/// Configuration for discovery and its cache.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiscoveryConfig {
    /// Maximum age of the cache before a full rebuild is forced.
    /// Default: 10 minutes
    pub cache_ttl: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(10 * 60),
        }
    }
}

/// A suggested connection with the path that led to it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct SuggestedProfile {
    pub data: UserRecord,
    /// Accumulated closeness cost (lower = closer)
    pub degree: f64,
    /// From a direct friend of the querying user down to, but not including,
    /// the suggested user
    pub friend_path: Vec<FriendPathNode>,
}

#[derive(Debug)]
struct QueuedUser {
    user_id: UserId,
    degree: f64,
    path: Vec<FriendPathNode>,
}

/// Run discovery for `user_id`.
///
/// With `restrict_to_friend`, only that direct friend is seeded, so the result
/// covers just the users reachable through them.
///
/// Records that fail to resolve are dead ends. Only the querying user's own
/// record is required.
///
/// The returned map is keyed by suggested user id; use [`rank_suggestions`]
/// for an ordering.
pub async fn discover<D>(
    directory: &D,
    user_id: &str,
    restrict_to_friend: Option<&str>,
) -> DiscoveryResult<HashMap<UserId, SuggestedProfile>>
where
    D: UserDirectory + ?Sized,
{
    let user = directory
        .fetch_user(user_id)
        .await?
        .ok_or_else(|| DiscoveryError::UserNotFound(user_id.to_string()))?;

    let seeds: Vec<&UserId> = match restrict_to_friend {
        Some(friend_id) => match user.friends.get(friend_id) {
            Some(friend) => vec![friend],
            None => {
                warn!(
                    "{} is not a friend of {}, nothing to discover",
                    friend_id, user.id
                );
                return Ok(HashMap::new());
            }
        },
        None => user.friends.iter().collect(),
    };

    let mut queue: VecDeque<QueuedUser> = VecDeque::new();
    for friend_id in seeds {
        if let Some(degree) = closeness(directory, &user.id, friend_id).await {
            queue.push_back(QueuedUser {
                user_id: friend_id.clone(),
                degree,
                path: Vec::new(),
            });
        }
    }

    let mut records: HashMap<UserId, Option<UserRecord>> = HashMap::new();
    let mut processed_friends: HashSet<UserId> = HashSet::new();
    let mut results: HashMap<UserId, SuggestedProfile> = HashMap::new();

    while let Some(entry) = queue.pop_front() {
        if user.is_friend(&entry.user_id) {
            if !processed_friends.insert(entry.user_id.clone()) {
                continue;
            }
            if let Some(friend) = load(directory, &mut records, &entry.user_id).await {
                let (degree, path) = (entry.degree, &entry.path);
                enqueue_friends(directory, &user, &friend, degree, path, &mut queue).await;
            }
            continue;
        }

        if entry.user_id == user.id || user.has_blocked(&entry.user_id) {
            continue;
        }

        // Already reached at an equal or better degree
        let known = results.get(&entry.user_id);
        if known.is_some_and(|s| s.degree <= entry.degree) {
            continue;
        }

        let Some(candidate) = load(directory, &mut records, &entry.user_id).await else {
            continue;
        };
        if candidate.has_blocked(&user.id) {
            continue;
        }

        let (degree, path) = (entry.degree, &entry.path);
        enqueue_friends(directory, &user, &candidate, degree, path, &mut queue).await;

        results.insert(
            entry.user_id,
            SuggestedProfile {
                data: candidate,
                degree: entry.degree,
                friend_path: entry.path,
            },
        );
    }

    info!(
        "Discovery for {}{}: {} suggestions from {} fetched records",
        user.id,
        restrict_to_friend
            .map(|f| format!(" via {}", f))
            .unwrap_or_default(),
        results.len(),
        records.len()
    );

    Ok(results)
}

/// Order suggestions by ascending degree, ties broken by user id.
pub fn rank_suggestions(suggestions: HashMap<UserId, SuggestedProfile>) -> Vec<SuggestedProfile> {
    let mut ranked: Vec<SuggestedProfile> = suggestions.into_values().collect();
    ranked.sort_by(by_degree);
    ranked
}

/// Ascending degree, ties broken by user id.
pub(crate) fn by_degree(a: &SuggestedProfile, b: &SuggestedProfile) -> Ordering {
    a.degree
        .total_cmp(&b.degree)
        .then_with(|| a.data.id.cmp(&b.data.id))
}

/// Push every friend of `from` onto the queue, one hop further along the path.
///
/// The querying user and their direct friends are never enqueued here;
/// direct friends are only expanded from their own seed.
async fn enqueue_friends<D>(
    directory: &D,
    user: &UserRecord,
    from: &UserRecord,
    degree: f64,
    path: &[FriendPathNode],
    queue: &mut VecDeque<QueuedUser>,
) where
    D: UserDirectory + ?Sized,
{
    let mut next_path = path.to_vec();
    next_path.push(FriendPathNode::from(from));

    for candidate in &from.friends {
        if *candidate == user.id || user.is_friend(candidate) {
            continue;
        }
        let Some(cost) = closeness(directory, &from.id, candidate).await else {
            continue;
        };
        queue.push_back(QueuedUser {
            user_id: candidate.clone(),
            degree: degree + cost,
            path: next_path.clone(),
        });
    }

    debug!(
        "Expanded {} at degree {:.3} ({} friends)",
        from.id,
        degree,
        from.friends.len()
    );
}

/// Fetch a record once per run; failures are remembered as dead ends.
async fn load<D>(
    directory: &D,
    records: &mut HashMap<UserId, Option<UserRecord>>,
    id: &str,
) -> Option<UserRecord>
where
    D: UserDirectory + ?Sized,
{
    if let Some(cached) = records.get(id) {
        return cached.clone();
    }

    let record = match directory.fetch_user(id).await {
        Ok(Some(record)) => Some(record),
        Ok(None) => {
            debug!("User {} no longer resolves, skipping", id);
            None
        }
        Err(e) => {
            warn!("Failed to fetch user {}: {}", id, e);
            None
        }
    };

    records.insert(id.to_string(), record.clone());
    record
}

async fn closeness<D>(directory: &D, a: &str, b: &str) -> Option<f64>
where
    D: UserDirectory + ?Sized,
{
    match directory.fetch_pair_closeness(a, b).await {
        Ok(cost) if cost.is_finite() && cost >= 0.0 => Some(cost),
        Ok(cost) => {
            warn!(
                "Ignoring invalid closeness {} between {} and {}",
                cost, a, b
            );
            None
        }
        Err(e) => {
            warn!("Failed to fetch closeness between {} and {}: {}", a, b, e);
            None
        }
    }
}
