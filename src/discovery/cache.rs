//! Incremental cache of discovery results.
//!
//! Entries are keyed by suggested user id and keep only their immediate
//! parent. Full friend paths are rebuilt by following parent ids through the
//! map until reaching a node that is not cached (a direct friend).
//!
//! The cache is patched in place when the querying user gains friends
//! ([`SuggestionCache::add_connections`]) or drops/blocks users
//! ([`SuggestionCache::remove_connections`]), and discarded wholesale when
//! [`SuggestionCache::is_invalid`] says so.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::{by_degree, discover, DiscoveryConfig, SuggestedProfile};
use crate::collaborators::UserDirectory;
use crate::error::DiscoveryResult;
use crate::{FriendPathNode, UserId, UserRecord};

/// A suggestion as stored in the cache.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct CachedSuggestedProfile {
    pub data: UserRecord,
    pub degree: f64,
    /// Last hop before the suggested user
    pub parent: FriendPathNode,
}

#[derive(Debug, Clone)]
pub struct SuggestionCache {
    entries: HashMap<UserId, CachedSuggestedProfile>,
    last_rebuild: Option<Instant>,
    /// Users blocked at the last full rebuild, plus any blocked since
    blocked_snapshot: BTreeSet<UserId>,
    ttl: Duration,
}

impl Default for SuggestionCache {
    fn default() -> Self {
        Self::new(&DiscoveryConfig::default())
    }
}

impl SuggestionCache {
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            entries: HashMap::new(),
            last_rebuild: None,
            blocked_snapshot: BTreeSet::new(),
            ttl: config.cache_ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CachedSuggestedProfile> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn last_rebuild(&self) -> Option<Instant> {
        self.last_rebuild
    }

    /// Drop every entry and forget the last rebuild.
    pub fn invalidate(&mut self) {
        self.entries.clear();
        self.last_rebuild = None;
        self.blocked_snapshot.clear();
    }

    /// Store fresh suggestions, keeping the existing entry when it is at least
    /// as close.
    pub fn store(&mut self, suggestions: impl IntoIterator<Item = SuggestedProfile>) {
        for suggestion in suggestions {
            let Some(parent) = suggestion.friend_path.last().cloned() else {
                warn!(
                    "Suggestion {} has no friend path, not caching",
                    suggestion.data.id
                );
                continue;
            };

            if self
                .entries
                .get(&suggestion.data.id)
                .is_some_and(|existing| existing.degree <= suggestion.degree)
            {
                continue;
            }

            self.entries.insert(
                suggestion.data.id.clone(),
                CachedSuggestedProfile { data: suggestion.data, degree: suggestion.degree, parent },
            );
        }
    }

    /// Friend path for a cached user, from a direct friend down to the parent.
    ///
    /// Stops at the first parent that is not cached. A visited set guards
    /// against parent cycles.
    pub fn path_to(&self, id: &str) -> Option<Vec<FriendPathNode>> {
        let entry = self.entries.get(id)?;

        let mut path = vec![entry.parent.clone()];
        let mut visited: HashSet<&str> = HashSet::from([id]);
        let mut current = entry.parent.user_id.as_str();

        while let Some(parent_entry) = self.entries.get(current) {
            if !visited.insert(current) {
                warn!(
                    "Parent cycle at {} while rebuilding path to {}",
                    current, id
                );
                break;
            }
            path.push(parent_entry.parent.clone());
            current = parent_entry.parent.user_id.as_str();
        }

        path.reverse();
        Some(path)
    }

    /// Cached suggestion with its reconstructed path.
    pub fn suggestion(&self, id: &str) -> Option<SuggestedProfile> {
        let entry = self.entries.get(id)?;
        Some(SuggestedProfile {
            data: entry.data.clone(),
            degree: entry.degree,
            friend_path: self.path_to(id)?,
        })
    }

    /// All cached suggestions ordered by ascending degree, ties by user id.
    pub fn ranked(&self) -> Vec<SuggestedProfile> {
        let mut ranked: Vec<SuggestedProfile> = self
            .entries
            .keys()
            .filter_map(|id| self.suggestion(id))
            .collect();
        ranked.sort_by(by_degree);
        ranked
    }

    // ------------------------------------------------------------------------
    // Staleness
    // ------------------------------------------------------------------------

    /// Whether the cache must be discarded and rebuilt for `user`.
    pub fn is_invalid(&self, user: &UserRecord) -> bool {
        self.is_invalid_at(user, Instant::now())
    }

    /// True when the cache is empty, older than the TTL, or `user` has
    /// unblocked someone since the last full rebuild.
    pub fn is_invalid_at(&self, user: &UserRecord, now: Instant) -> bool {
        if self.entries.is_empty() {
            return true;
        }

        let Some(last_rebuild) = self.last_rebuild else {
            return true;
        };
        if now.checked_duration_since(last_rebuild).is_some_and(|age| age > self.ttl) {
            debug!("Suggestion cache for {} expired", user.id);
            return true;
        }

        if let Some(unblocked) = self.blocked_snapshot.iter().find(|id| !user.has_blocked(id)) {
            debug!("{} unblocked {} since last rebuild", user.id, unblocked);
            return true;
        }

        false
    }

    /// Remember users blocked since the last rebuild so a later unblock of
    /// any of them is detected.
    pub fn record_blocked(&mut self, blocked: &BTreeSet<UserId>) {
        self.blocked_snapshot.extend(blocked.iter().cloned());
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Discard everything and run a full discovery for `user`.
    pub async fn rebuild<D>(
        &mut self,
        directory: &D,
        user: &UserRecord,
    ) -> DiscoveryResult<usize>
    where
        D: UserDirectory + ?Sized,
    {
        self.rebuild_at(directory, user, Instant::now()).await
    }

    pub async fn rebuild_at<D>(
        &mut self,
        directory: &D,
        user: &UserRecord,
        now: Instant,
    ) -> DiscoveryResult<usize>
    where
        D: UserDirectory + ?Sized,
    {
        let found = discover(directory, &user.id, None).await?;

        self.entries.clear();
        self.store(found.into_values());
        self.last_rebuild = Some(now);
        self.blocked_snapshot = user.blocked_users.clone();

        info!(
            "Rebuilt suggestion cache for {}: {} entries",
            user.id,
            self.entries.len()
        );
        Ok(self.entries.len())
    }

    /// Patch the cache after `user_id` gained `new_friends`.
    ///
    /// The new friends leave the cache, then discovery restricted to each of
    /// them is merged in. Entries whose path ran through a new friend may
    /// still have a route through another friend that no restricted run can
    /// see, so when any exist discovery is re-run from every friend instead.
    ///
    /// Nothing is committed unless every discovery run succeeds.
    pub async fn add_connections<D>(
        &mut self,
        directory: &D,
        user_id: &str,
        new_friends: &[UserId],
    ) -> DiscoveryResult<usize>
    where
        D: UserDirectory + ?Sized,
    {
        let doomed = self.reached_through(new_friends);
        let orphaned = doomed
            .iter()
            .filter(|id| !new_friends.contains(id))
            .count();

        if orphaned > 0 {
            let found = discover(directory, user_id, None).await?;
            self.entries.clear();
            self.store(found.into_values());

            info!(
                "Re-ran discovery for {}: {} entries were reached through new friends",
                user_id, orphaned
            );
            return Ok(self.entries.len());
        }

        let mut staged: Vec<HashMap<UserId, SuggestedProfile>> =
            Vec::with_capacity(new_friends.len());
        for friend_id in new_friends {
            staged.push(discover(directory, user_id, Some(friend_id)).await?);
        }

        for id in &doomed {
            self.entries.remove(id);
        }
        let before = self.entries.len();
        for found in staged {
            self.store(found.into_values());
        }

        info!(
            "Extended suggestion cache for {} with {} new friends ({} -> {} entries)",
            user_id,
            new_friends.len(),
            before,
            self.entries.len()
        );
        Ok(self.entries.len())
    }

    /// Remove `removed` users and every entry whose path ran through them.
    ///
    /// Returns the number of entries dropped.
    pub fn remove_connections(&mut self, removed: &[UserId]) -> usize {
        let doomed = self.reached_through(removed);
        for id in &doomed {
            self.entries.remove(id);
        }

        info!(
            "Pruned {} suggestion cache entries for {} removed users",
            doomed.len(),
            removed.len()
        );
        doomed.len()
    }

    /// Cached users among `ids`, plus every entry whose path runs through one
    /// of them.
    fn reached_through(&self, ids: &[UserId]) -> Vec<UserId> {
        let ids: HashSet<&str> = ids.iter().map(|id| id.as_str()).collect();
        let on_path =
            |path: Vec<FriendPathNode>| path.iter().any(|n| ids.contains(n.user_id.as_str()));

        self.entries
            .keys()
            .filter(|id| {
                ids.contains(id.as_str()) || self.path_to(id).is_some_and(&on_path)
            })
            .cloned()
            .collect()
    }
}
