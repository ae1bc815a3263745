//! Per-user discovery session owning the suggestion cache.
//!
//! Every call takes the cache lock for its whole duration, so at most one
//! rebuild or incremental update is in flight per session.

use tokio::sync::Mutex;

use log::debug;

use super::cache::SuggestionCache;
use super::{DiscoveryConfig, SuggestedProfile};
use crate::collaborators::UserDirectory;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::{FriendPathNode, UserId, UserRecord};

pub struct DiscoverySession<D> {
    directory: D,
    user_id: UserId,
    cache: Mutex<SuggestionCache>,
}

impl<D: UserDirectory> DiscoverySession<D> {
    pub fn new(directory: D, user_id: impl Into<UserId>, config: &DiscoveryConfig) -> Self {
        Self {
            directory,
            user_id: user_id.into(),
            cache: Mutex::new(SuggestionCache::new(config)),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Ranked suggestions, rebuilding the cache first if it is stale.
    pub async fn suggestions(&self) -> DiscoveryResult<Vec<SuggestedProfile>> {
        let mut cache = self.cache.lock().await;
        let user = self.current_user().await?;

        if cache.is_invalid(&user) {
            cache.rebuild(&self.directory, &user).await?;
        } else {
            debug!(
                "Serving {} suggestions for {} from cache",
                cache.len(),
                user.id
            );
        }

        Ok(cache.ranked())
    }

    /// Force a full rebuild.
    pub async fn rebuild(&self) -> DiscoveryResult<usize> {
        let mut cache = self.cache.lock().await;
        let user = self.current_user().await?;
        cache.rebuild(&self.directory, &user).await
    }

    /// Patch the cache after the user gained `new_friends`.
    ///
    /// A cache that was never built is rebuilt in full instead.
    pub async fn add_connections(&self, new_friends: &[UserId]) -> DiscoveryResult<usize> {
        let mut cache = self.cache.lock().await;
        let user = self.current_user().await?;

        if cache.last_rebuild().is_none() {
            return cache.rebuild(&self.directory, &user).await;
        }

        let len = cache.add_connections(&self.directory, &user.id, new_friends).await?;
        cache.record_blocked(&user.blocked_users);
        Ok(len)
    }

    /// Patch the cache after `removed` users were unfriended or blocked.
    pub async fn remove_connections(&self, removed: &[UserId]) -> DiscoveryResult<usize> {
        let mut cache = self.cache.lock().await;
        let user = self.current_user().await?;

        let dropped = cache.remove_connections(removed);
        cache.record_blocked(&user.blocked_users);
        Ok(dropped)
    }

    /// Friend path to a cached suggestion.
    pub async fn path_to(&self, id: &str) -> Option<Vec<FriendPathNode>> {
        self.cache.lock().await.path_to(id)
    }

    async fn current_user(&self) -> DiscoveryResult<UserRecord> {
        self.directory
            .fetch_user(&self.user_id)
            .await?
            .ok_or_else(|| DiscoveryError::UserNotFound(self.user_id.clone()))
    }
}
