//! Identity resolution with a bounded, process-wide cache.
//!
//! Lookups for an id that is not cached go to the platform client. Concurrent
//! misses for the same id may each hit the platform; the results are
//! identical so the last writer wins. Failures are never cached.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::LruCache;
use crate::error::{IdentityKind, IdentityLookupError};
use crate::traits::PlatformClient;
use crate::types::{Channel, User};

pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

pub struct IdentityResolver {
    client: Arc<dyn PlatformClient>,
    users: Mutex<LruCache<String, Arc<User>>>,
    channels: Mutex<LruCache<String, Arc<Channel>>>,
}

impl IdentityResolver {
    /// `capacity` bounds users and channels separately.
    pub fn new(client: Arc<dyn PlatformClient>, capacity: usize) -> Self {
        Self {
            client,
            users: Mutex::new(LruCache::new(capacity)),
            channels: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn resolve_user(&self, user_id: &str) -> Result<Arc<User>, IdentityLookupError> {
        if let Some(user) = self.users.lock().get(user_id) {
            return Ok(user);
        }

        let user = self
            .client
            .user_info(user_id)
            .await
            .map_err(|source| IdentityLookupError {
                kind: IdentityKind::User,
                id: user_id.to_string(),
                source,
            })?;

        let user = Arc::new(user);
        self.users.lock().insert(user_id.to_string(), user.clone());
        tracing::debug!(user = %user_id, name = %user.name, "Cached user identity");
        Ok(user)
    }

    pub async fn resolve_channel(
        &self,
        channel_id: &str,
    ) -> Result<Arc<Channel>, IdentityLookupError> {
        if let Some(channel) = self.channels.lock().get(channel_id) {
            return Ok(channel);
        }

        let channel = self
            .client
            .channel_info(channel_id)
            .await
            .map_err(|source| IdentityLookupError {
                kind: IdentityKind::Channel,
                id: channel_id.to_string(),
                source,
            })?;

        let channel = Arc::new(channel);
        self.channels
            .lock()
            .insert(channel_id.to_string(), channel.clone());
        tracing::debug!(channel = %channel_id, name = %channel.name, "Cached channel identity");
        Ok(channel)
    }

    /// Number of cached users and channels.
    pub fn cached(&self) -> (usize, usize) {
        (self.users.lock().len(), self.channels.lock().len())
    }
}
