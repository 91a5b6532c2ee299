//! Display identity resolution for channel members.

use crate::config::DirectoryConfig;
use crate::error::Result;
use crate::gateway::{decode_document, StoreGateway};
use crate::types::{collections, is_blank, UserId, UserProfileSummary};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// A user's display identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// Resolves user IDs to display names and avatars.
///
/// Found profiles are cached; misses are not, so a profile created later is
/// picked up on the next lookup.
pub struct IdentityResolver {
    gateway: Arc<dyn StoreGateway>,
    cache: Option<Mutex<LruCache<UserId, UserProfileSummary>>>,
    unknown_user_name: String,
    placeholder_id_len: usize,
}

impl IdentityResolver {
    pub fn new(gateway: Arc<dyn StoreGateway>, config: &DirectoryConfig) -> Self {
        let cache = NonZeroUsize::new(config.identity_cache_size)
            .map(|capacity| Mutex::new(LruCache::new(capacity)));

        Self {
            gateway,
            cache,
            unknown_user_name: config.unknown_user_name.clone(),
            placeholder_id_len: config.placeholder_id_len,
        }
    }

    /// Read a user's profile. `None` if the user has no profile document.
    pub async fn lookup(&self, user_id: &UserId) -> Result<Option<UserProfileSummary>> {
        if let Some(ref cache) = self.cache {
            if let Some(profile) = cache.lock().get(user_id) {
                return Ok(Some(profile.clone()));
            }
        }

        let Some(doc) = self
            .gateway
            .get(collections::USER_PROFILES, user_id.as_str())
            .await?
        else {
            return Ok(None);
        };

        let mut profile: UserProfileSummary = decode_document(collections::USER_PROFILES, &doc)?;
        profile.user_id = user_id.clone();

        if let Some(ref cache) = self.cache {
            cache.lock().put(user_id.clone(), profile.clone());
        }

        Ok(Some(profile))
    }

    /// Resolve a display identity. Never fails: a missing profile, a blank
    /// name or a store failure all yield the unknown-user name.
    pub async fn resolve_user(&self, user_id: &UserId) -> ResolvedIdentity {
        match self.lookup(user_id).await {
            Ok(Some(profile)) => {
                let display_name = if is_blank(Some(profile.display_name.as_str())) {
                    self.unknown_user_name.clone()
                } else {
                    profile.display_name
                };
                ResolvedIdentity {
                    display_name,
                    avatar_url: profile.avatar_url.filter(|url| !url.trim().is_empty()),
                }
            }
            Ok(None) => self.unknown(),
            Err(e) => {
                tracing::debug!(user = %user_id, error = %e, "identity lookup failed");
                self.unknown()
            }
        }
    }

    /// Stand-in name built from the start of the user ID.
    pub fn placeholder_name(&self, user_id: &UserId) -> String {
        let prefix: String = user_id
            .as_str()
            .chars()
            .take(self.placeholder_id_len)
            .collect();
        format!("User {}", prefix)
    }

    /// Forget a cached profile (e.g. after the user edited it).
    pub fn invalidate(&self, user_id: &UserId) {
        if let Some(ref cache) = self.cache {
            cache.lock().pop(user_id);
        }
    }

    fn unknown(&self) -> ResolvedIdentity {
        ResolvedIdentity {
            display_name: self.unknown_user_name.clone(),
            avatar_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{to_fields, MemoryStore, Operation};
    use serde_json::json;

    async fn store_with_alice() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .create(
                collections::USER_PROFILES,
                to_fields(&json!({"display_name": "Alice", "avatar_url": "https://a/img.png"}))
                    .unwrap(),
                Some("u1"),
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_resolve_existing_user() {
        let store = store_with_alice().await;
        let resolver = IdentityResolver::new(store, &DirectoryConfig::default());

        let identity = resolver.resolve_user(&"u1".into()).await;
        assert_eq!(identity.display_name, "Alice");
        assert_eq!(identity.avatar_url.as_deref(), Some("https://a/img.png"));
    }

    #[tokio::test]
    async fn test_missing_profile_is_unknown_user() {
        let store = Arc::new(MemoryStore::new());
        let resolver = IdentityResolver::new(store, &DirectoryConfig::default());

        let identity = resolver.resolve_user(&"ghost".into()).await;
        assert_eq!(identity.display_name, "Unknown User");
        assert_eq!(identity.avatar_url, None);
    }

    #[tokio::test]
    async fn test_store_failure_is_unknown_user() {
        let store = store_with_alice().await;
        store.inject_fault(Operation::Get, collections::USER_PROFILES);
        let resolver = IdentityResolver::new(store.clone(), &DirectoryConfig::default());

        let identity = resolver.resolve_user(&"u1".into()).await;
        assert_eq!(identity.display_name, "Unknown User");
        assert!(resolver.lookup(&"u1".into()).await.is_err());
    }

    #[tokio::test]
    async fn test_cache_serves_after_store_failure() {
        let store = store_with_alice().await;
        let resolver = IdentityResolver::new(store.clone(), &DirectoryConfig::default());

        resolver.resolve_user(&"u1".into()).await;
        store.inject_fault(Operation::Get, collections::USER_PROFILES);

        let identity = resolver.resolve_user(&"u1".into()).await;
        assert_eq!(identity.display_name, "Alice");

        resolver.invalidate(&"u1".into());
        let identity = resolver.resolve_user(&"u1".into()).await;
        assert_eq!(identity.display_name, "Unknown User");
    }

    #[tokio::test]
    async fn test_cache_disabled() {
        let store = store_with_alice().await;
        let config = DirectoryConfig {
            identity_cache_size: 0,
            ..Default::default()
        };
        let resolver = IdentityResolver::new(store.clone(), &config);

        resolver.resolve_user(&"u1".into()).await;
        store.inject_fault(Operation::Get, collections::USER_PROFILES);
        assert!(resolver.lookup(&"u1".into()).await.is_err());
    }

    #[test]
    fn test_placeholder_name() {
        let store = Arc::new(MemoryStore::new());
        let resolver = IdentityResolver::new(store, &DirectoryConfig::default());

        assert_eq!(resolver.placeholder_name(&"a1b2c3d4e5".into()), "User a1b2c3");
        assert_eq!(resolver.placeholder_name(&"u2".into()), "User u2");
    }
}
