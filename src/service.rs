//! Main service struct tying all components together.

use crate::config::DirectoryConfig;
use crate::feed::RealtimeFeed;
use crate::gateway::StoreGateway;
use crate::identity::IdentityResolver;
use crate::lifecycle::ChannelLifecycle;
use crate::membership::MembershipDirectory;
use crate::profiles::ChannelProfileMerger;
use std::sync::Arc;

/// The channel subsystem.
///
/// Provides a unified interface for:
/// - Following, unfollowing and listing members
/// - Reading channels merged with their profile overlays
/// - Creating, editing and deleting channels
/// - Live message feeds
///
/// All components share one gateway and hold no state of their own besides
/// the identity cache.
pub struct ChannelService {
    config: DirectoryConfig,
    gateway: Arc<dyn StoreGateway>,
    identity: Arc<IdentityResolver>,
    profiles: Arc<ChannelProfileMerger>,
    membership: MembershipDirectory,
    lifecycle: ChannelLifecycle,
    feed: RealtimeFeed,
}

impl ChannelService {
    pub fn new(gateway: Arc<dyn StoreGateway>) -> Self {
        Self::with_config(gateway, DirectoryConfig::default())
    }

    pub fn with_config(gateway: Arc<dyn StoreGateway>, config: DirectoryConfig) -> Self {
        let identity = Arc::new(IdentityResolver::new(Arc::clone(&gateway), &config));
        let profiles = Arc::new(ChannelProfileMerger::new(
            Arc::clone(&gateway),
            config.lookup_concurrency(),
        ));
        let membership = MembershipDirectory::new(
            Arc::clone(&gateway),
            Arc::clone(&identity),
            Arc::clone(&profiles),
            &config,
        );
        let lifecycle = ChannelLifecycle::new(Arc::clone(&gateway), Arc::clone(&profiles), &config);
        let feed = RealtimeFeed::new(Arc::clone(&gateway), Arc::clone(&profiles));

        tracing::debug!(
            max_concurrent_lookups = config.max_concurrent_lookups,
            identity_cache_size = config.identity_cache_size,
            "channel service ready"
        );

        Self {
            config,
            gateway,
            identity,
            profiles,
            membership,
            lifecycle,
            feed,
        }
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<dyn StoreGateway> {
        &self.gateway
    }

    pub fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    pub fn profiles(&self) -> &ChannelProfileMerger {
        &self.profiles
    }

    pub fn membership(&self) -> &MembershipDirectory {
        &self.membership
    }

    pub fn lifecycle(&self) -> &ChannelLifecycle {
        &self.lifecycle
    }

    pub fn feed(&self) -> &RealtimeFeed {
        &self.feed
    }
}
