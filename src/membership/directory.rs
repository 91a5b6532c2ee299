//! Membership directory implementation.

use crate::config::DirectoryConfig;
use crate::error::{DirectoryError, Result};
use crate::gateway::{decode_document, to_fields, Document, Query, StoreGateway};
use crate::identity::IdentityResolver;
use crate::profiles::{ChannelProfileMerger, ChannelView};
use crate::types::{
    collections, is_blank, Caller, ChannelId, Membership, MembershipId, Role, Timestamp, UserId,
};
use futures_util::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;

/// A channel member with display data attached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelMember {
    pub membership_id: MembershipId,
    pub user_id: UserId,
    pub role: Role,
    pub joined_at: Timestamp,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

fn decode_membership(doc: &Document) -> Result<Membership> {
    let mut membership: Membership = decode_document(collections::MEMBERSHIPS, doc)?;
    membership.id = MembershipId::new(doc.id.clone());
    Ok(membership)
}

/// Owns the channel <-> user relationships.
pub struct MembershipDirectory {
    gateway: Arc<dyn StoreGateway>,
    identity: Arc<IdentityResolver>,
    profiles: Arc<ChannelProfileMerger>,
    lookup_concurrency: usize,
}

impl MembershipDirectory {
    pub fn new(
        gateway: Arc<dyn StoreGateway>,
        identity: Arc<IdentityResolver>,
        profiles: Arc<ChannelProfileMerger>,
        config: &DirectoryConfig,
    ) -> Self {
        Self {
            gateway,
            identity,
            profiles,
            lookup_concurrency: config.lookup_concurrency(),
        }
    }

    /// Read a membership by its key.
    pub async fn get_membership(&self, membership_id: &MembershipId) -> Result<Option<Membership>> {
        self.gateway
            .get(collections::MEMBERSHIPS, membership_id.as_str())
            .await?
            .map(|doc| decode_membership(&doc))
            .transpose()
    }

    /// Follow a channel as the calling user.
    ///
    /// Idempotent: the membership key is derived from the (user, channel)
    /// pair, so repeated or concurrent calls converge on one record. An
    /// existing membership is left as it is.
    pub async fn follow(&self, channel_id: &ChannelId, caller: &Caller) -> Result<MembershipId> {
        let user_id = caller.require()?;
        let membership_id = MembershipId::for_pair(user_id, channel_id);

        let (existing, channel) = futures_util::join!(
            self.get_membership(&membership_id),
            self.profiles.get_channel(channel_id)
        );

        if existing?.is_some() {
            tracing::debug!(channel = %channel_id, user = %user_id, "already following");
            return Ok(membership_id);
        }
        let channel =
            channel?.ok_or_else(|| DirectoryError::ChannelNotFound(channel_id.clone()))?;

        // The owner key may be missing after a partial create; never demote the owner.
        let role = if &channel.owner_id == user_id {
            Role::Owner
        } else {
            Role::Member
        };
        let membership = Membership::new(channel_id.clone(), user_id.clone(), role);
        self.gateway
            .create(
                collections::MEMBERSHIPS,
                to_fields(&membership)?,
                Some(membership_id.as_str()),
            )
            .await?;

        tracing::debug!(channel = %channel_id, user = %user_id, "followed channel");
        Ok(membership_id)
    }

    /// Stop following a channel. Succeeds if the caller was not following.
    ///
    /// Owners cannot unfollow; their membership goes away with the channel.
    pub async fn unfollow(&self, channel_id: &ChannelId, caller: &Caller) -> Result<()> {
        let user_id = caller.require()?;
        let membership_id = MembershipId::for_pair(user_id, channel_id);

        match self.get_membership(&membership_id).await? {
            None => Ok(()),
            Some(m) if m.role == Role::Owner => Err(DirectoryError::InvalidOperation(format!(
                "owner {} cannot unfollow channel {}",
                user_id, channel_id
            ))),
            Some(_) => {
                self.gateway
                    .delete(collections::MEMBERSHIPS, membership_id.as_str())
                    .await?;
                tracing::debug!(channel = %channel_id, user = %user_id, "unfollowed channel");
                Ok(())
            }
        }
    }

    /// Remove a member by membership key (moderator action).
    pub async fn remove_member(&self, membership_id: &MembershipId) -> Result<()> {
        let membership = self
            .get_membership(membership_id)
            .await?
            .ok_or_else(|| DirectoryError::MembershipNotFound(membership_id.clone()))?;

        if membership.role == Role::Owner {
            return Err(DirectoryError::InvalidOperation(format!(
                "cannot remove the owner of channel {}",
                membership.channel_id
            )));
        }

        self.gateway
            .delete(collections::MEMBERSHIPS, membership_id.as_str())
            .await?;

        tracing::debug!(
            channel = %membership.channel_id,
            user = %membership.user_id,
            "member removed"
        );
        Ok(())
    }

    pub async fn is_following(&self, channel_id: &ChannelId, user_id: &UserId) -> Result<bool> {
        let membership_id = MembershipId::for_pair(user_id, channel_id);
        Ok(self.get_membership(&membership_id).await?.is_some())
    }

    /// Every membership of a channel, undecorated.
    pub async fn memberships_of(&self, channel_id: &ChannelId) -> Result<Vec<Membership>> {
        let query = Query::collection(collections::MEMBERSHIPS)
            .where_eq("channel_id", channel_id.as_str());

        self.gateway
            .query(&query)
            .await?
            .iter()
            .map(decode_membership)
            .collect()
    }

    pub async fn member_count(&self, channel_id: &ChannelId) -> Result<usize> {
        Ok(self.memberships_of(channel_id).await?.len())
    }

    /// IDs of every channel the user follows or owns.
    pub async fn list_followed_channel_ids(&self, user_id: &UserId) -> Result<BTreeSet<ChannelId>> {
        let query =
            Query::collection(collections::MEMBERSHIPS).where_eq("user_id", user_id.as_str());

        self.gateway
            .query(&query)
            .await?
            .iter()
            .map(|doc| decode_membership(doc).map(|m| m.channel_id))
            .collect()
    }

    /// Merged views of every channel the user follows.
    pub async fn list_followed_channels(&self, user_id: &UserId) -> Result<Vec<ChannelView>> {
        let ids: Vec<ChannelId> = self
            .list_followed_channel_ids(user_id)
            .await?
            .into_iter()
            .collect();
        self.profiles.get_merged_channels(&ids).await
    }

    /// Members of a channel with display names, in no particular order.
    ///
    /// Identity lookups run concurrently, at most `max_concurrent_lookups` at
    /// a time. A member whose profile is missing or whose lookup fails gets a
    /// placeholder name; only the membership query itself can fail the call.
    pub async fn list_members(&self, channel_id: &ChannelId) -> Result<Vec<ChannelMember>> {
        let memberships = self.memberships_of(channel_id).await?;

        let members = stream::iter(memberships)
            .map(|membership| self.decorate(membership))
            .buffer_unordered(self.lookup_concurrency)
            .collect::<Vec<_>>()
            .await;

        Ok(members)
    }

    async fn decorate(&self, membership: Membership) -> ChannelMember {
        let (display_name, avatar_url) = match self.identity.lookup(&membership.user_id).await {
            Ok(Some(profile)) if !is_blank(Some(profile.display_name.as_str())) => (
                profile.display_name,
                profile.avatar_url.filter(|url| !url.trim().is_empty()),
            ),
            Ok(_) => {
                tracing::debug!(user = %membership.user_id, "no profile, using placeholder");
                (self.identity.placeholder_name(&membership.user_id), None)
            }
            Err(e) => {
                tracing::debug!(
                    user = %membership.user_id,
                    error = %e,
                    "identity lookup failed, using placeholder"
                );
                (self.identity.placeholder_name(&membership.user_id), None)
            }
        };

        ChannelMember {
            membership_id: membership.id,
            user_id: membership.user_id,
            role: membership.role,
            joined_at: membership.joined_at,
            display_name,
            avatar_url,
        }
    }
}
