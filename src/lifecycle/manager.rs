//! Channel lifecycle manager implementation.

use crate::config::DirectoryConfig;
use crate::error::{CompletedStep, DirectoryError, GatewayError, GatewayResult, Result};
use crate::gateway::{to_fields, Document, DocumentRef, Query, StoreGateway};
use crate::profiles::ChannelProfileMerger;
use crate::types::{
    collections, is_blank, Caller, Channel, ChannelId, ChannelProfile, ChannelUpdate,
    Membership, MembershipId, NewChannel, OverlayField, Role, Timestamp, UserId,
};
use futures_util::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;

/// What a cascading delete removed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CascadeSummary {
    /// Whether the channel record itself was present.
    pub channel_existed: bool,
    pub memberships_removed: usize,
    pub messages_removed: usize,
}

/// Creates, edits and deletes channels.
pub struct ChannelLifecycle {
    gateway: Arc<dyn StoreGateway>,
    profiles: Arc<ChannelProfileMerger>,
    lookup_concurrency: usize,
}

impl ChannelLifecycle {
    pub fn new(
        gateway: Arc<dyn StoreGateway>,
        profiles: Arc<ChannelProfileMerger>,
        config: &DirectoryConfig,
    ) -> Self {
        Self {
            gateway,
            profiles,
            lookup_concurrency: config.lookup_concurrency(),
        }
    }

    // --- Creation ---

    /// Create a channel owned by the caller and return its new ID.
    ///
    /// The channel and the owner membership are two separate writes. If the
    /// second fails the channel stays, and the error is a `PartialFailure`
    /// naming it so the caller can [`assign_owner`](Self::assign_owner) or
    /// delete it.
    pub async fn create_channel(&self, input: NewChannel, caller: &Caller) -> Result<ChannelId> {
        let owner_id = caller.require()?;
        if is_blank(Some(input.name.as_str())) {
            return Err(DirectoryError::InvalidOperation(
                "channel name must not be empty".to_string(),
            ));
        }

        let channel = Channel {
            id: ChannelId::default(),
            name: input.name.trim().to_string(),
            image_url: input.image_url.filter(|url| !url.trim().is_empty()),
            owner_id: owner_id.clone(),
            description: input.description,
            is_public: input.is_public,
            created_at: Timestamp::now(),
        };

        let id = self
            .gateway
            .create(collections::CHANNELS, to_fields(&channel)?, None)
            .await?;
        let channel_id = ChannelId::new(id);
        tracing::info!(channel = %channel_id, owner = %owner_id, "channel created");

        if let Err(source) = self.write_owner_membership(&channel_id, owner_id).await {
            tracing::warn!(
                channel = %channel_id,
                owner = %owner_id,
                error = %source,
                "owner membership write failed after channel creation"
            );
            return Err(DirectoryError::PartialFailure {
                completed: CompletedStep::ChannelCreated {
                    channel_id,
                    owner_id: owner_id.clone(),
                },
                source,
            });
        }

        Ok(channel_id)
    }

    /// Write the owner membership for an existing channel.
    ///
    /// This is the resume step after a `PartialFailure` from
    /// [`create_channel`](Self::create_channel). It is safe to repeat.
    pub async fn assign_owner(&self, channel_id: &ChannelId, owner_id: &UserId) -> Result<MembershipId> {
        let channel = self.get_channel(channel_id).await?;
        if &channel.owner_id != owner_id {
            return Err(DirectoryError::InvalidOperation(format!(
                "{} does not own channel {}",
                owner_id, channel_id
            )));
        }

        Ok(self.write_owner_membership(channel_id, owner_id).await?)
    }

    async fn write_owner_membership(
        &self,
        channel_id: &ChannelId,
        owner_id: &UserId,
    ) -> GatewayResult<MembershipId> {
        let membership = Membership::new(channel_id.clone(), owner_id.clone(), Role::Owner);
        self.gateway
            .create(
                collections::MEMBERSHIPS,
                to_fields(&membership)?,
                Some(membership.id.as_str()),
            )
            .await?;
        Ok(membership.id)
    }

    // --- Reads ---

    /// The base channel record, without overlay.
    pub async fn get_channel(&self, channel_id: &ChannelId) -> Result<Channel> {
        self.profiles
            .get_channel(channel_id)
            .await?
            .ok_or_else(|| DirectoryError::ChannelNotFound(channel_id.clone()))
    }

    // --- Updates ---

    /// Replace base channel fields.
    pub async fn update_channel(&self, channel_id: &ChannelId, mut update: ChannelUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }
        if let Some(ref mut name) = update.name {
            if is_blank(Some(name.as_str())) {
                return Err(DirectoryError::InvalidOperation(
                    "channel name must not be empty".to_string(),
                ));
            }
            *name = name.trim().to_string();
        }

        self.gateway
            .update_merge(collections::CHANNELS, channel_id.as_str(), to_fields(&update)?)
            .await
            .map_err(|e| match e {
                e if e.is_not_found() => DirectoryError::ChannelNotFound(channel_id.clone()),
                e => e.into(),
            })
    }

    /// Set one profile field in the channel's overlay.
    pub async fn update_overlay_field(
        &self,
        channel_id: &ChannelId,
        field: OverlayField,
        value: impl Into<String>,
    ) -> Result<()> {
        tracing::debug!(channel = %channel_id, field = field.field_name(), "updating overlay field");
        let mut patch = ChannelProfile::default();
        patch.set(field, value);
        self.update_overlay(channel_id, patch).await
    }

    /// Apply several profile fields to the channel's overlay.
    ///
    /// Tries a merge update first. If no overlay exists yet, a complete one is
    /// created from the base channel's current name, image and description
    /// with the patch applied on top.
    pub async fn update_overlay(&self, channel_id: &ChannelId, patch: ChannelProfile) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }

        let result = self
            .gateway
            .update_merge(
                collections::CHANNEL_PROFILES,
                channel_id.as_str(),
                to_fields(&patch)?,
            )
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => self.create_overlay(channel_id, &patch).await,
            Err(e) => Err(e.into()),
        }
    }

    async fn create_overlay(&self, channel_id: &ChannelId, patch: &ChannelProfile) -> Result<()> {
        let base = self.get_channel(channel_id).await?;

        let mut overlay = ChannelProfile::seeded_from(&base);
        overlay.apply(patch);

        self.gateway
            .create(
                collections::CHANNEL_PROFILES,
                to_fields(&overlay)?,
                Some(channel_id.as_str()),
            )
            .await?;

        tracing::info!(channel = %channel_id, "profile overlay created");
        Ok(())
    }

    // --- Deletion ---

    /// Delete a channel with its overlay, memberships and messages.
    ///
    /// Dependents are found first, then everything is removed in one atomic
    /// batch. A membership written between those two steps survives; see
    /// [`reconcile_orphans`](Self::reconcile_orphans). Deleting an absent
    /// channel still sweeps whatever dependents remain.
    pub async fn delete_channel_and_dependents(&self, channel_id: &ChannelId) -> Result<CascadeSummary> {
        let memberships_query = Query::collection(collections::MEMBERSHIPS)
            .where_eq("channel_id", channel_id.as_str());
        let messages_collection = collections::messages(channel_id);
        let messages_query = Query::collection(messages_collection.as_str());

        let (channel, memberships, messages) = futures_util::join!(
            self.gateway.get(collections::CHANNELS, channel_id.as_str()),
            self.gateway.query(&memberships_query),
            self.gateway.query(&messages_query)
        );
        let (channel, memberships, messages) = (channel?, memberships?, messages?);

        let mut refs: Vec<DocumentRef> = Vec::with_capacity(memberships.len() + messages.len() + 2);
        refs.extend(
            memberships
                .iter()
                .map(|doc| DocumentRef::new(collections::MEMBERSHIPS, doc.id.as_str())),
        );
        refs.extend(
            messages
                .iter()
                .map(|doc| DocumentRef::new(messages_collection.as_str(), doc.id.as_str())),
        );
        refs.push(DocumentRef::new(collections::CHANNEL_PROFILES, channel_id.as_str()));
        refs.push(DocumentRef::new(collections::CHANNELS, channel_id.as_str()));

        self.gateway.atomic_batch_delete(&refs).await?;

        let summary = CascadeSummary {
            channel_existed: channel.is_some(),
            memberships_removed: memberships.len(),
            messages_removed: messages.len(),
        };
        tracing::info!(
            channel = %channel_id,
            memberships = summary.memberships_removed,
            messages = summary.messages_removed,
            "channel deleted with dependents"
        );

        Ok(summary)
    }

    /// Delete memberships whose channel no longer exists.
    ///
    /// Never runs on its own; callers decide when to sweep. Returns the keys
    /// of the removed memberships.
    pub async fn reconcile_orphans(&self) -> Result<Vec<MembershipId>> {
        let memberships = self
            .gateway
            .query(&Query::collection(collections::MEMBERSHIPS))
            .await?;

        let channel_ids: BTreeSet<&str> = memberships
            .iter()
            .filter_map(|doc| channel_ref(doc))
            .collect();

        let missing: Vec<GatewayResult<Option<&str>>> = stream::iter(channel_ids)
            .map(|id| async move {
                let doc = self.gateway.get(collections::CHANNELS, id).await?;
                Ok::<_, GatewayError>(doc.is_none().then_some(id))
            })
            .buffer_unordered(self.lookup_concurrency)
            .collect()
            .await;

        let mut missing_channels = BTreeSet::new();
        for result in missing {
            if let Some(id) = result? {
                missing_channels.insert(id);
            }
        }

        let orphans: Vec<&Document> = memberships
            .iter()
            .filter(|doc| channel_ref(doc).map_or(true, |id| missing_channels.contains(id)))
            .collect();

        if orphans.is_empty() {
            return Ok(Vec::new());
        }

        let refs: Vec<DocumentRef> = orphans
            .iter()
            .map(|doc| DocumentRef::new(collections::MEMBERSHIPS, doc.id.as_str()))
            .collect();
        self.gateway.atomic_batch_delete(&refs).await?;

        tracing::warn!(count = refs.len(), "removed orphaned memberships");
        Ok(orphans
            .into_iter()
            .map(|doc| MembershipId::new(doc.id.clone()))
            .collect())
    }
}

/// Raw channel reference of a membership document.
fn channel_ref(doc: &Document) -> Option<&str> {
    doc.fields.get("channel_id").and_then(|v| v.as_str())
}
