//! Merging base channel records with their profile overlays.

use crate::error::{DirectoryError, Result};
use crate::gateway::{decode_document, StoreGateway};
use crate::types::{collections, is_blank, Channel, ChannelId, ChannelProfile, Timestamp, UserId};
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;

/// Authoritative read view of a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelView {
    pub id: ChannelId,
    pub name: String,
    pub image_url: Option<String>,
    pub description: String,
    pub owner_id: UserId,
    pub is_public: bool,
    pub created_at: Timestamp,
    /// Whether any overlay value took precedence over the base record.
    pub has_overlay: bool,
}

/// Pick the overlay value if present and non-blank, else the base value.
fn prefer(overlay: Option<&String>, base: Option<&String>) -> Option<String> {
    if is_blank(overlay.map(String::as_str)) {
        base.cloned()
    } else {
        overlay.cloned()
    }
}

/// Combine a base channel and its optional overlay.
///
/// Only name, image and description are overlaid. Ownership, visibility and
/// creation time always come from the base record.
pub fn merge(base: &Channel, overlay: Option<&ChannelProfile>) -> ChannelView {
    let empty = ChannelProfile::default();
    let profile = overlay.unwrap_or(&empty);

    let name = prefer(profile.name.as_ref(), Some(&base.name)).unwrap_or_default();
    let image_url = prefer(profile.image_url.as_ref(), base.image_url.as_ref());
    let description =
        prefer(profile.description.as_ref(), Some(&base.description)).unwrap_or_default();

    let has_overlay = name != base.name
        || image_url != base.image_url
        || description != base.description;

    ChannelView {
        id: base.id.clone(),
        name,
        image_url,
        description,
        owner_id: base.owner_id.clone(),
        is_public: base.is_public,
        created_at: base.created_at,
        has_overlay,
    }
}

/// Produces merged channel views from the store.
pub struct ChannelProfileMerger {
    gateway: Arc<dyn StoreGateway>,
    /// Max merged reads in flight for batch reads.
    concurrency: usize,
}

impl ChannelProfileMerger {
    pub fn new(gateway: Arc<dyn StoreGateway>, concurrency: usize) -> Self {
        Self {
            gateway,
            concurrency: concurrency.max(1),
        }
    }

    /// Read a base channel record.
    pub async fn get_channel(&self, channel_id: &ChannelId) -> Result<Option<Channel>> {
        let Some(doc) = self
            .gateway
            .get(collections::CHANNELS, channel_id.as_str())
            .await?
        else {
            return Ok(None);
        };

        let mut channel: Channel = decode_document(collections::CHANNELS, &doc)?;
        channel.id = channel_id.clone();
        Ok(Some(channel))
    }

    /// Read a channel's overlay, if anyone has edited it.
    pub async fn get_overlay(&self, channel_id: &ChannelId) -> Result<Option<ChannelProfile>> {
        match self
            .gateway
            .get(collections::CHANNEL_PROFILES, channel_id.as_str())
            .await?
        {
            Some(doc) => Ok(Some(decode_document(collections::CHANNEL_PROFILES, &doc)?)),
            None => Ok(None),
        }
    }

    /// Fetch base and overlay concurrently and merge them.
    pub async fn get_merged_channel(&self, channel_id: &ChannelId) -> Result<ChannelView> {
        let (base, overlay) =
            futures_util::join!(self.get_channel(channel_id), self.get_overlay(channel_id));

        let base = base?.ok_or_else(|| DirectoryError::ChannelNotFound(channel_id.clone()))?;
        let overlay = overlay?;

        Ok(merge(&base, overlay.as_ref()))
    }

    /// Merged views for every listed channel that exists, in input order.
    pub async fn get_merged_channels(&self, channel_ids: &[ChannelId]) -> Result<Vec<ChannelView>> {
        let results: Vec<_> = stream::iter(channel_ids)
            .map(|id| self.get_merged_channel(id))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut views = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(view) => views.push(view),
                Err(DirectoryError::ChannelNotFound(id)) => {
                    tracing::debug!(channel = %id, "skipping vanished channel");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(views)
    }
}
