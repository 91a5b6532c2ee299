//! # Channel Kit
//!
//! Channels, memberships and profile overlays on top of a pluggable document
//! store.
//!
//! ## Core Concepts
//!
//! - **Channels**: Named groups with exactly one owner
//! - **Memberships**: One record per (user, channel) pair, keyed deterministically
//! - **Overlays**: Editable profile fields layered over the creation record
//! - **Cascades**: Deleting a channel removes everything that references it
//! - **Feeds**: Live, full-snapshot message streams
//!
//! ## Example
//!
//! ```ignore
//! use channelkit::{Caller, ChannelService, MemoryStore, NewChannel, OverlayField};
//! use std::sync::Arc;
//!
//! let service = ChannelService::new(Arc::new(MemoryStore::new()));
//! let owner = Caller::user("u1");
//!
//! let channel_id = service
//!     .lifecycle()
//!     .create_channel(NewChannel::new("Retro Films", "", true), &owner)
//!     .await?;
//!
//! service.membership().follow(&channel_id, &Caller::user("u2")).await?;
//! service
//!     .lifecycle()
//!     .update_overlay_field(&channel_id, OverlayField::Description, "Old movies")
//!     .await?;
//!
//! let view = service.profiles().get_merged_channel(&channel_id).await?;
//! let members = service.membership().list_members(&channel_id).await?;
//! ```

pub mod config;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod identity;
pub mod lifecycle;
pub mod membership;
pub mod profiles;
pub mod service;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use config::DirectoryConfig;
pub use error::{CompletedStep, DirectoryError, GatewayError, GatewayResult, Result};
pub use feed::{MessageFeed, RealtimeFeed};
pub use gateway::{
    to_fields, Document, DocumentRef, Fields, MemoryStore, MemoryStoreConfig, Operation, Query,
    StoreGateway,
};
pub use identity::{IdentityResolver, ResolvedIdentity};
pub use lifecycle::{CascadeSummary, ChannelLifecycle};
pub use membership::{ChannelMember, MembershipDirectory};
pub use profiles::{merge, ChannelProfileMerger, ChannelView};
pub use service::ChannelService;
pub use subscriptions::{
    DropReason, GatewaySubscription, SnapshotEvent, SubscriptionId, SubscriptionManager,
};
pub use types::*;
