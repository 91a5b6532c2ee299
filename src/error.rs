//! Error types for the channel subsystem.

use crate::types::{ChannelId, MembershipId, UserId};
use std::fmt;
use thiserror::Error;

/// Failure reported by a [`StoreGateway`](crate::gateway::StoreGateway).
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Returned by `update_merge` when the target document does not exist.
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Subscription closed: {0}")]
    SubscriptionClosed(String),
}

impl GatewayError {
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        GatewayError::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound { .. })
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Serialization(e.to_string())
    }
}

/// The step of a multi-step operation that did complete before a later step failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletedStep {
    /// The channel record exists but its owner has no membership yet.
    ChannelCreated {
        channel_id: ChannelId,
        owner_id: UserId,
    },
}

impl fmt::Display for CompletedStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletedStep::ChannelCreated {
                channel_id,
                owner_id,
            } => write!(
                f,
                "channel {} created, but owner membership for {} was not assigned",
                channel_id, owner_id
            ),
        }
    }
}

/// Main error type for channel operations.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Channel not found: {0}")]
    ChannelNotFound(ChannelId),

    #[error("Membership not found: {0}")]
    MembershipNotFound(MembershipId),

    #[error("No authenticated caller")]
    Unauthenticated,

    #[error("Partial failure: {completed}: {source}")]
    PartialFailure {
        completed: CompletedStep,
        #[source]
        source: GatewayError,
    },

    #[error("Store error: {0}")]
    Store(#[from] GatewayError),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Malformed document {collection}/{id}: {reason}")]
    MalformedDocument {
        collection: String,
        id: String,
        reason: String,
    },
}

impl DirectoryError {
    /// The resumable step, if this is a partial failure.
    pub fn completed_step(&self) -> Option<&CompletedStep> {
        match self {
            DirectoryError::PartialFailure { completed, .. } => Some(completed),
            _ => None,
        }
    }
}

/// Result type for store gateway calls.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, DirectoryError>;
