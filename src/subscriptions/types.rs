//! Subscription types for live query results.

use crate::gateway::Document;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Events emitted by a gateway subscription.
#[derive(Clone, Debug)]
pub enum SnapshotEvent {
    /// Full current result set of the subscribed query.
    Snapshot { documents: Vec<Document> },

    /// Subscription was dropped. Nothing follows this event.
    ///
    /// A subscriber dropped for falling behind gets no event; its receiver
    /// just closes.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Backend failure.
    Error(String),
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Receiving end of a gateway subscription.
#[derive(Debug)]
pub struct GatewaySubscription {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: mpsc::Receiver<SnapshotEvent>,
}

impl GatewaySubscription {
    /// Receive the next event. `None` once the sender side is gone.
    pub async fn recv(&mut self) -> Option<SnapshotEvent> {
        self.receiver.recv().await
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&mut self) -> Result<SnapshotEvent, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<SnapshotEvent>> {
        self.receiver.poll_recv(cx)
    }
}
