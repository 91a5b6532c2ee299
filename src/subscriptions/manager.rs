//! Subscription manager for broadcasting query snapshots.

use crate::gateway::{Document, Query};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError, Sender};

use super::types::{DropReason, GatewaySubscription, SnapshotEvent, SubscriptionId};

/// Default per-subscription buffer (events).
pub const DEFAULT_BUFFER_SIZE: usize = 64;

/// Internal subscription state.
struct Subscription {
    query: Query,
    sender: Sender<SnapshotEvent>,
}

impl Subscription {
    /// Try to send an event. Returns false if the subscriber should be dropped.
    fn try_send(&self, event: SnapshotEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => false,
        }
    }

    fn watches(&self, collection: &str) -> bool {
        self.query.collection == collection
    }
}

/// Manages live query subscriptions.
///
/// The owner of the data calls [`broadcast`](Self::broadcast) after every
/// write with a function that evaluates a query against current state.
pub struct SubscriptionManager {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
    /// Queue capacity per subscriber.
    buffer_size: usize,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Register a subscription and queue its initial snapshot.
    pub fn subscribe(&self, query: Query, initial: Vec<Document>) -> GatewaySubscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = mpsc::channel(self.buffer_size);

        let subscription = Subscription { query, sender };
        // Fresh channel with capacity >= 1, so the initial snapshot always fits.
        subscription.try_send(SnapshotEvent::Snapshot { documents: initial });

        self.subscriptions.write().insert(id, subscription);

        GatewaySubscription { id, receiver }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.subscriptions.write();
        if let Some(sub) = subs.remove(&id) {
            // Send dropped event (best effort)
            let _ = sub.sender.try_send(SnapshotEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Push a fresh snapshot to every subscription on `collection`.
    ///
    /// Subscribers whose buffer is full are dropped; their receivers close.
    pub fn broadcast<F>(&self, collection: &str, evaluate: F)
    where
        F: Fn(&Query) -> Vec<Document>,
    {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter().filter(|(_, sub)| sub.watches(collection)) {
                let documents = evaluate(&sub.query);
                if !sub.try_send(SnapshotEvent::Snapshot { documents }) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for id in to_remove {
                if subs.remove(&id).is_some() {
                    tracing::warn!(subscription = id.0, collection, "dropping slow subscriber");
                }
            }
        }
    }

    /// Drop every subscription on `collection` with an error reason.
    pub fn fail_collection(&self, collection: &str, reason: &str) -> usize {
        let mut subs = self.subscriptions.write();
        let failed: Vec<SubscriptionId> = subs
            .iter()
            .filter(|(_, sub)| sub.watches(collection))
            .map(|(id, _)| *id)
            .collect();

        for id in &failed {
            if let Some(sub) = subs.remove(id) {
                let _ = sub.sender.try_send(SnapshotEvent::Dropped {
                    reason: DropReason::Error(reason.to_string()),
                });
            }
        }

        failed.len()
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Fields;

    fn make_doc(id: &str) -> Document {
        Document::new(id, Fields::new())
    }

    fn snapshot_ids(event: SnapshotEvent) -> Vec<String> {
        match event {
            SnapshotEvent::Snapshot { documents } => documents.into_iter().map(|d| d.id).collect(),
            other => panic!("Expected Snapshot event, got {:?}", other),
        }
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let manager = SubscriptionManager::new();

        let mut handle = manager.subscribe(Query::collection("messages"), vec![]);
        assert_eq!(manager.subscription_count(), 1);
        assert!(snapshot_ids(handle.try_recv().unwrap()).is_empty());

        manager.unsubscribe(handle.id);
        assert_eq!(manager.subscription_count(), 0);

        match handle.try_recv().unwrap() {
            SnapshotEvent::Dropped { reason } => assert_eq!(reason, DropReason::Unsubscribed),
            other => panic!("Expected Dropped event, got {:?}", other),
        }
    }

    #[test]
    fn test_broadcast_to_matching_collection() {
        let manager = SubscriptionManager::new();

        let mut messages = manager.subscribe(Query::collection("messages"), vec![]);
        let mut channels = manager.subscribe(Query::collection("channels"), vec![]);
        messages.try_recv().unwrap();
        channels.try_recv().unwrap();

        manager.broadcast("messages", |_| vec![make_doc("m1")]);

        assert_eq!(snapshot_ids(messages.try_recv().unwrap()), vec!["m1"]);
        assert!(channels.try_recv().is_err());
    }

    #[test]
    fn test_drop_slow_subscriber() {
        let manager = SubscriptionManager::with_buffer_size(2);
        let _handle = manager.subscribe(Query::collection("messages"), vec![]);

        // Initial snapshot occupies one slot; flood the rest.
        for _ in 0..10 {
            manager.broadcast("messages", |_| vec![make_doc("m1")]);
        }

        assert_eq!(manager.subscription_count(), 0);
    }

    #[test]
    fn test_fail_collection() {
        let manager = SubscriptionManager::new();
        let mut handle = manager.subscribe(Query::collection("messages"), vec![]);
        let _other = manager.subscribe(Query::collection("channels"), vec![]);
        handle.try_recv().unwrap();

        assert_eq!(manager.fail_collection("messages", "backend gone"), 1);
        assert_eq!(manager.subscription_count(), 1);

        match handle.try_recv().unwrap() {
            SnapshotEvent::Dropped { reason } => {
                assert_eq!(reason, DropReason::Error("backend gone".to_string()))
            }
            other => panic!("Expected Dropped event, got {:?}", other),
        }
    }
}
