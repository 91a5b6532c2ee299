//! Subscription system for live query results.
//!
//! Subscriptions deliver whole result sets, not deltas: every write to a
//! watched collection re-evaluates the subscribed query and queues the
//! complete answer.
//!
//! Subscriptions support:
//! - Equality-filtered, optionally ordered queries
//! - An initial snapshot on registration
//! - Bounded buffers with slow-subscriber dropping
//!
//! # Example
//!
//! ```ignore
//! let manager = SubscriptionManager::new();
//! let mut handle = manager.subscribe(Query::collection("channels/c1/messages"), current);
//!
//! while let Some(event) = handle.recv().await {
//!     match event {
//!         SnapshotEvent::Snapshot { documents } => println!("{} messages", documents.len()),
//!         SnapshotEvent::Dropped { reason } => break,
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::{SubscriptionManager, DEFAULT_BUFFER_SIZE};
pub use types::{DropReason, GatewaySubscription, SnapshotEvent, SubscriptionId};
