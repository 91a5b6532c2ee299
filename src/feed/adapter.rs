//! Live message feeds for channels.

use crate::error::{DirectoryError, GatewayError, Result};
use crate::gateway::{to_fields, Document, Query, StoreGateway};
use crate::profiles::ChannelProfileMerger;
use crate::subscriptions::{DropReason, GatewaySubscription, SnapshotEvent};
use crate::types::{collections, is_blank, Caller, ChannelId, Message, MessageId, Timestamp};
use futures_util::stream::{FusedStream, Stream};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

/// Decode a message snapshot, oldest first. Undecodable documents are skipped.
fn decode_messages(collection: &str, documents: Vec<Document>) -> Vec<Message> {
    let mut messages: Vec<Message> = documents
        .into_iter()
        .filter_map(|doc| match doc.decode::<Message>() {
            Ok(mut message) => {
                message.id = MessageId::new(doc.id);
                Some(message)
            }
            Err(e) => {
                tracing::warn!(collection, id = %doc.id, error = %e, "skipping undecodable message");
                None
            }
        })
        .collect();
    messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    messages
}

fn messages_query(channel_id: &ChannelId) -> Query {
    Query::collection(collections::messages(channel_id)).order_by("timestamp")
}

/// Live, ordered view of a channel's messages.
///
/// Each item is the complete message list at that moment. The stream ends
/// quietly when unsubscribed and with one `Err` item when the upstream
/// subscription fails. It cannot be restarted; subscribe again instead.
pub struct MessageFeed {
    gateway: Arc<dyn StoreGateway>,
    channel_id: ChannelId,
    collection: String,
    subscription: Option<GatewaySubscription>,
}

impl MessageFeed {
    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    /// Stop receiving snapshots. Dropping the feed does the same.
    pub fn unsubscribe(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.gateway.unsubscribe(subscription.id);
            tracing::debug!(channel = %self.channel_id, "message feed closed");
        }
    }
}

impl Drop for MessageFeed {
    fn drop(&mut self) {
        self.close();
    }
}

impl Stream for MessageFeed {
    type Item = Result<Vec<Message>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let Some(subscription) = this.subscription.as_mut() else {
            return Poll::Ready(None);
        };

        let failure = match ready!(subscription.poll_recv(cx)) {
            Some(SnapshotEvent::Snapshot { documents }) => {
                return Poll::Ready(Some(Ok(decode_messages(&this.collection, documents))));
            }
            Some(SnapshotEvent::Dropped {
                reason: DropReason::Unsubscribed,
            }) => {
                this.subscription = None;
                return Poll::Ready(None);
            }
            Some(SnapshotEvent::Dropped {
                reason: DropReason::Error(reason),
            }) => reason,
            None => "upstream closed the subscription".to_string(),
        };

        this.subscription = None;
        tracing::warn!(channel = %this.channel_id, reason = %failure, "message feed failed");
        Poll::Ready(Some(Err(GatewayError::SubscriptionClosed(failure).into())))
    }
}

impl FusedStream for MessageFeed {
    fn is_terminated(&self) -> bool {
        self.subscription.is_none()
    }
}

/// Channel message streams and posting.
pub struct RealtimeFeed {
    gateway: Arc<dyn StoreGateway>,
    profiles: Arc<ChannelProfileMerger>,
}

impl RealtimeFeed {
    pub fn new(gateway: Arc<dyn StoreGateway>, profiles: Arc<ChannelProfileMerger>) -> Self {
        Self { gateway, profiles }
    }

    /// Open a live feed of a channel's messages. The first item is the
    /// current list.
    pub async fn subscribe(&self, channel_id: &ChannelId) -> Result<MessageFeed> {
        let query = messages_query(channel_id);
        let subscription = self.gateway.subscribe(&query).await?;
        tracing::debug!(channel = %channel_id, subscription = subscription.id.0, "message feed opened");

        Ok(MessageFeed {
            gateway: Arc::clone(&self.gateway),
            channel_id: channel_id.clone(),
            collection: query.collection,
            subscription: Some(subscription),
        })
    }

    /// One-shot read of a channel's messages, oldest first.
    pub async fn messages(&self, channel_id: &ChannelId) -> Result<Vec<Message>> {
        let query = messages_query(channel_id);
        let documents = self.gateway.query(&query).await?;
        Ok(decode_messages(&query.collection, documents))
    }

    /// Append a message to a channel as the caller.
    pub async fn post_message(
        &self,
        channel_id: &ChannelId,
        caller: &Caller,
        text: impl Into<String>,
    ) -> Result<MessageId> {
        let author_id = caller.require()?;
        let text = text.into();
        if is_blank(Some(text.as_str())) {
            return Err(DirectoryError::InvalidOperation(
                "message text must not be empty".to_string(),
            ));
        }
        if self.profiles.get_channel(channel_id).await?.is_none() {
            return Err(DirectoryError::ChannelNotFound(channel_id.clone()));
        }

        let message = Message {
            id: MessageId::default(),
            author_id: author_id.clone(),
            text,
            timestamp: Timestamp::now(),
        };
        let id = self
            .gateway
            .create(&collections::messages(channel_id), to_fields(&message)?, None)
            .await?;

        Ok(MessageId::new(id))
    }
}
