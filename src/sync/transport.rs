//! Pub/sub transport seam
//!
//! The hosted realtime service is an external collaborator; everything the core needs
//! from it is expressed by [`Transport`]. [`crate::sync::hub::LocalHub`] is the
//! in-process implementation.

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::protocol::TransportEvent;

/// Per-subscription options
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// Key under which `track` publishes presence
    pub presence_key: Option<String>,
    /// Whether broadcasts from this subscriber are echoed back to it
    pub receive_own: bool,
}

impl SubscribeOptions {
    pub fn presence(key: impl Into<String>) -> Self {
        Self {
            presence_key: Some(key.into()),
            ..Self::default()
        }
    }
}

/// One event as queued for a subscriber.
///
/// `seq` is assigned by the transport when the event is queued and increases across every
/// subscription it serves, so queues of one client can be merged back into arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub seq: u64,
    pub event: TransportEvent,
}

/// A live subscription; events queue up until drained
#[derive(Debug)]
pub struct Subscription {
    pub id: Uuid,
    pub topic: String,
    events: mpsc::UnboundedReceiver<Delivery>,
    head: Option<Delivery>,
}

impl Subscription {
    pub fn new(id: Uuid, topic: impl Into<String>, events: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self {
            id,
            topic: topic.into(),
            events,
            head: None,
        }
    }

    /// Sequence number of the next queued event, without consuming it
    pub fn peek_seq(&mut self) -> Option<u64> {
        if self.head.is_none() {
            self.head = self.events.try_recv().ok();
        }
        self.head.as_ref().map(|d| d.seq)
    }

    /// Next queued event without waiting
    pub fn try_next(&mut self) -> Option<TransportEvent> {
        self.head
            .take()
            .or_else(|| self.events.try_recv().ok())
            .map(|d| d.event)
    }
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Not subscribed to topic {0}")]
    NotSubscribed(String),

    #[error("No presence key configured for topic {0}")]
    NoPresenceKey(String),

    #[error("Subscription rejected: {0}")]
    Rejected(String),

    #[error("Transport closed")]
    Closed,
}

/// Best-effort, at-most-once broadcast service with presence
pub trait Transport: Send + Sync {
    /// Join a topic. The subscription receives `Status(Subscribed)` first.
    fn subscribe(&self, topic: &str, options: SubscribeOptions) -> Result<Subscription, TransportError>;

    /// Fire-and-forget broadcast to the other subscribers of the topic
    fn send(&self, subscription: &Subscription, text: String) -> Result<(), TransportError>;

    /// Broadcast and get notified once the transport acknowledged it
    fn send_acked(
        &self,
        subscription: &Subscription,
        text: String,
    ) -> Result<oneshot::Receiver<()>, TransportError>;

    /// Publish presence under the subscription's presence key; returns the presence ref
    fn track(&self, subscription: &Subscription, online_at: DateTime<Utc>) -> Result<String, TransportError>;

    /// Leave the topic. Unknown or already released subscriptions are ignored.
    fn unsubscribe(&self, subscription: &Subscription);
}
