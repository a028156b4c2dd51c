//! In-process broadcast/presence hub

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};
use uuid::Uuid;

use super::protocol::{ChannelStatus, PresenceMeta, PresenceState, TransportEvent};
use super::transport::{Delivery, SubscribeOptions, Subscription, Transport, TransportError};

struct Subscriber {
    tx: mpsc::UnboundedSender<Delivery>,
    presence_key: Option<String>,
    presence_ref: Option<String>,
    receive_own: bool,
}

#[derive(Default)]
struct TopicState {
    subscribers: HashMap<Uuid, Subscriber>,
    presence: PresenceState,
}

fn deliver(tx: &mpsc::UnboundedSender<Delivery>, seq: &AtomicU64, event: TransportEvent) {
    let seq = seq.fetch_add(1, Ordering::Relaxed);
    let _ = tx.send(Delivery { seq, event });
}

impl TopicState {
    fn notify_all(&self, seq: &AtomicU64, event: &TransportEvent) {
        for subscriber in self.subscribers.values() {
            deliver(&subscriber.tx, seq, event.clone());
        }
    }

    fn is_idle(&self) -> bool {
        self.subscribers.is_empty() && self.presence.is_empty()
    }

    fn remove_presence(&mut self, key: &str, presence_ref: &str) -> Option<PresenceMeta> {
        let metas = self.presence.get_mut(key)?;
        let pos = metas.iter().position(|m| m.presence_ref == presence_ref)?;
        let meta = metas.remove(pos);
        if metas.is_empty() {
            self.presence.remove(key);
        }
        Some(meta)
    }
}

struct LossModel {
    rate: f64,
    rng: ChaCha8Rng,
}

/// Transport backed by in-memory queues.
///
/// Broadcasts are not echoed to the sender unless it asked for it. Tracking presence
/// emits a join and a full sync to every subscriber, the tracker included; dropping a
/// tracked subscription emits a leave and a sync to the rest. Every queued event carries a
/// hub-wide sequence number. Topics are dropped once their last subscriber leaves.
#[derive(Default)]
pub struct LocalHub {
    topics: DashMap<String, Arc<Mutex<TopicState>>>,
    loss: Option<Mutex<LossModel>>,
    seq: AtomicU64,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hub that drops each broadcast delivery with probability `rate`
    pub fn with_loss(rate: f64, seed: u64) -> Self {
        Self {
            loss: Some(Mutex::new(LossModel {
                rate: rate.clamp(0.0, 1.0),
                rng: ChaCha8Rng::seed_from_u64(seed),
            })),
            ..Self::default()
        }
    }

    /// Current presence state of a topic
    pub fn presence_state(&self, topic: &str) -> PresenceState {
        self.topic(topic)
            .map(|t| t.lock().presence.clone())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topic(topic)
            .map(|t| t.lock().subscribers.len())
            .unwrap_or(0)
    }

    /// Topics with at least one subscriber
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    fn topic(&self, name: &str) -> Option<Arc<Mutex<TopicState>>> {
        self.topics.get(name).map(|t| Arc::clone(t.value()))
    }

    fn subscribed_topic(&self, subscription: &Subscription) -> Result<Arc<Mutex<TopicState>>, TransportError> {
        self.topic(&subscription.topic)
            .ok_or_else(|| TransportError::NotSubscribed(subscription.topic.clone()))
    }

    fn dropped(&self) -> bool {
        self.loss.as_ref().is_some_and(|loss| {
            let mut loss = loss.lock();
            let rate = loss.rate;
            loss.rng.gen_bool(rate)
        })
    }
}

impl Transport for LocalHub {
    fn subscribe(&self, topic: &str, options: SubscribeOptions) -> Result<Subscription, TransportError> {
        // the map entry stays locked until the subscriber is in, so pruning cannot race it
        let entry = self.topics.entry(topic.to_string()).or_default();
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        let mut state = entry.lock();
        deliver(&tx, &self.seq, TransportEvent::Status(ChannelStatus::Subscribed));
        if !state.presence.is_empty() {
            deliver(&tx, &self.seq, TransportEvent::PresenceSync(state.presence.clone()));
        }
        state.subscribers.insert(
            id,
            Subscriber {
                tx,
                presence_key: options.presence_key,
                presence_ref: None,
                receive_own: options.receive_own,
            },
        );

        debug!(topic, subscription_id = %id, "subscribed");
        Ok(Subscription::new(id, topic, rx))
    }

    fn send(&self, subscription: &Subscription, text: String) -> Result<(), TransportError> {
        let topic = self.subscribed_topic(subscription)?;
        let state = topic.lock();
        if !state.subscribers.contains_key(&subscription.id) {
            return Err(TransportError::NotSubscribed(subscription.topic.clone()));
        }

        for (id, subscriber) in &state.subscribers {
            if *id == subscription.id && !subscriber.receive_own {
                continue;
            }
            if self.dropped() {
                trace!(topic = %subscription.topic, subscriber = %id, "broadcast dropped");
                continue;
            }
            deliver(&subscriber.tx, &self.seq, TransportEvent::Broadcast { text: text.clone() });
        }
        Ok(())
    }

    fn send_acked(
        &self,
        subscription: &Subscription,
        text: String,
    ) -> Result<oneshot::Receiver<()>, TransportError> {
        self.send(subscription, text)?;
        let (ack_tx, ack_rx) = oneshot::channel();
        let _ = ack_tx.send(());
        Ok(ack_rx)
    }

    fn track(&self, subscription: &Subscription, online_at: DateTime<Utc>) -> Result<String, TransportError> {
        let topic = self.subscribed_topic(subscription)?;
        let mut state = topic.lock();
        let presence_ref = Uuid::new_v4().to_string();

        let subscriber = state
            .subscribers
            .get_mut(&subscription.id)
            .ok_or_else(|| TransportError::NotSubscribed(subscription.topic.clone()))?;
        let key = subscriber
            .presence_key
            .clone()
            .ok_or_else(|| TransportError::NoPresenceKey(subscription.topic.clone()))?;
        let previous = subscriber.presence_ref.replace(presence_ref.clone());

        if let Some(previous) = previous {
            state.remove_presence(&key, &previous);
        }

        let meta = PresenceMeta {
            presence_ref: presence_ref.clone(),
            online_at,
        };
        state.presence.entry(key.clone()).or_default().push(meta.clone());

        state.notify_all(
            &self.seq,
            &TransportEvent::PresenceJoin {
                key: key.clone(),
                metas: vec![meta],
            },
        );
        state.notify_all(&self.seq, &TransportEvent::PresenceSync(state.presence.clone()));

        debug!(topic = %subscription.topic, key = %key, presence_ref = %presence_ref, "presence tracked");
        Ok(presence_ref)
    }

    fn unsubscribe(&self, subscription: &Subscription) {
        let Some(topic) = self.topic(&subscription.topic) else {
            return;
        };
        {
            let mut state = topic.lock();
            let Some(removed) = state.subscribers.remove(&subscription.id) else {
                return;
            };

            if let (Some(key), Some(presence_ref)) = (removed.presence_key, removed.presence_ref) {
                if let Some(meta) = state.remove_presence(&key, &presence_ref) {
                    state.notify_all(
                        &self.seq,
                        &TransportEvent::PresenceLeave {
                            key,
                            metas: vec![meta],
                        },
                    );
                    state.notify_all(&self.seq, &TransportEvent::PresenceSync(state.presence.clone()));
                }
            }
        }

        if self
            .topics
            .remove_if(&subscription.topic, |_, state| state.lock().is_idle())
            .is_some()
        {
            debug!(topic = %subscription.topic, "topic dropped");
        }
        debug!(topic = %subscription.topic, subscription_id = %subscription.id, "unsubscribed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(sub: &mut Subscription) -> Vec<TransportEvent> {
        std::iter::from_fn(|| sub.try_next()).collect()
    }

    #[test]
    fn broadcast_skips_sender() {
        let hub = LocalHub::new();
        let mut a = hub.subscribe("room", SubscribeOptions::default()).unwrap();
        let mut b = hub.subscribe("room", SubscribeOptions::default()).unwrap();
        drain(&mut a);
        drain(&mut b);

        hub.send(&a, "hello".into()).unwrap();
        assert!(drain(&mut a).is_empty());
        assert_eq!(drain(&mut b), vec![TransportEvent::Broadcast { text: "hello".into() }]);
    }

    #[test]
    fn receive_own_echoes_to_sender() {
        let hub = LocalHub::new();
        let mut a = hub
            .subscribe(
                "room",
                SubscribeOptions {
                    receive_own: true,
                    ..SubscribeOptions::default()
                },
            )
            .unwrap();
        drain(&mut a);
        hub.send(&a, "echo".into()).unwrap();
        assert_eq!(drain(&mut a).len(), 1);
    }

    #[test]
    fn first_event_is_subscribed_status() {
        let hub = LocalHub::new();
        let mut a = hub.subscribe("room", SubscribeOptions::default()).unwrap();
        assert_eq!(a.try_next(), Some(TransportEvent::Status(ChannelStatus::Subscribed)));
    }

    #[test]
    fn track_emits_join_and_sync_to_everyone() {
        let hub = LocalHub::new();
        let mut a = hub.subscribe("presence", SubscribeOptions::presence("p1")).unwrap();
        let mut b = hub.subscribe("presence", SubscribeOptions::presence("p2")).unwrap();
        drain(&mut a);
        drain(&mut b);

        let presence_ref = hub.track(&a, Utc::now()).unwrap();
        for sub in [&mut a, &mut b] {
            let events = drain(sub);
            assert!(matches!(&events[0], TransportEvent::PresenceJoin { key, .. } if key == "p1"));
            match &events[1] {
                TransportEvent::PresenceSync(state) => {
                    assert_eq!(state["p1"][0].presence_ref, presence_ref);
                }
                other => panic!("expected sync, got {other:?}"),
            }
        }
    }

    #[test]
    fn late_subscriber_receives_current_presence() {
        let hub = LocalHub::new();
        let a = hub.subscribe("presence", SubscribeOptions::presence("p1")).unwrap();
        hub.track(&a, Utc::now()).unwrap();

        let mut b = hub.subscribe("presence", SubscribeOptions::presence("p2")).unwrap();
        let events = drain(&mut b);
        assert!(matches!(&events[1], TransportEvent::PresenceSync(state) if state.contains_key("p1")));
    }

    #[test]
    fn unsubscribe_emits_leave_and_is_idempotent() {
        let hub = LocalHub::new();
        let a = hub.subscribe("presence", SubscribeOptions::presence("p1")).unwrap();
        let mut b = hub.subscribe("presence", SubscribeOptions::presence("p2")).unwrap();
        let presence_ref = hub.track(&a, Utc::now()).unwrap();
        drain(&mut b);

        hub.unsubscribe(&a);
        hub.unsubscribe(&a);

        let events = drain(&mut b);
        assert_eq!(events.len(), 2);
        match &events[0] {
            TransportEvent::PresenceLeave { key, metas } => {
                assert_eq!(key, "p1");
                assert_eq!(metas[0].presence_ref, presence_ref);
            }
            other => panic!("expected leave, got {other:?}"),
        }
        assert!(hub.presence_state("presence").is_empty());
        assert_eq!(hub.subscriber_count("presence"), 1);
    }

    #[test]
    fn track_without_presence_key_fails() {
        let hub = LocalHub::new();
        let a = hub.subscribe("room", SubscribeOptions::default()).unwrap();
        assert!(matches!(hub.track(&a, Utc::now()), Err(TransportError::NoPresenceKey(_))));
    }

    #[test]
    fn idle_topics_are_dropped() {
        let hub = LocalHub::new();
        let a = hub.subscribe("room", SubscribeOptions::default()).unwrap();
        let b = hub.subscribe("presence", SubscribeOptions::presence("p1")).unwrap();
        hub.track(&b, Utc::now()).unwrap();
        assert_eq!(hub.topic_count(), 2);

        hub.unsubscribe(&a);
        hub.unsubscribe(&b);
        assert_eq!(hub.topic_count(), 0);
    }

    #[test]
    fn sequence_numbers_follow_queueing_order_across_topics() {
        let hub = LocalHub::new();
        let sender = hub.subscribe("room", SubscribeOptions::default()).unwrap();
        let mut moves = hub.subscribe("room", SubscribeOptions::default()).unwrap();
        let mut presence = hub.subscribe("presence", SubscribeOptions::presence("p1")).unwrap();
        drain(&mut moves);
        drain(&mut presence);

        hub.send(&sender, "first".into()).unwrap();
        hub.track(&presence, Utc::now()).unwrap();

        let move_seq = moves.peek_seq().unwrap();
        let presence_seq = presence.peek_seq().unwrap();
        assert!(move_seq < presence_seq);
        // peeking does not consume
        assert_eq!(moves.try_next(), Some(TransportEvent::Broadcast { text: "first".into() }));
    }

    #[test]
    fn send_after_unsubscribe_fails() {
        let hub = LocalHub::new();
        let a = hub.subscribe("room", SubscribeOptions::default()).unwrap();
        hub.unsubscribe(&a);
        assert!(matches!(hub.send(&a, "x".into()), Err(TransportError::NotSubscribed(_))));
    }

    #[test]
    fn full_loss_drops_every_delivery() {
        let hub = LocalHub::with_loss(1.0, 3);
        let a = hub.subscribe("room", SubscribeOptions::default()).unwrap();
        let mut b = hub.subscribe("room", SubscribeOptions::default()).unwrap();
        drain(&mut b);

        for _ in 0..10 {
            hub.send(&a, "lost".into()).unwrap();
        }
        assert!(drain(&mut b).is_empty());
    }

    #[tokio::test]
    async fn acked_send_resolves() {
        let hub = LocalHub::new();
        let a = hub.subscribe("calc-latency", SubscribeOptions::default()).unwrap();
        let ack = hub.send_acked(&a, "{}".into()).unwrap();
        tokio_test::assert_ok!(ack.await);
    }
}
