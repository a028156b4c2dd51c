//! Peer channel adapter: movement broadcast, presence and latency probe over one transport

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, trace, warn};

use crate::util::rate_limit::BroadcastLimiter;

use super::latency::{LatencySummary, LatencyTracker, PendingProbe, ProbeStatus};
use super::protocol::{
    BroadcastMsg, ChannelStatus, Empty, PeerPresence, PlayerMove, PresenceMeta, PresenceState,
    TransportEvent,
};
use super::transport::{SubscribeOptions, Subscription, Transport, TransportError};

/// Topic shared by every client's latency probe
pub const LATENCY_TOPIC: &str = "calc-latency";

/// Topic names for one room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomTopics {
    pub movement: String,
    pub presence: String,
    pub latency: String,
}

impl RoomTopics {
    pub fn for_room(room: &str) -> Self {
        Self {
            movement: room.to_string(),
            presence: format!("online-users-{room}"),
            latency: LATENCY_TOPIC.to_string(),
        }
    }
}

/// Receives inbound peer events. Handlers run to completion, in delivery order.
pub trait PeerHandler {
    fn on_move(&mut self, msg: PlayerMove);
    /// Full set of online peers, local id excluded
    fn on_sync(&mut self, peers: &[PeerPresence]);
    fn on_join(&mut self, _peers: &[PeerPresence]) {}
    fn on_leave(&mut self, peers: &[PeerPresence]);
}

#[derive(Debug, Clone, Copy)]
enum Lane {
    Presence,
    Movement,
    Latency,
}

/// Whether a movement broadcast went out now or waits for the rate limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent,
    Deferred,
}

/// Peer channel errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Transport error on {topic}: {source}")]
    Transport {
        topic: String,
        #[source]
        source: TransportError,
    },

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Channels already released")]
    Released,

    #[error("Latency probe timed out after {0:?}")]
    ProbeTimeout(Duration),

    #[error("Latency probe acknowledgement dropped")]
    ProbeDropped,
}

impl ChannelError {
    fn transport(topic: &str, source: TransportError) -> Self {
        Self::Transport {
            topic: topic.to_string(),
            source,
        }
    }
}

/// The three logical channels of one client.
///
/// Subscriptions are held for the lifetime of the value and released on drop, including
/// when `acquire` bails out halfway.
pub struct PeerChannels {
    transport: Arc<dyn Transport>,
    local_id: String,
    movement: Option<Subscription>,
    presence: Option<Subscription>,
    latency: Option<Subscription>,
    local_presence_ref: Option<String>,
    limiter: BroadcastLimiter,
    pending_move: Option<PlayerMove>,
    probe: Option<PendingProbe>,
    latency_stats: LatencyTracker,
}

impl PeerChannels {
    /// Subscribe to presence (and track it), the latency topic and the movement topic
    pub fn acquire(
        transport: Arc<dyn Transport>,
        topics: &RoomTopics,
        local_id: &str,
        limiter: BroadcastLimiter,
    ) -> Result<Self, ChannelError> {
        let mut channels = Self {
            transport,
            local_id: local_id.to_string(),
            movement: None,
            presence: None,
            latency: None,
            local_presence_ref: None,
            limiter,
            pending_move: None,
            probe: None,
            latency_stats: LatencyTracker::default(),
        };

        let presence = channels.subscribe(&topics.presence, SubscribeOptions::presence(local_id))?;
        let presence_ref = channels
            .transport
            .track(&presence, Utc::now())
            .map_err(|e| ChannelError::transport(&topics.presence, e));
        channels.presence = Some(presence);
        channels.local_presence_ref = Some(presence_ref?);

        channels.latency = Some(channels.subscribe(&topics.latency, SubscribeOptions::default())?);
        channels.movement = Some(channels.subscribe(&topics.movement, SubscribeOptions::default())?);

        info!(
            player_id = %channels.local_id,
            room = %topics.movement,
            presence_ref = ?channels.local_presence_ref,
            "peer channels acquired"
        );
        Ok(channels)
    }

    fn subscribe(&self, topic: &str, options: SubscribeOptions) -> Result<Subscription, ChannelError> {
        self.transport
            .subscribe(topic, options)
            .map_err(|e| ChannelError::transport(topic, e))
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Presence ref the transport assigned to this client
    pub fn local_presence_ref(&self) -> Option<&str> {
        self.local_presence_ref.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.movement.is_some() || self.presence.is_some() || self.latency.is_some()
    }

    pub fn has_pending_move(&self) -> bool {
        self.pending_move.is_some()
    }

    pub fn latency(&self) -> LatencySummary {
        self.latency_stats.summary()
    }

    /// Broadcast a committed position. Over the rate limit the position is kept and
    /// replaces any older pending one; `flush` sends it later.
    pub fn publish_move(&mut self, player_id: &str, x: i32, y: i32) -> Result<PublishOutcome, ChannelError> {
        let msg = PlayerMove {
            id: player_id.to_string(),
            x,
            y,
        };

        if !self.limiter.check() {
            trace!(player_id, x, y, "movement broadcast deferred");
            self.pending_move = Some(msg);
            return Ok(PublishOutcome::Deferred);
        }

        self.pending_move = None;
        self.send_move(msg)?;
        Ok(PublishOutcome::Sent)
    }

    /// Send the pending position if the limiter allows; returns whether one went out
    pub fn flush(&mut self) -> Result<bool, ChannelError> {
        if self.pending_move.is_none() || !self.limiter.check() {
            return Ok(false);
        }
        match self.pending_move.take() {
            Some(msg) => {
                self.send_move(msg)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn send_move(&self, msg: PlayerMove) -> Result<(), ChannelError> {
        let sub = self.movement.as_ref().ok_or(ChannelError::Released)?;
        let text = BroadcastMsg::PlayerMove(msg).encode()?;
        self.transport
            .send(sub, text)
            .map_err(|e| ChannelError::transport(&sub.topic, e))
    }

    /// Drain every queued inbound event into `handler`, across all three channels in the
    /// order the transport queued them; returns how many presence and movement events were
    /// handled
    pub fn pump<H: PeerHandler>(&mut self, handler: &mut H) -> usize {
        let mut handled = 0;

        while let Some((lane, event)) = self.next_event() {
            match lane {
                Lane::Presence => {
                    handled += 1;
                    self.on_presence(event, handler);
                }
                Lane::Movement => {
                    handled += 1;
                    self.on_movement(event, handler);
                }
                // other clients' probes arrive here too; only status matters
                Lane::Latency => {
                    if let TransportEvent::Status(status) = event {
                        log_status(self.lane_topic(lane), status);
                    }
                }
            }
        }

        self.poll_probe();
        handled
    }

    fn lane(&mut self, lane: Lane) -> Option<&mut Subscription> {
        match lane {
            Lane::Presence => self.presence.as_mut(),
            Lane::Movement => self.movement.as_mut(),
            Lane::Latency => self.latency.as_mut(),
        }
    }

    fn lane_topic(&self, lane: Lane) -> &str {
        let sub = match lane {
            Lane::Presence => self.presence.as_ref(),
            Lane::Movement => self.movement.as_ref(),
            Lane::Latency => self.latency.as_ref(),
        };
        sub.map_or("", |sub| sub.topic.as_str())
    }

    /// Oldest queued event over all subscriptions
    fn next_event(&mut self) -> Option<(Lane, TransportEvent)> {
        let (_, lane) = [Lane::Presence, Lane::Movement, Lane::Latency]
            .into_iter()
            .filter_map(|lane| self.lane(lane)?.peek_seq().map(|seq| (seq, lane)))
            .min_by_key(|(seq, _)| *seq)?;
        let event = self.lane(lane)?.try_next()?;
        Some((lane, event))
    }

    fn on_presence<H: PeerHandler>(&mut self, event: TransportEvent, handler: &mut H) {
        match event {
            TransportEvent::PresenceSync(state) => {
                if self.local_presence_ref.is_none() {
                    self.local_presence_ref = own_presence_ref(&state, &self.local_id);
                }
                handler.on_sync(&remote_peers(&state, &self.local_id));
            }
            TransportEvent::PresenceJoin { key, metas } => {
                if key != self.local_id {
                    handler.on_join(&peers_of(&key, &metas));
                }
            }
            TransportEvent::PresenceLeave { key, metas } => {
                if key != self.local_id {
                    handler.on_leave(&peers_of(&key, &metas));
                }
            }
            TransportEvent::Status(status) => log_status(self.lane_topic(Lane::Presence), status),
            TransportEvent::Broadcast { .. } => {}
        }
    }

    fn on_movement<H: PeerHandler>(&self, event: TransportEvent, handler: &mut H) {
        match event {
            TransportEvent::Broadcast { text } => match BroadcastMsg::decode(&text) {
                Ok(BroadcastMsg::PlayerMove(msg)) if msg.id != self.local_id => handler.on_move(msg),
                Ok(_) => {}
                Err(e) => warn!(player_id = %self.local_id, error = %e, "Failed to parse broadcast"),
            },
            TransportEvent::Status(status) => log_status(self.lane_topic(Lane::Movement), status),
            _ => {}
        }
    }

    /// Start a latency probe unless one is already in flight
    pub fn begin_probe(&mut self) -> Result<(), ChannelError> {
        if self.probe.is_some() {
            return Ok(());
        }
        let sub = self.latency.as_ref().ok_or(ChannelError::Released)?;
        let text = BroadcastMsg::Latency(Empty {}).encode()?;
        let ack = self
            .transport
            .send_acked(sub, text)
            .map_err(|e| ChannelError::transport(&sub.topic, e))?;
        self.probe = Some(PendingProbe::new(Instant::now(), ack));
        Ok(())
    }

    fn poll_probe(&mut self) {
        let Some(probe) = self.probe.as_mut() else {
            return;
        };
        match self.latency_stats.poll(probe, Instant::now()) {
            ProbeStatus::Waiting => {}
            ProbeStatus::Acked(rtt) => {
                debug!(player_id = %self.local_id, rtt_ms = rtt.as_secs_f64() * 1000.0, "latency measured");
                self.probe = None;
            }
            ProbeStatus::Lost => {
                warn!(player_id = %self.local_id, "latency probe lost");
                self.probe = None;
            }
        }
    }

    /// Send a zero-payload acked broadcast and wait for the acknowledgement
    pub async fn measure_round_trip(&mut self, timeout: Duration) -> Result<Duration, ChannelError> {
        let sub = self.latency.as_ref().ok_or(ChannelError::Released)?;
        let text = BroadcastMsg::Latency(Empty {}).encode()?;

        let begin = Instant::now();
        let ack = self
            .transport
            .send_acked(sub, text)
            .map_err(|e| ChannelError::transport(&sub.topic, e))?;

        match tokio::time::timeout(timeout, ack).await {
            Ok(Ok(())) => {
                let rtt = begin.elapsed();
                self.latency_stats.record(rtt);
                info!(player_id = %self.local_id, "Latency is {} milliseconds", rtt.as_secs_f64() * 1000.0);
                Ok(rtt)
            }
            Ok(Err(_)) => {
                self.latency_stats.record_lost();
                Err(ChannelError::ProbeDropped)
            }
            Err(_) => {
                self.latency_stats.record_lost();
                Err(ChannelError::ProbeTimeout(timeout))
            }
        }
    }

    /// Unsubscribe everything. Safe to call repeatedly.
    pub fn release(&mut self) {
        let subs = [self.movement.take(), self.latency.take(), self.presence.take()];
        let mut released = 0;
        for sub in subs.into_iter().flatten() {
            self.transport.unsubscribe(&sub);
            released += 1;
        }
        self.pending_move = None;
        self.probe = None;

        if released > 0 {
            info!(player_id = %self.local_id, released, "peer channels released");
        }
    }
}

impl Drop for PeerChannels {
    fn drop(&mut self) {
        self.release();
    }
}

fn own_presence_ref(state: &PresenceState, local_id: &str) -> Option<String> {
    state
        .get(local_id)
        .and_then(|metas| metas.first())
        .map(|meta| meta.presence_ref.clone())
}

fn remote_peers(state: &PresenceState, local_id: &str) -> Vec<PeerPresence> {
    state
        .iter()
        .filter(|(key, _)| key.as_str() != local_id)
        .filter_map(|(key, metas)| PeerPresence::from_metas(key, metas))
        .collect()
}

fn peers_of(key: &str, metas: &[PresenceMeta]) -> Vec<PeerPresence> {
    metas
        .iter()
        .map(|meta| PeerPresence {
            id: key.to_string(),
            presence_ref: meta.presence_ref.clone(),
            online_at: meta.online_at,
        })
        .collect()
}

fn log_status(topic: &str, status: ChannelStatus) {
    match status {
        ChannelStatus::Subscribed => debug!(topic, "channel subscribed"),
        other => warn!(topic, status = ?other, "channel status"),
    }
}
