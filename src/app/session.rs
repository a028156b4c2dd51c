//! One client session: local simulation, remote reconciliation and peer channels

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::game::{Frame, FrameBuilder, InputSnapshot, Key, LocalSimulation, StateDelta};
use crate::sync::{
    ChannelError, LatencySummary, PeerChannels, Reconciler, RemoteEntityTable, Transport,
};
use crate::util::ids::random_player_id;
use crate::util::rate_limit::BroadcastLimiter;
use crate::util::time::Millis;

/// Per-session state bundle, owned by a single task
pub struct Session {
    sim: LocalSimulation,
    reconciler: Reconciler,
    channels: Option<PeerChannels>,
    frames: FrameBuilder,
}

impl Session {
    /// Start a session under a random player id
    pub fn start(config: &Config, transport: Arc<dyn Transport>) -> Self {
        Self::with_id(config, transport, random_player_id())
    }

    /// Start a session and acquire its peer channels. If the transport refuses, the
    /// session runs local-only.
    pub fn with_id(config: &Config, transport: Arc<dyn Transport>, id: impl Into<String>) -> Self {
        let id = id.into();
        let limiter = BroadcastLimiter::new(config.broadcast_rate);
        let channels = match PeerChannels::acquire(transport, &config.topics(), &id, limiter) {
            Ok(channels) => Some(channels),
            Err(e) => {
                warn!(player_id = %id, error = %e, "Peer channels unavailable, running local-only");
                None
            }
        };
        Self::assemble(config, id, channels)
    }

    /// Session without any peer channels
    pub fn local_only(config: &Config, id: impl Into<String>) -> Self {
        Self::assemble(config, id.into(), None)
    }

    fn assemble(config: &Config, id: String, channels: Option<PeerChannels>) -> Self {
        info!(player_id = %id, connected = channels.is_some(), "session started");
        Self {
            sim: LocalSimulation::new(id.clone(), config.engine()),
            reconciler: Reconciler::new(id, config.creation_policy()),
            channels,
            frames: FrameBuilder::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.sim.player().id
    }

    pub fn is_connected(&self) -> bool {
        self.channels.is_some()
    }

    pub fn simulation(&self) -> &LocalSimulation {
        &self.sim
    }

    pub fn remote(&self) -> &RemoteEntityTable {
        self.reconciler.table()
    }

    pub fn tick_count(&self) -> u64 {
        self.frames.tick()
    }

    pub fn latency(&self) -> LatencySummary {
        self.channels
            .as_ref()
            .map(PeerChannels::latency)
            .unwrap_or_default()
    }

    /// Apply one key-down event and broadcast the new position if the player moved
    pub fn handle_key(&mut self, key: Key, now: Millis) -> StateDelta {
        let delta = self.sim.apply_input(key, now);
        self.publish(&delta);
        delta
    }

    /// One frame: drain inbound events, advance the simulation, flush outbound, build the frame
    pub fn tick(&mut self, now: Millis, held: &InputSnapshot) -> Frame {
        if let Some(channels) = self.channels.as_mut() {
            channels.pump(&mut self.reconciler);
        }

        // peers missing from the latest sync are drawn but cannot be hit
        let delta = self.sim.advance(now, held, self.reconciler.table().online_players());
        if let Some(target_id) = delta.hit_target() {
            info!(player_id = %self.sim.player().id, target_id, "power hit");
        }
        self.publish(&delta);

        if let Some(channels) = self.channels.as_mut() {
            if let Err(e) = channels.flush() {
                self.degrade(e);
            }
        }

        self.frames.build(&self.sim, self.reconciler.table().players())
    }

    /// Start a latency probe; failures only cost the sample
    pub fn begin_probe(&mut self) {
        if let Some(channels) = self.channels.as_mut() {
            if let Err(e) = channels.begin_probe() {
                warn!(player_id = %self.sim.player().id, error = %e, "Latency probe failed");
            }
        }
    }

    /// Release peer channels. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(mut channels) = self.channels.take() {
            channels.release();
            info!(player_id = %self.sim.player().id, "session shut down");
        }
    }

    fn publish(&mut self, delta: &StateDelta) {
        let Some((x, y)) = delta.player_moved() else {
            return;
        };
        let Some(channels) = self.channels.as_mut() else {
            return;
        };
        if let Err(e) = channels.publish_move(&self.sim.player().id, x, y) {
            self.degrade(e);
        }
    }

    fn degrade(&mut self, error: ChannelError) {
        warn!(player_id = %self.sim.player().id, error = %error, "Peer channel failure, continuing local-only");
        self.channels = None;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::DrawKind;
    use crate::sync::LocalHub;

    fn config() -> Config {
        Config::from_lookup(|_| None).unwrap()
    }

    #[test]
    fn local_only_session_still_simulates() {
        let mut session = Session::local_only(&config(), "solo");
        assert!(!session.is_connected());

        let delta = session.handle_key(Key::C, 0);
        assert_eq!(delta.player_moved(), Some((96, 64)));

        let frame = session.tick(16, &InputSnapshot::new());
        assert_eq!(frame.tick, 1);
        assert_eq!(frame.of_kind(DrawKind::LocalPlayer).count(), 1);
        assert_eq!(session.latency(), LatencySummary::default());
    }

    #[test]
    fn refused_transport_degrades_to_local_only() {
        struct Closed;

        impl Transport for Closed {
            fn subscribe(
                &self,
                _topic: &str,
                _options: crate::sync::SubscribeOptions,
            ) -> Result<crate::sync::Subscription, crate::sync::TransportError> {
                Err(crate::sync::TransportError::Closed)
            }

            fn send(&self, _: &crate::sync::Subscription, _: String) -> Result<(), crate::sync::TransportError> {
                Err(crate::sync::TransportError::Closed)
            }

            fn send_acked(
                &self,
                _: &crate::sync::Subscription,
                _: String,
            ) -> Result<tokio::sync::oneshot::Receiver<()>, crate::sync::TransportError> {
                Err(crate::sync::TransportError::Closed)
            }

            fn track(
                &self,
                _: &crate::sync::Subscription,
                _: chrono::DateTime<chrono::Utc>,
            ) -> Result<String, crate::sync::TransportError> {
                Err(crate::sync::TransportError::Closed)
            }

            fn unsubscribe(&self, _: &crate::sync::Subscription) {}
        }

        let mut session = Session::with_id(&config(), Arc::new(Closed), "p1");
        assert!(!session.is_connected());
        assert_eq!(session.handle_key(Key::X, 0).player_moved(), Some((64, 96)));
    }

    #[test]
    fn peers_appear_in_frames() {
        let hub = Arc::new(LocalHub::new());
        let mut a = Session::with_id(&config(), hub.clone(), "p1");
        let mut b = Session::with_id(&config(), hub.clone(), "p2");

        a.tick(0, &InputSnapshot::new());
        let frame = b.tick(0, &InputSnapshot::new());

        assert_eq!(a.remote().len(), 1);
        let remotes: Vec<_> = frame.of_kind(DrawKind::RemotePlayer).collect();
        assert_eq!(remotes.len(), 1);
        assert_eq!(remotes[0].id.as_deref(), Some("p1"));
    }

    #[test]
    fn shutdown_releases_presence() {
        let hub = Arc::new(LocalHub::new());
        let mut session = Session::with_id(&config(), hub.clone(), "p1");
        session.shutdown();
        session.shutdown();
        assert!(!session.is_connected());
        assert!(hub.presence_state("online-users-room-6").is_empty());
    }
}
