//! Frame driver: runs a session on a fixed tick

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::Config;
use crate::game::{Frame, InputSnapshot, Key};
use crate::sync::LatencySummary;
use crate::util::time::{Millis, SessionClock};

use super::session::Session;

/// Where a driven session gets its keys from
pub trait InputSource: Send {
    /// Key-down events since the last poll, and the keys held right now
    fn poll(&mut self, now: Millis) -> (Vec<Key>, InputSnapshot);
}

const BOT_KEYS: [Key; 12] = [
    Key::Z,
    Key::C,
    Key::S,
    Key::X,
    Key::Left,
    Key::Right,
    Key::Up,
    Key::Down,
    Key::Z,
    Key::C,
    Key::Space,
    Key::R,
];

/// Seeded pseudo-random key presses
pub struct BotInput {
    rng: ChaCha8Rng,
    held: InputSnapshot,
    next_press: Millis,
    release_at: Millis,
}

impl BotInput {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            held: InputSnapshot::new(),
            next_press: 0,
            release_at: 0,
        }
    }
}

impl InputSource for BotInput {
    fn poll(&mut self, now: Millis) -> (Vec<Key>, InputSnapshot) {
        if now >= self.release_at {
            self.held = InputSnapshot::new();
        }
        if now < self.next_press {
            return (Vec::new(), self.held.clone());
        }

        let key = BOT_KEYS[self.rng.gen_range(0..BOT_KEYS.len())];
        self.next_press = now + self.rng.gen_range(120..480);
        self.release_at = now + self.rng.gen_range(50..400);
        self.held.press(key);
        (vec![key], self.held.clone())
    }
}

/// What observers see of a running session
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub connected: bool,
    pub tick: u64,
    pub peers: usize,
    /// Peers present in the latest presence sync
    pub online_peers: usize,
    pub latency: LatencySummary,
    pub frame: Frame,
}

impl SessionView {
    pub fn of(session: &Session, frame: Frame) -> Self {
        Self {
            session_id: session.id().to_string(),
            connected: session.is_connected(),
            tick: frame.tick,
            peers: session.remote().len(),
            online_peers: session.remote().online_players().count(),
            latency: session.latency(),
            frame,
        }
    }
}

/// Drives one session until shutdown is signalled
pub struct FrameDriver {
    frame_period: Duration,
    probe_interval: Duration,
    clock: SessionClock,
}

impl FrameDriver {
    pub fn new(frame_period: Duration, probe_interval: Duration) -> Self {
        Self {
            frame_period,
            probe_interval,
            clock: SessionClock::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.frame_period(), config.probe_interval())
    }

    /// Run the tick loop; returns the session with its channels released
    pub async fn run<I: InputSource>(
        self,
        mut session: Session,
        mut input: I,
        view: watch::Sender<SessionView>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Session {
        info!(session_id = %session.id(), "Frame driver started");

        let mut frames = interval(self.frame_period);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut probes = interval(self.probe_interval);
        probes.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = frames.tick() => {
                    let now = self.clock.now();
                    let (pressed, held) = input.poll(now);
                    for key in pressed {
                        let delta = session.handle_key(key, now);
                        if !delta.is_empty() {
                            debug!(session_id = %session.id(), ?key, events = delta.events.len(), "key applied");
                        }
                    }
                    let frame = session.tick(now, &held);
                    view.send_replace(SessionView::of(&session, frame));
                }
                _ = probes.tick() => session.begin_probe(),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        session.shutdown();
        info!(session_id = %session.id(), ticks = session.tick_count(), "Frame driver stopped");
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::sync::LocalHub;

    #[test]
    fn bot_input_is_reproducible() {
        let mut a = BotInput::new(7);
        let mut b = BotInput::new(7);
        for now in (0..2_000).step_by(33) {
            assert_eq!(a.poll(now).0, b.poll(now).0);
        }
    }

    #[test]
    fn bot_presses_at_most_one_key_per_poll() {
        let mut bot = BotInput::new(1);
        let (first, held) = bot.poll(0);
        assert_eq!(first.len(), 1);
        assert!(held.is_down(first[0]));
        // next press is at least 120ms away
        assert!(bot.poll(10).0.is_empty());
    }

    #[tokio::test]
    async fn driver_publishes_frames_and_stops_on_signal() {
        let config = Config::from_lookup(|_| None).unwrap();
        let hub = Arc::new(LocalHub::new());
        let session = Session::with_id(&config, hub.clone(), "p1");

        let (view_tx, mut view_rx) = watch::channel(SessionView::default());
        let (stop_tx, stop_rx) = watch::channel(false);
        let driver = FrameDriver::new(Duration::from_millis(5), Duration::from_millis(20));
        let handle = tokio::spawn(driver.run(session, BotInput::new(3), view_tx, stop_rx));

        view_rx.changed().await.unwrap();
        assert_eq!(view_rx.borrow().session_id, "p1");

        stop_tx.send(true).unwrap();
        let session = handle.await.unwrap();
        assert!(!session.is_connected());
        assert!(session.tick_count() >= 1);
        assert_eq!(hub.subscriber_count("room-6"), 0);
    }
}
