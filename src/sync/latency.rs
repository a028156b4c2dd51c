//! Round-trip latency diagnostics

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::oneshot;

/// Number of samples kept for averaging
pub const DEFAULT_WINDOW: usize = 20;

/// Probes without an ack after this long count as lost
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// An acked broadcast awaiting its acknowledgement
#[derive(Debug)]
pub struct PendingProbe {
    started: Instant,
    ack: oneshot::Receiver<()>,
}

impl PendingProbe {
    pub fn new(started: Instant, ack: oneshot::Receiver<()>) -> Self {
        Self { started, ack }
    }
}

/// What polling a pending probe found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Waiting,
    Acked(Duration),
    Lost,
}

/// Summary exposed on the health surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub last_ms: Option<f64>,
    pub average_ms: Option<f64>,
    pub samples: usize,
    pub lost: u64,
}

/// Rolling window of round-trip samples
#[derive(Debug)]
pub struct LatencyTracker {
    window: usize,
    probe_timeout: Duration,
    samples: VecDeque<Duration>,
    lost: u64,
}

impl LatencyTracker {
    pub fn new(window: usize, probe_timeout: Duration) -> Self {
        Self {
            window: window.max(1),
            probe_timeout,
            samples: VecDeque::with_capacity(window.max(1)),
            lost: 0,
        }
    }

    pub fn record(&mut self, rtt: Duration) {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(rtt);
    }

    pub fn record_lost(&mut self) {
        self.lost += 1;
    }

    /// Check a pending probe without blocking; acked and lost probes are recorded
    pub fn poll(&mut self, probe: &mut PendingProbe, now: Instant) -> ProbeStatus {
        match probe.ack.try_recv() {
            Ok(()) => {
                let rtt = now.saturating_duration_since(probe.started);
                self.record(rtt);
                ProbeStatus::Acked(rtt)
            }
            Err(oneshot::error::TryRecvError::Empty) => {
                if now.saturating_duration_since(probe.started) > self.probe_timeout {
                    self.record_lost();
                    ProbeStatus::Lost
                } else {
                    ProbeStatus::Waiting
                }
            }
            Err(oneshot::error::TryRecvError::Closed) => {
                self.record_lost();
                ProbeStatus::Lost
            }
        }
    }

    pub fn last(&self) -> Option<Duration> {
        self.samples.back().copied()
    }

    pub fn average(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let total: Duration = self.samples.iter().sum();
        Some(total / self.samples.len() as u32)
    }

    pub fn summary(&self) -> LatencySummary {
        LatencySummary {
            last_ms: self.last().map(|d| d.as_secs_f64() * 1000.0),
            average_ms: self.average().map(|d| d.as_secs_f64() * 1000.0),
            samples: self.samples.len(),
            lost: self.lost,
        }
    }
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_PROBE_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_keeps_latest_samples() {
        let mut tracker = LatencyTracker::new(3, DEFAULT_PROBE_TIMEOUT);
        for ms in [10, 20, 30, 40] {
            tracker.record(Duration::from_millis(ms));
        }
        assert_eq!(tracker.average(), Some(Duration::from_millis(30)));
        assert_eq!(tracker.last(), Some(Duration::from_millis(40)));
        assert_eq!(tracker.summary().samples, 3);
    }

    #[test]
    fn acked_probe_is_recorded() {
        let mut tracker = LatencyTracker::default();
        let (tx, rx) = oneshot::channel();
        let started = Instant::now();
        let mut probe = PendingProbe::new(started, rx);

        assert_eq!(tracker.poll(&mut probe, started), ProbeStatus::Waiting);
        tx.send(()).unwrap();
        let status = tracker.poll(&mut probe, started + Duration::from_millis(12));
        assert_eq!(status, ProbeStatus::Acked(Duration::from_millis(12)));
        assert_eq!(tracker.summary().last_ms, Some(12.0));
    }

    #[test]
    fn stale_or_dropped_probes_count_as_lost() {
        let mut tracker = LatencyTracker::new(5, Duration::from_millis(100));
        let started = Instant::now();

        let (_tx, rx) = oneshot::channel();
        let mut stale = PendingProbe::new(started, rx);
        assert_eq!(
            tracker.poll(&mut stale, started + Duration::from_millis(101)),
            ProbeStatus::Lost
        );

        let (tx, rx) = oneshot::channel::<()>();
        drop(tx);
        let mut dropped = PendingProbe::new(started, rx);
        assert_eq!(tracker.poll(&mut dropped, started), ProbeStatus::Lost);

        assert_eq!(tracker.summary().lost, 2);
        assert_eq!(tracker.average(), None);
    }
}
