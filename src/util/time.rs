//! Time utilities for the simulation clock

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Simulation timestamps, milliseconds since the session clock started
pub type Millis = u64;

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Process start time for uptime tracking
static PROCESS_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize process start time (call once at startup)
pub fn init_process_time() {
    PROCESS_START.get_or_init(Instant::now);
}

/// Get process uptime in seconds
pub fn uptime_secs() -> u64 {
    PROCESS_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Monotonic clock handing out `Millis` for the frame driver
#[derive(Debug, Clone)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now(&self) -> Millis {
        self.start.elapsed().as_millis() as Millis
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Tick period for a frames-per-second rate
pub fn frame_period(frame_rate: u32) -> Duration {
    Duration::from_micros(1_000_000 / frame_rate.max(1) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_period_from_rate() {
        assert_eq!(frame_period(30), Duration::from_micros(33_333));
        // zero is clamped rather than dividing by zero
        assert_eq!(frame_period(0), Duration::from_secs(1));
    }

    #[test]
    fn session_clock_is_monotonic() {
        let clock = SessionClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
