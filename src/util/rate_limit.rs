//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified events per second
pub fn create_limiter(events_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(events_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Outbound broadcast cap, matching the hosted realtime default
pub const BROADCAST_RATE_LIMIT: u32 = 10;

/// Per-client limiter for outbound broadcasts
#[derive(Clone)]
pub struct BroadcastLimiter {
    limiter: Arc<Limiter>,
}

impl BroadcastLimiter {
    pub fn new(events_per_second: u32) -> Self {
        Self {
            limiter: create_limiter(events_per_second),
        }
    }

    /// Check if one more broadcast is allowed right now (returns true if allowed)
    pub fn check(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl Default for BroadcastLimiter {
    fn default() -> Self {
        Self::new(BROADCAST_RATE_LIMIT)
    }
}
