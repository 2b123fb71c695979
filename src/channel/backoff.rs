//! Reconnect backoff schedule.
//!
//! Delays between reconnection attempts grow geometrically up to a cap:
//! `min(cap, base × growth^attempt)`. The attempt counter is bumped on
//! every failed or closed attempt and reset to zero on a successful
//! open, so the channel recovers quickly from transient drops while
//! bounding reconnection storms during an outage.
//!
//! This is a pure value type; the channel owns the actual timer.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::config::SessionConfig;

// ============================================================================
// ReconnectBackoff
// ============================================================================

/// Geometric backoff schedule for reconnection attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectBackoff {
    /// First delay.
    base: Duration,
    /// Multiplier per failed attempt.
    growth: f64,
    /// Upper bound on the delay.
    cap: Duration,
    /// Failed attempts since the last successful open.
    attempt: u32,
}

impl ReconnectBackoff {
    /// Creates a backoff schedule.
    #[inline]
    #[must_use]
    pub fn new(base: Duration, growth: f64, cap: Duration) -> Self {
        Self {
            base,
            growth,
            cap,
            attempt: 0,
        }
    }

    /// Creates a backoff schedule from session configuration.
    #[inline]
    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.backoff_base, config.backoff_growth, config.backoff_cap)
    }

    /// Returns the delay for the next attempt and bumps the counter.
    #[must_use]
    pub fn next_delay(&mut self) -> Duration {
        let scaled = self.base.as_secs_f64() * self.growth.powi(self.attempt as i32);
        self.attempt = self.attempt.saturating_add(1);

        if !scaled.is_finite() || scaled >= self.cap.as_secs_f64() {
            return self.cap;
        }
        Duration::from_secs_f64(scaled)
    }

    /// Resets the schedule after a successful open.
    #[inline]
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Returns the number of failed attempts since the last reset.
    #[inline]
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn default_backoff() -> ReconnectBackoff {
        ReconnectBackoff::new(Duration::from_millis(400), 1.6, Duration::from_millis(6000))
    }

    #[test]
    fn test_first_delay_is_base() {
        let mut backoff = default_backoff();
        assert_eq!(backoff.next_delay(), Duration::from_millis(400));
    }

    #[test]
    fn test_delays_grow_to_cap() {
        let mut backoff = default_backoff();
        let delays: Vec<_> = (0..12).map(|_| backoff.next_delay()).collect();

        for pair in delays.windows(2) {
            assert!(pair[1] >= pair[0], "delays must be non-decreasing: {delays:?}");
        }
        assert_eq!(*delays.last().unwrap(), Duration::from_millis(6000));
    }

    #[test]
    fn test_reset_returns_to_base() {
        let mut backoff = default_backoff();
        for _ in 0..5 {
            let _ = backoff.next_delay();
        }
        assert_eq!(backoff.attempt(), 5);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(400));
    }

    #[test]
    fn test_huge_attempt_count_saturates_at_cap() {
        let mut backoff = default_backoff();
        backoff.attempt = u32::MAX;
        assert_eq!(backoff.next_delay(), Duration::from_millis(6000));
        assert_eq!(backoff.attempt(), u32::MAX);
    }

    proptest! {
        #[test]
        fn test_delay_law(
            base_ms in 1u64..2000,
            growth in 1.0f64..4.0,
            cap_ms in 1u64..60_000,
            attempts in 1usize..64,
        ) {
            let base = Duration::from_millis(base_ms);
            let cap = Duration::from_millis(cap_ms);
            let mut backoff = ReconnectBackoff::new(base, growth, cap);

            let mut previous = Duration::ZERO;
            for _ in 0..attempts {
                let delay = backoff.next_delay();
                prop_assert!(delay <= cap);
                prop_assert!(delay >= previous || delay == cap);
                previous = delay;
            }
        }
    }
}
