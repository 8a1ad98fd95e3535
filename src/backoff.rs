//! Reconnect backoff schedule.
//!
//! The [`SocketClient`](crate::SocketClient) dial loop waits between failed
//! connection attempts according to a fixed, monotonically non-decreasing
//! schedule:
//!
//! - first failure: 200ms
//! - below 1s: +200ms per failure
//! - below 4s: +500ms
//! - below 10s: +2s
//! - below 60s: +5s
//! - capped at 60s
//!
//! The schedule resets as soon as a connection succeeds. No jitter is applied.

use std::time::Duration;

/// Upper bound of the reconnect delay.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_millis(60_000);

/// Compute the delay (ms) that follows `current_ms` in the schedule.
///
/// `0` is the seed value of a fresh schedule.
pub const fn next_delay_ms(current_ms: u64) -> u64 {
    // ---
    match current_ms {
        0 => 200,
        d if d < 1_000 => d + 200,
        d if d < 4_000 => d + 500,
        d if d < 10_000 => d + 2_000,
        d if d < 60_000 => min_ms(d + 5_000, 60_000),
        _ => 60_000,
    }
}

const fn min_ms(a: u64, b: u64) -> u64 {
    if a < b {
        a
    } else {
        b
    }
}

/// Stateful reconnect delay tracker.
#[derive(Debug, Clone, Default)]
pub struct ReconnectBackoff {
    current_ms: u64,
}

impl ReconnectBackoff {
    // ---
    /// A fresh schedule, seeded at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the schedule and return the delay to wait before redialing.
    pub fn next_delay(&mut self) -> Duration {
        // ---
        self.current_ms = next_delay_ms(self.current_ms);
        Duration::from_millis(self.current_ms)
    }

    /// Restart the schedule after a successful connection.
    pub fn reset(&mut self) {
        self.current_ms = 0;
    }

    /// The most recently returned delay (zero for a fresh schedule).
    pub fn current(&self) -> Duration {
        Duration::from_millis(self.current_ms)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    const EXPECTED_MS: [u64; 26] = [
        200, 400, 600, 800, 1_000, 1_500, 2_000, 2_500, 3_000, 3_500, 4_000, 6_000, 8_000, 10_000,
        15_000, 20_000, 25_000, 30_000, 35_000, 40_000, 45_000, 50_000, 55_000, 60_000, 60_000,
        60_000,
    ];

    #[test]
    fn test_schedule_sequence() {
        // ---
        let mut backoff = ReconnectBackoff::new();
        let delays: Vec<u64> = (0..EXPECTED_MS.len())
            .map(|_| backoff.next_delay().as_millis() as u64)
            .collect();
        assert_eq!(delays, EXPECTED_MS);
    }

    #[test]
    fn test_reset_restarts_schedule() {
        // ---
        let mut backoff = ReconnectBackoff::new();
        for _ in 0..8 {
            backoff.next_delay();
        }
        assert_eq!(backoff.current(), Duration::from_millis(2_500));

        backoff.reset();
        assert_eq!(backoff.current(), Duration::ZERO);
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
    }

    #[test]
    fn test_cap_holds() {
        // ---
        assert_eq!(next_delay_ms(60_000), 60_000);
        assert_eq!(next_delay_ms(58_000), 60_000);
        assert_eq!(next_delay_ms(120_000), 60_000);
        assert_eq!(
            Duration::from_millis(next_delay_ms(55_000)),
            MAX_RECONNECT_DELAY
        );
    }

    #[test]
    fn test_schedule_never_decreases() {
        // ---
        let mut previous = 0;
        let mut current = 0;
        for _ in 0..100 {
            current = next_delay_ms(current);
            assert!(current >= previous);
            previous = current;
        }
        assert_eq!(current, 60_000);
    }
}
