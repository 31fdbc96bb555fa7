use std::time::Duration;

use rand::Rng;

/// Exponential reconnect backoff with equal jitter.
///
/// Attempt `n` (1-based) waits between half and all of
/// `min(initial_delay * multiplier^(n-1), max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Consecutive failed attempts before giving up. Zero disables reconnects.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Upper bound of the wait before attempt `attempt`, before jitter.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Jittered wait before attempt `attempt`, or `None` once attempts are
    /// exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let ceiling = self.ceiling(attempt).as_millis() as u64;
        let half = ceiling / 2;
        let jitter = if ceiling > half {
            rand::rng().random_range(0..=ceiling - half)
        } else {
            0
        };
        Some(Duration::from_millis(half + jitter))
    }
}
