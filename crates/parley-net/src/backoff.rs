//! Exponential reconnect backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Doubling delay with a cap and ±fractional jitter. `reset` after a
/// successful connect so the next outage starts from the base again.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: f64,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max,
            jitter,
            attempt: 0,
        }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delay before the next attempt: `base * 2^n` capped at `max`, with
    /// jitter applied after capping.
    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.attempt.min(16);
        self.attempt = self.attempt.saturating_add(1);

        let base_ms = self.base.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        let capped = base_ms.saturating_mul(1u64 << exponent).min(max_ms);

        if self.jitter <= 0.0 || capped == 0 {
            return Duration::from_millis(capped);
        }
        let spread = (capped as f64 * self.jitter) as i64;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_millis(capped.saturating_add_signed(offset))
    }
}
