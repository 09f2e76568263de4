use std::time::Duration;

use crate::core::types::ClientConfig;

/// Reconnect pacing contract used by the connection manager.
///
/// Policy lives here, not in the manager: callers can select base/max/decay
/// per deployment, and tests can substitute a strategy that never retries.
pub trait ReconnectStrategy: Send + 'static {
    /// Advance the failure streak and return the delay for this attempt.
    fn next_delay(&mut self) -> Duration;

    /// A successful open ends the failure streak.
    fn reset(&mut self);

    /// False once the streak has exhausted the configured attempt budget.
    fn should_retry(&self) -> bool;

    /// Attempts consumed in the current failure streak.
    fn attempts(&self) -> u32;
}

/// Exponential backoff: `delay(n) = min(base * decay^(n-1), max)` for the
/// n-th attempt of a streak. Delays follow the formula exactly — the
/// schedule is part of the client's observable contract, so no jitter.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    decay: f64,
    max_attempts: Option<u32>,
    attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration, decay: f64, max_attempts: Option<u32>) -> Self {
        let decay = if decay.is_finite() && decay > 1.0 {
            decay
        } else {
            1.5
        };
        Self {
            base,
            max,
            decay,
            max_attempts,
            attempts: 0,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.reconnect_interval,
            config.max_reconnect_interval,
            config.reconnect_decay,
            config.max_reconnect_attempts,
        )
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30), 1.5, None)
    }
}

impl ReconnectStrategy for ExponentialBackoff {
    fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        let exp = f64::from(self.attempts - 1);
        let delay = self.base.as_secs_f64() * self.decay.powf(exp);
        Duration::from_secs_f64(delay.min(self.max.as_secs_f64()))
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }

    fn should_retry(&self) -> bool {
        match self.max_attempts {
            Some(max) => self.attempts < max,
            None => true,
        }
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }
}
