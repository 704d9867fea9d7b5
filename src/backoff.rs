//! Reconnect backoff for one device.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::GlobalConfig;

/// Tracks reconnect timing after connection failures.
///
/// The n-th consecutive failure (counting from zero) waits
/// `initial + n * initial / inc_div`, capped at `max`.
#[derive(Debug, Clone)]
pub struct BackoffController {
    initial: Duration,
    max: Duration,
    step: Duration,
    current: Duration,
    failures: u32,
    next_retry_at: Option<Instant>,
}

impl BackoffController {
    pub fn new(initial: Duration, max: Duration, inc_div: u32) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            step: initial / inc_div.max(1),
            current: initial,
            failures: 0,
            next_retry_at: None,
        }
    }

    pub fn from_config(config: &GlobalConfig) -> Self {
        Self::new(
            config.initial_delay_on_failure,
            config.max_delay_on_failure,
            config.delay_inc_div,
        )
    }

    /// Record a failure and push the next retry into the future.
    pub fn mark_failure(&mut self, now: Instant) {
        self.next_retry_at = Some(now + self.current);
        self.failures = self.failures.saturating_add(1);
        self.current = (self.current + self.step).min(self.max);
    }

    /// Reset after a successful connect.
    pub fn mark_success(&mut self) {
        self.current = self.initial;
        self.failures = 0;
        self.next_retry_at = None;
    }

    pub fn should_retry(&self, now: Instant) -> bool {
        self.next_retry_at.is_none_or(|at| now >= at)
    }

    /// Consecutive failures since the last success.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Delay the next failure will wait.
    pub fn current_delay(&self) -> Duration {
        self.current
    }
}
