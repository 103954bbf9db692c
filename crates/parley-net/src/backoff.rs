//! Exponential reconnect backoff.

use std::time::Duration;

use parley_shared::constants::{RECONNECT_INITIAL_BACKOFF, RECONNECT_MAX_BACKOFF};

/// Configuration for reconnect delays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub initial: Duration,
    /// Upper bound for any single delay
    pub max: Duration,
    /// Growth factor applied after every failed attempt
    pub multiplier: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: RECONNECT_INITIAL_BACKOFF,
            max: RECONNECT_MAX_BACKOFF,
            multiplier: 2,
        }
    }
}

impl BackoffConfig {
    #[must_use]
    pub fn with_initial(mut self, initial: Duration) -> Self {
        self.initial = initial;
        self
    }

    #[must_use]
    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Backoff {
    pub attempts: u32,
    current: Duration,
    config: BackoffConfig,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            attempts: 0,
            current: config.initial.min(config.max),
            config,
        }
    }

    /// Delay to wait before the next attempt; grows the following one.
    pub fn next_delay(&mut self) -> Duration {
        self.attempts += 1;
        let wait = self.current;
        self.current = self
            .current
            .saturating_mul(self.config.multiplier.max(1))
            .min(self.config.max);
        wait
    }

    /// Call once a connection is fully established.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current = self.config.initial.min(self.config.max);
    }
}
