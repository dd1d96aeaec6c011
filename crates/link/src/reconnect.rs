//! Bounded reconnection policy for the push transport.
//!
//! The coordinator asks [`ReconnectPolicy::next_attempt`] each time the push
//! transport drops or a handshake fails. The policy hands out at most
//! `max_attempts` attempts, each after the same fixed delay, then reports
//! exhaustion until [`ReconnectPolicy::reset`] is called after a successful
//! handshake.

use std::time::Duration;

/// Tunable parameters for the reconnect strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before every reconnection attempt.
    pub delay: Duration,
    /// Attempts allowed before giving up until the next success.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(2), 5)
    }
}

impl ReconnectConfig {
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }
}

/// A scheduled reconnection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectAttempt {
    /// 1-based attempt number since the last successful handshake.
    pub number: u32,
    pub delay: Duration,
}

/// Attempt counter for the push transport.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Claim the next attempt, or `None` once the budget is spent.
    pub fn next_attempt(&mut self) -> Option<ReconnectAttempt> {
        if self.is_exhausted() {
            return None;
        }
        self.attempts += 1;
        Some(ReconnectAttempt {
            number: self.attempts,
            delay: self.config.delay,
        })
    }

    /// Forget previous failures; called once a handshake succeeds.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.config.max_attempts
    }
}
