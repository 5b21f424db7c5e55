//! Reconnect policy: exponential backoff and attempt accounting
//!
//! Kept free of I/O so the policy can be tested without a network.

use rand::Rng;
use std::time::Duration;

/// Exponential backoff schedule: `base * 2^(attempt - 1)`, capped at `max`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    /// Fraction of the delay that may be shaved off at random (0.0..=1.0)
    pub jitter: f64,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Nominal delay before reconnect attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |d| d.min(self.max))
    }

    /// Nominal delay reduced by a random share of up to `jitter`
    pub fn jittered_delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let nominal = self.delay_for(attempt);
        if self.jitter <= 0.0 {
            return nominal;
        }
        let cut = rng.random_range(0.0..=self.jitter);
        nominal.mul_f64(1.0 - cut)
    }
}

/// What to do after a connection attempt or session failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Wait `delay`, then try again
    Retry { attempt: u32, delay: Duration },
    /// All attempts used up
    GiveUp { attempts: u32 },
    /// Reconnection is turned off
    Disabled,
}

/// Counts consecutive failures and turns them into [`ReconnectDecision`]s
#[derive(Debug, Clone)]
pub struct ReconnectTracker {
    backoff: Backoff,
    auto_reconnect: bool,
    max_attempts: u32,
    attempt: u32,
}

impl ReconnectTracker {
    pub fn new(backoff: Backoff, auto_reconnect: bool, max_attempts: u32) -> Self {
        Self {
            backoff,
            auto_reconnect,
            max_attempts,
            attempt: 0,
        }
    }

    /// Current number of consecutive failures
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// A connection opened; the failure streak is over
    pub fn on_connected(&mut self) {
        self.attempt = 0;
    }

    /// Record a failure and decide whether to retry, using `rng` for jitter
    pub fn on_failure_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> ReconnectDecision {
        if !self.auto_reconnect {
            return ReconnectDecision::Disabled;
        }
        self.attempt += 1;
        if self.attempt > self.max_attempts {
            return ReconnectDecision::GiveUp {
                attempts: self.max_attempts,
            };
        }
        ReconnectDecision::Retry {
            attempt: self.attempt,
            delay: self.backoff.jittered_delay(self.attempt, rng),
        }
    }

    pub fn on_failure(&mut self) -> ReconnectDecision {
        self.on_failure_with(&mut rand::rng())
    }
}
