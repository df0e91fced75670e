//! Call pacing: fixed inter-call spacing plus exponential backoff after failures

use std::time::{Duration, Instant};

use crate::annotator::FailureKind;

/// Backoff parameters for one run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Minimum spacing between call starts; also the first backoff step
    pub base_delay: Duration,
    pub multiplier: f64,
    /// Total attempts per row
    pub max_retries_per_row: u32,
    pub max_backoff: Duration,
    /// Extra factor for quota failures
    pub quota_factor: f64,
}

impl BackoffPolicy {
    /// Pause after the `streak`-th consecutive retryable failure:
    /// `base * multiplier^(streak-1)`, scaled for quota failures, capped.
    pub fn delay_after(&self, streak: u32, kind: FailureKind) -> Duration {
        if streak == 0 {
            return Duration::ZERO;
        }
        let exponent = (streak - 1).min(64) as i32;
        let mut secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if kind == FailureKind::QuotaExceeded {
            secs *= self.quota_factor;
        }
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Gate in front of every annotator call.
///
/// Tracks when the last call started and how many retryable failures have
/// happened in a row. A success resets the streak.
pub struct Pacer {
    policy: BackoffPolicy,
    last_call: Option<Instant>,
    streak: u32,
    sleeper: fn(Duration),
}

impl std::fmt::Debug for Pacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pacer")
            .field("policy", &self.policy)
            .field("streak", &self.streak)
            .finish_non_exhaustive()
    }
}

impl Pacer {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            last_call: None,
            streak: 0,
            sleeper: std::thread::sleep,
        }
    }

    /// Replace the sleep function (tests record delays instead of waiting)
    pub fn with_sleeper(mut self, sleeper: fn(Duration)) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Consecutive retryable failures since the last success
    pub fn streak(&self) -> u32 {
        self.streak
    }

    /// Remaining inter-call wait at `now`
    pub fn wait_needed(&self, now: Instant) -> Duration {
        match self.last_call {
            Some(last) => self
                .policy
                .base_delay
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Block until the inter-call delay has elapsed, then mark a call start.
    pub fn gate(&mut self) {
        let wait = self.wait_needed(Instant::now());
        if !wait.is_zero() {
            (self.sleeper)(wait);
        }
        self.last_call = Some(Instant::now());
    }

    pub fn on_success(&mut self) {
        self.streak = 0;
    }

    /// A row was given up; the next row starts a fresh streak
    pub fn end_row(&mut self) {
        self.streak = 0;
    }

    /// Grow the streak and sleep the backoff delay. Returns the delay.
    pub fn on_failure(&mut self, kind: FailureKind) -> Duration {
        self.streak = self.streak.saturating_add(1);
        let delay = self.policy.delay_after(self.streak, kind);
        if !delay.is_zero() {
            log::debug!("backing off {:.1}s (streak {})", delay.as_secs_f64(), self.streak);
            (self.sleeper)(delay);
        }
        delay
    }
}
