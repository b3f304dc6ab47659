/// Exponential backoff schedule for reconnecting push channels
use rand::Rng;
use std::time::Duration;

/// Reconnect delay policy.
///
/// Attempt `n` (zero-based) waits `initial_delay * multiplier^n`, capped at
/// `max_delay`. With the defaults this yields 1s, 2s, 4s, 8s, 16s, 30s, 30s...
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first reconnect attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Growth factor between consecutive attempts
    pub multiplier: f64,
    /// Give up after this many attempts (`None` retries forever)
    pub max_attempts: Option<u32>,
    /// Add random jitter to each delay (±20%)
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: Some(10),
            jitter: false,
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait before attempt `attempt` (zero-based), without jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64;
        let cap = self.max_delay.as_millis() as f64;
        let factor = self.multiplier.max(1.0).powi(attempt.min(64) as i32);
        let millis = (base * factor).min(cap);
        Duration::from_millis(millis as u64)
    }

    /// Whether another attempt is permitted after `attempts_made` attempts.
    pub fn allows(&self, attempts_made: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempts_made < max,
            None => true,
        }
    }

    /// Iterator over the delays of this policy.
    pub fn schedule(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            attempt: 0,
        }
    }
}

/// Stateful walk through a [`BackoffPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Backoff {
    /// Number of delays handed out so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Start over from `initial_delay` (after a successful reconnect).
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if !self.policy.allows(self.attempt) {
            return None;
        }
        let delay = self.policy.delay_for(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        Some(apply_jitter(delay, self.policy.jitter))
    }
}

fn apply_jitter(base: Duration, jitter: bool) -> Duration {
    if !jitter {
        return base;
    }
    let factor = 1.0 + rand::thread_rng().gen_range(-0.2..0.2);
    Duration::from_millis((base.as_millis() as f64 * factor) as u64)
}
