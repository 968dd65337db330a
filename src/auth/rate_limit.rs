//! Rate limiting primitives for login.

use parking_lot::Mutex;
use std::{
    collections::{HashMap, VecDeque},
    time::{Duration, Instant},
};

pub const DEFAULT_LOGIN_ATTEMPTS: usize = 5;
pub const DEFAULT_LOGIN_WINDOW: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    /// Record an attempt for `key` and decide whether it may proceed.
    fn check(&self, key: &str) -> RateLimitDecision;

    /// Forget keys with no attempts left inside the window.
    fn prune(&self);
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check(&self, _key: &str) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    fn prune(&self) {}
}

/// At most `limit` allowed attempts per key in any trailing `window`.
///
/// Only allowed attempts are recorded, so a client hammering the endpoint
/// while limited does not extend its own lockout.
#[derive(Debug)]
pub struct SlidingWindowRateLimiter {
    limit: usize,
    window: Duration,
    attempts: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowRateLimiter {
    #[must_use]
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Same as `check`, with an explicit clock.
    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut attempts = self.attempts.lock();
        let history = attempts.entry(key.to_string()).or_default();
        self.evict(history, now);

        if history.len() >= self.limit {
            return RateLimitDecision::Limited;
        }
        history.push_back(now);
        RateLimitDecision::Allowed
    }

    pub fn prune_at(&self, now: Instant) {
        let mut attempts = self.attempts.lock();
        attempts.retain(|_, history| {
            self.evict(history, now);
            !history.is_empty()
        });
    }

    /// Number of keys currently tracked.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.attempts.lock().len()
    }

    // Only attempts older than `window` are dropped; one exactly `window` old still counts.
    fn evict(&self, history: &mut VecDeque<Instant>, now: Instant) {
        while history
            .front()
            .is_some_and(|first| now.saturating_duration_since(*first) > self.window)
        {
            history.pop_front();
        }
    }
}

impl Default for SlidingWindowRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_LOGIN_ATTEMPTS, DEFAULT_LOGIN_WINDOW)
    }
}

impl RateLimiter for SlidingWindowRateLimiter {
    fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    fn prune(&self) {
        self.prune_at(Instant::now());
    }
}
