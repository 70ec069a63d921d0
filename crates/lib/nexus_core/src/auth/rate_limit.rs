//! In-memory login rate limiter.
//!
//! Fixed windows keyed by client identifier: the first attempt opens a
//! window of `window` length, later attempts count against it until it
//! expires. State is process-local and lost on restart.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Interval between background sweeps of expired windows.
pub const SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(5 * 60);

/// Limits applied to one class of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_attempts: u32,
}

impl RateLimitConfig {
    pub fn new(window: Duration, max_attempts: u32) -> Self {
        Self {
            window,
            max_attempts,
        }
    }
}

impl Default for RateLimitConfig {
    /// Five attempts per fifteen minutes.
    fn default() -> Self {
        Self::new(Duration::minutes(15), 5)
    }
}

/// Outcome of a single [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Whole seconds until the window resets, never less than one.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> i64 {
        let millis = (self.reset_at - now).num_milliseconds();
        ((millis + 999) / 1000).max(1)
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Shared attempt counter. Each check is an atomic read-modify-write on its key.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    /// Count an attempt for `key` and decide whether it may proceed.
    pub fn check(&self, key: &str, config: &RateLimitConfig) -> RateLimitDecision {
        self.check_at(key, config, Utc::now())
    }

    /// [`check`](Self::check) against an explicit clock.
    pub fn check_at(
        &self,
        key: &str,
        config: &RateLimitConfig,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let fresh = Window {
            count: 1,
            reset_at: now + config.window,
        };
        let opened = RateLimitDecision {
            allowed: true,
            remaining: config.max_attempts.saturating_sub(1),
            reset_at: fresh.reset_at,
        };

        // The entry guard holds the shard lock for the whole read-modify-write.
        match self.windows.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if occupied.get().reset_at >= now => {
                let window = occupied.get_mut();
                if window.count >= config.max_attempts {
                    return RateLimitDecision {
                        allowed: false,
                        remaining: 0,
                        reset_at: window.reset_at,
                    };
                }
                window.count += 1;
                RateLimitDecision {
                    allowed: true,
                    remaining: config.max_attempts - window.count,
                    reset_at: window.reset_at,
                }
            }
            Entry::Occupied(mut expired) => {
                expired.insert(fresh);
                opened
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                opened
            }
        }
    }

    /// Forget all attempts for `key`.
    pub fn reset(&self, key: &str) {
        self.windows.remove(key);
    }

    /// Number of tracked keys, expired or not.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Drop windows that expired before `now`. Returns how many were removed.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, w| w.reset_at >= now);
        before.saturating_sub(self.windows.len())
    }

    /// Spawn the periodic sweep. Stops when `shutdown` is cancelled.
    pub fn spawn_sweep_task(
        self: &Arc<Self>,
        every: StdDuration,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let removed = limiter.sweep_at(Utc::now());
                        if removed > 0 {
                            debug!(removed, "swept expired rate-limit windows");
                        }
                    }
                }
            }
        })
    }
}
