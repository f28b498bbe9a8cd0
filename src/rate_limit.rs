//! Sliding-window rate limiting keyed by (client, route class).
//!
//! Limits per class are configured via environment variables
//! (`RATE_LIMIT_{VERIFY,LOGIN,API,OTHER}_{MAX,WINDOW}`):
//! - verify: `/api/verify`, the license check itself
//! - login: any path containing `/login`
//! - api: everything else under `/api/`
//! - other: all remaining paths
//!
//! The counters live in a [`RateLimitStore`] shared by every request. The
//! in-memory store is process-wide; a deployment running several instances
//! can plug in a store backed by a shared cache.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use strum::{AsRefStr, Display};

use crate::clock::Clock;
use crate::config::{RateLimitConfig, WindowLimit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RouteClass {
    Verify,
    Login,
    Api,
    Other,
}

impl RouteClass {
    pub fn classify(path: &str) -> Self {
        if path.starts_with("/api/verify") {
            RouteClass::Verify
        } else if path.contains("/login") {
            RouteClass::Login
        } else if path.starts_with("/api/") {
            RouteClass::Api
        } else {
            RouteClass::Other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    /// Seconds until the oldest counted request leaves the window.
    Limited { retry_after: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Shared counter storage.
///
/// `hit` must evict, check and record as one atomic step so that concurrent
/// requests from the same client cannot both slip under the limit.
pub trait RateLimitStore: Send + Sync {
    fn hit(&self, key: &str, now: i64, limit: WindowLimit) -> RateDecision;

    /// Drop keys with no request newer than `max_window` seconds. Returns the
    /// number of keys removed.
    fn purge_idle(&self, now: i64, max_window: i64) -> usize;
}

#[derive(Debug, Default)]
pub struct MemoryRateLimitStore {
    windows: Mutex<HashMap<String, VecDeque<i64>>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<i64>>> {
        // A panic while holding the lock leaves the map usable.
        self.windows.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn tracked_keys(&self) -> usize {
        self.lock().len()
    }
}

impl RateLimitStore for MemoryRateLimitStore {
    fn hit(&self, key: &str, now: i64, limit: WindowLimit) -> RateDecision {
        let mut windows = self.lock();
        let window = windows.entry(key.to_string()).or_default();

        // Requests at or before `now - window_secs` are outside the window.
        let cutoff = now - limit.window_secs;
        while window.front().is_some_and(|&ts| ts <= cutoff) {
            window.pop_front();
        }

        if window.len() >= limit.max_requests as usize {
            let oldest = window.front().copied().unwrap_or(now);
            let retry_after = (oldest + limit.window_secs - now).max(1) as u64;
            return RateDecision::Limited { retry_after };
        }

        window.push_back(now);
        RateDecision::Allowed {
            remaining: limit.max_requests - window.len() as u32,
        }
    }

    fn purge_idle(&self, now: i64, max_window: i64) -> usize {
        let cutoff = now - max_window;
        let mut windows = self.lock();
        let before = windows.len();
        windows.retain(|_, w| w.back().is_some_and(|&ts| ts > cutoff));
        before - windows.len()
    }
}

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Limiter backed by a fresh process-wide in-memory store.
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_store(config, clock, Arc::new(MemoryRateLimitStore::new()))
    }

    pub fn with_store(
        config: RateLimitConfig,
        clock: Arc<dyn Clock>,
        store: Arc<dyn RateLimitStore>,
    ) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn limit_for(&self, class: RouteClass) -> WindowLimit {
        match class {
            RouteClass::Verify => self.config.verify,
            RouteClass::Login => self.config.login,
            RouteClass::Api => self.config.api,
            RouteClass::Other => self.config.other,
        }
    }

    /// Count a request from `client` against `class`.
    pub fn check(&self, client: &str, class: RouteClass) -> RateDecision {
        let key = format!("{}:{}", class, client);
        self.store.hit(&key, self.clock.now(), self.limit_for(class))
    }

    pub fn purge_idle(&self) -> usize {
        self.store
            .purge_idle(self.clock.now(), self.config.longest_window())
    }
}
