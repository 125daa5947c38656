//! Per-upstream-service call budgets.
//!
//! A sliding window: the budget replenishes continuously as old calls age
//! out, rather than resetting at fixed boundaries. Single-process only.

use crate::clock::{system_clock, SharedClock};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// Well-known upstream service names.
pub mod services {
    pub const OPEN_METEO: &str = "open-meteo";
    pub const AVIATIONSTACK: &str = "aviationstack";
    pub const GOOGLE_MAPS: &str = "google-maps";
}

/// Admission control for calls to one upstream service.
pub trait RateLimiter: Send + Sync {
    /// Returns `true` and records the call if the budget allows it.
    /// Exhaustion is a normal outcome, not an error.
    fn admit(&self) -> bool;

    /// Calls still available in the current window.
    fn remaining(&self) -> u32;
}

/// Budget of `max_calls` per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBudget {
    pub max_calls: u32,
    pub window: Duration,
}

impl RateBudget {
    pub fn per_minute(max_calls: u32) -> Self {
        Self {
            max_calls,
            window: Duration::seconds(60),
        }
    }

    pub fn new(max_calls: u32, window_seconds: u64) -> Self {
        Self {
            max_calls,
            window: Duration::seconds(window_seconds as i64),
        }
    }
}

/// Sliding-window limiter. Prune, compare and append happen under one lock
/// so concurrent callers cannot double-admit past the budget.
pub struct SlidingWindowLimiter {
    service: String,
    budget: RateBudget,
    clock: SharedClock,
    calls: Mutex<VecDeque<DateTime<Utc>>>,
}

impl SlidingWindowLimiter {
    pub fn new(service: &str, budget: RateBudget) -> Self {
        Self::with_clock(service, budget, system_clock())
    }

    pub fn with_clock(service: &str, budget: RateBudget, clock: SharedClock) -> Self {
        Self {
            service: service.to_string(),
            budget,
            clock,
            calls: Mutex::new(VecDeque::with_capacity(budget.max_calls as usize)),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn budget(&self) -> RateBudget {
        self.budget
    }

    fn prune(calls: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) {
        while let Some(oldest) = calls.front() {
            if now - *oldest >= window {
                calls.pop_front();
            } else {
                break;
            }
        }
    }
}

impl RateLimiter for SlidingWindowLimiter {
    fn admit(&self) -> bool {
        let now = self.clock.utc();
        let mut calls = self.calls.lock();
        Self::prune(&mut calls, now, self.budget.window);

        if calls.len() < self.budget.max_calls as usize {
            calls.push_back(now);
            debug!(
                "{} call admitted ({}/{})",
                self.service,
                calls.len(),
                self.budget.max_calls
            );
            true
        } else {
            warn!(
                "{} rate limit reached ({} calls per {}s)",
                self.service,
                self.budget.max_calls,
                self.budget.window.num_seconds()
            );
            false
        }
    }

    fn remaining(&self) -> u32 {
        let now = self.clock.utc();
        let mut calls = self.calls.lock();
        Self::prune(&mut calls, now, self.budget.window);
        self.budget.max_calls.saturating_sub(calls.len() as u32)
    }
}

/// One limiter per upstream service, shared by every client that targets it.
#[derive(Clone, Default)]
pub struct RateLimiterRegistry {
    limiters: Arc<Mutex<HashMap<String, Arc<dyn RateLimiter>>>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a limiter, replacing any previous one for `service`.
    pub fn register(&self, service: &str, limiter: Arc<dyn RateLimiter>) {
        self.limiters.lock().insert(service.to_string(), limiter);
    }

    /// The limiter for `service`, creating a sliding window with `budget`
    /// on first use.
    pub fn limiter_for(&self, service: &str, budget: RateBudget) -> Arc<dyn RateLimiter> {
        self.limiters
            .lock()
            .entry(service.to_string())
            .or_insert_with(|| Arc::new(SlidingWindowLimiter::new(service, budget)))
            .clone()
    }

    pub fn get(&self, service: &str) -> Option<Arc<dyn RateLimiter>> {
        self.limiters.lock().get(service).cloned()
    }
}
