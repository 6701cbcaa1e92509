//! Per-client, per-route sliding-window admission control.
//!
//! Each bucket keeps the instants of every request seen within the window,
//! rejected ones included, so a client hammering the service stays limited
//! until it backs off for a full window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;

pub const SUBMIT_ROUTE: &str = "POST:submit";
pub const LIST_ROUTE: &str = "GET:list";

/// Bucket name for requests with no resolvable client identity.
pub const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Whole seconds until the oldest request in the window expires.
    /// 0 when the window holds at most one request.
    pub retry_after_secs: u64,
}

/// Decides whether a request may proceed. Never fails.
pub trait AdmissionControl: Send + Sync {
    fn evaluate(&self, client: &str, route: &str) -> AdmissionDecision;

    /// Number of buckets currently held.
    fn tracked_keys(&self) -> usize {
        0
    }

    /// Drop buckets with no request inside the window. Returns how many
    /// were removed.
    fn sweep(&self) -> usize {
        0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LimiterConfig {
    pub window: Duration,
    pub max_requests: u32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 20,
        }
    }
}

pub struct SlidingWindowLimiter {
    config: LimiterConfig,
    buckets: DashMap<String, VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    fn bucket_key(client: &str, route: &str) -> String {
        let client = if client.is_empty() {
            UNKNOWN_CLIENT
        } else {
            client
        };
        format!("{client}::{route}")
    }

    /// Evaluate one request arriving at `now`.
    pub fn evaluate_at(&self, client: &str, route: &str, now: Instant) -> AdmissionDecision {
        let window = self.config.window;
        let max = self.config.max_requests;

        // The entry guard holds the shard lock for the whole
        // prune-append-count sequence.
        let mut bucket = self
            .buckets
            .entry(Self::bucket_key(client, route))
            .or_default();

        if let Some(window_start) = now.checked_sub(window) {
            bucket.retain(|&t| t > window_start);
        }
        bucket.push_back(now);

        let count = u32::try_from(bucket.len()).unwrap_or(u32::MAX);
        let retry_after_secs = match bucket.front() {
            Some(&oldest) if count > 1 => {
                let elapsed = now.saturating_duration_since(oldest);
                ceil_secs(window.saturating_sub(elapsed))
            }
            _ => 0,
        };

        AdmissionDecision {
            allowed: count <= max,
            remaining: max.saturating_sub(count),
            retry_after_secs,
        }
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let Some(window_start) = now.checked_sub(self.config.window) else {
            return 0;
        };
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| bucket.back().is_some_and(|&newest| newest > window_start));
        before.saturating_sub(self.buckets.len())
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(LimiterConfig::default())
    }
}

impl AdmissionControl for SlidingWindowLimiter {
    fn evaluate(&self, client: &str, route: &str) -> AdmissionDecision {
        self.evaluate_at(client, route, Instant::now())
    }

    fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }

    fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
