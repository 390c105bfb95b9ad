// Per-URL sliding-window rate limiter
use crate::domain::traits::Clock;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Admits at most `max_requests` checks per URL within any trailing `window`.
///
/// Each key keeps the timestamps of its admitted checks. Stale timestamps are
/// pruned on every call; a rejected check does not consume a slot.
pub struct RateLimiter {
    windows: DashMap<String, VecDeque<tokio::time::Instant>>,
    window: Duration,
    max_requests: usize,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            window,
            max_requests,
            clock,
        }
    }

    pub fn try_admit(&self, url: &str) -> bool {
        let now = self.clock.now();
        let mut timestamps = self.windows.entry(url.to_string()).or_default();

        // Remove checks older than the window
        while let Some(&oldest) = timestamps.front() {
            if now.duration_since(oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() >= self.max_requests {
            warn!("Rate limit exceeded for {}", url);
            return false;
        }

        timestamps.push_back(now);
        debug!(
            "Admitted {} ({}/{} in window)",
            url,
            timestamps.len(),
            self.max_requests
        );
        true
    }

    /// Checks still counted against `url` right now.
    pub fn in_window(&self, url: &str) -> usize {
        let now = self.clock.now();
        self.windows
            .get(url)
            .map(|ts| {
                ts.iter()
                    .filter(|&&t| now.duration_since(t) < self.window)
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}
