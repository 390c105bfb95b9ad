use crate::domain::model::ClassificationResult;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Remote scoring service seam.
///
/// Implementations never fail: transport and decoding problems come back as
/// a fail-closed [`ClassificationResult`]. They also never retry.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, url: &str) -> ClassificationResult;
}

/// Receiver for advisory high-risk signals (desktop alert, blocker, ...).
pub trait Notifier: Send + Sync {
    fn notify_high_risk(&self, url: &str, confidence: f64);
}

/// Notifier that only logs.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_high_risk(&self, url: &str, confidence: f64) {
        tracing::warn!(
            "High-risk site detected: {} (confidence {:.2}%)",
            url,
            confidence * 100.0
        );
    }
}

/// Monotonic time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Production clock. Follows tokio's paused time in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Hand-driven clock for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset_ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_ms: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}
