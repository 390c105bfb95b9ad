use crate::domain::model::{ClassificationResult, Outcome};
use crate::domain::normalize::normalize_url;
use crate::domain::traits::Classifier;
use crate::infrastructure::config::OrchestratorConfig;
use crate::infrastructure::limiter::RateLimiter;
use crate::infrastructure::storage::cache::ResultCache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Side effects requested by a resolution. The orchestrator only records
/// them; whoever called it decides how to carry them out.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Phishing verdict above the high-risk threshold. Advisory only.
    HighRisk { url: String, confidence: f64 },
    /// URL was rate limited and should be queued again after `after`.
    RetryScheduled { url: String, after: Duration },
}

#[derive(Debug, Default)]
pub struct Resolution {
    pub outcomes: HashMap<String, Outcome>,
    pub events: Vec<Event>,
}

impl Resolution {
    pub fn results(&self) -> HashMap<String, ClassificationResult> {
        self.outcomes
            .iter()
            .map(|(url, outcome)| (url.clone(), outcome.result().clone()))
            .collect()
    }

    pub fn into_results(self) -> HashMap<String, ClassificationResult> {
        self.outcomes
            .into_iter()
            .map(|(url, outcome)| (url, outcome.into_result()))
            .collect()
    }

    pub fn retry_urls(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::RetryScheduled { url, .. } => Some(url.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Resolves URLs through cache, rate limiter and the scoring service.
///
/// Never fails: every problem ends up as a fail-closed result.
pub struct Orchestrator {
    cache: Arc<ResultCache>,
    limiter: Arc<RateLimiter>,
    classifier: Arc<dyn Classifier>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        cache: Arc<ResultCache>,
        limiter: Arc<RateLimiter>,
        classifier: Arc<dyn Classifier>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            cache,
            limiter,
            classifier,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Resolve every distinct URL in `urls`. The mapping is keyed by the URLs
    /// as given; its order is unspecified.
    pub async fn resolve_batch(&self, urls: &[String]) -> Resolution {
        let mut resolution = Resolution::default();
        for url in urls {
            if resolution.outcomes.contains_key(url) {
                continue;
            }
            let outcome = self.resolve_url(url, &mut resolution.events).await;
            resolution.outcomes.insert(url.clone(), outcome);
        }
        resolution
    }

    /// Resolve a single URL. Cache, limiter and events all use its
    /// normalized form; a string that is not a web URL fails closed.
    pub async fn resolve_url(&self, raw: &str, events: &mut Vec<Event>) -> Outcome {
        let key = match normalize_url(raw) {
            Ok(key) => key,
            Err(e) => {
                warn!("{}", e);
                return Outcome::Failed(ClassificationResult::failure(e.to_string()));
            }
        };
        let url = key.as_str();

        // 1. Result cache
        if let Some(cached) = self.cache.lookup(url) {
            debug!("Using cached result for {}", url);
            return Outcome::Cached(cached);
        }

        // 2. Rate limiting
        if !self.limiter.try_admit(url) {
            let after = self.config.retry_delay();
            warn!("Rate limited {}, retrying in {:?}", url, after);
            events.push(Event::RetryScheduled {
                url: url.to_string(),
                after,
            });
            return Outcome::RateLimited(ClassificationResult::rate_limited());
        }

        // 3. Remote call
        let result = self.classifier.classify(url).await;
        if !result.is_success() {
            // Errors are never cached; the next natural trigger retries
            return Outcome::Failed(result);
        }

        self.cache.store(url, result.clone());

        if result.is_high_risk(self.config.high_risk_threshold) {
            events.push(Event::HighRisk {
                url: url.to_string(),
                confidence: result.phishing_confidence,
            });
        }

        info!(
            "{} -> {}",
            url,
            if result.is_phishing { "phishing" } else { "legitimate" }
        );
        Outcome::Classified(result)
    }
}
