use crate::application::orchestrator::Orchestrator;
use crate::application::session::{ScanSession, SessionDeps};
use crate::domain::error::PhishError;
use crate::domain::normalize::normalize_url;
use crate::domain::traits::{Classifier, Clock, Notifier, TokioClock};
use crate::infrastructure::config::Config;
use crate::infrastructure::limiter::RateLimiter;
use crate::infrastructure::network::client::HttpClassifier;
use crate::infrastructure::storage::cache::ResultCache;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_rusqlite::Connection;

/// The coordinator: owns the process-wide cache, limiter and client.
/// Page contexts get their own [`ScanSession`] on top of it.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<Config>>,
    pub cache: Arc<ResultCache>,
    pub limiter: Arc<RateLimiter>,
    pub client: Arc<HttpClassifier>,
    pub orchestrator: Arc<Orchestrator>,
    pub notifier: Arc<dyn Notifier>,
    pub history: Option<Arc<Connection>>,
}

impl AppState {
    pub fn new(
        config: Config,
        notifier: Arc<dyn Notifier>,
        history: Option<Connection>,
    ) -> Result<Self, PhishError> {
        let client = Arc::new(HttpClassifier::from_config(&config.service)?);
        Ok(Self::assemble(
            config,
            client.clone(),
            client,
            notifier,
            history,
            Arc::new(TokioClock),
        ))
    }

    /// Assemble the state around any classifier, e.g. a scripted one in tests.
    ///
    /// Reports and feedback still go to the service configured in
    /// `config.service`.
    pub fn with_classifier(
        config: Config,
        classifier: Arc<dyn Classifier>,
        notifier: Arc<dyn Notifier>,
        history: Option<Connection>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PhishError> {
        let client = Arc::new(HttpClassifier::from_config(&config.service)?);
        Ok(Self::assemble(
            config, client, classifier, notifier, history, clock,
        ))
    }

    fn assemble(
        config: Config,
        client: Arc<HttpClassifier>,
        classifier: Arc<dyn Classifier>,
        notifier: Arc<dyn Notifier>,
        history: Option<Connection>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = Arc::new(ResultCache::new(config.cache.ttl(), clock.clone()));
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit.window(),
            config.rate_limit.max_requests,
            clock,
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            cache.clone(),
            limiter.clone(),
            classifier,
            config.orchestrator.clone(),
        ));

        Self {
            config: Arc::new(RwLock::new(config)),
            cache,
            limiter,
            client,
            orchestrator,
            notifier,
            history: history.map(Arc::new),
        }
    }

    pub fn deps(&self) -> SessionDeps {
        SessionDeps {
            orchestrator: self.orchestrator.clone(),
            notifier: self.notifier.clone(),
            history: self.history.clone(),
        }
    }

    pub async fn new_session(&self) -> ScanSession {
        let scheduler = self.config.read().await.scheduler.clone();
        ScanSession::spawn(self.deps(), scheduler)
    }

    /// Send a user verdict override and forget the cached result for `url`.
    pub async fn feedback(&self, url: &str, is_phishing: bool) -> Result<(), PhishError> {
        let url = normalize_url(url)?;
        self.client.send_feedback(&url, is_phishing).await?;
        self.cache.invalidate(&url);
        Ok(())
    }
}
