//! End-to-end orchestration scenarios

use async_trait::async_trait;
use phishguard::infrastructure::config::{Config, ServiceConfig};
use phishguard::infrastructure::storage::history;
use phishguard::state::AppState;
use phishguard::{
    ClassificationResult, Classifier, Notifier, Outcome, ResultStatus, TokioClock,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Scripted {
    calls: AtomicUsize,
    result: ClassificationResult,
    latency: Duration,
}

impl Scripted {
    fn new(result: ClassificationResult) -> Arc<Self> {
        Self::slow(result, Duration::ZERO)
    }

    fn slow(result: ClassificationResult, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            result,
            latency,
        })
    }
}

#[async_trait]
impl Classifier for Scripted {
    async fn classify(&self, _url: &str) -> ClassificationResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
        self.result.clone()
    }
}

#[derive(Default)]
struct Recorder {
    alerts: Mutex<Vec<(String, f64)>>,
}

impl Notifier for Recorder {
    fn notify_high_risk(&self, url: &str, confidence: f64) {
        self.alerts.lock().unwrap().push((url.to_string(), confidence));
    }
}

fn verdict(is_phishing: bool, phishing: f64) -> ClassificationResult {
    ClassificationResult {
        status: ResultStatus::Success,
        is_phishing,
        phishing_confidence: phishing,
        legitimate_confidence: 1.0 - phishing,
        features: Default::default(),
        message: None,
    }
}

fn config_for(endpoint: &str) -> Config {
    Config {
        service: ServiceConfig {
            endpoint: endpoint.to_string(),
            ..ServiceConfig::default()
        },
        ..Config::default()
    }
}

fn state_with(
    classifier: Arc<dyn Classifier>,
    notifier: Arc<dyn Notifier>,
    history: Option<tokio_rusqlite::Connection>,
) -> AppState {
    AppState::with_classifier(
        Config::default(),
        classifier,
        notifier,
        history,
        Arc::new(TokioClock),
    )
    .unwrap()
}

fn urls(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("http://site{}.test/", i)).collect()
}

fn keys<V>(map: &std::collections::HashMap<String, V>) -> HashSet<String> {
    map.keys().cloned().collect()
}

// Scenario A: second lookup within the TTL is served from cache
#[tokio::test]
async fn test_scenario_a_result_is_cached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/check-url"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "isPhishing": false,
            "phishingConfidence": 0.1,
            "legitimateConfidence": 0.9,
            "features": {
                "suspicious_url_score": 0.0,
                "domain_age_days": 365,
                "has_ssl": true,
                "redirect_count": 0,
                "similarity_flag": false
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let state = AppState::new(
        config_for(&server.uri()),
        Arc::new(Recorder::default()),
        None,
    )
    .unwrap();

    let url = vec!["http://a.test".to_string()];
    let first = state.orchestrator.resolve_batch(&url).await;
    let second = state.orchestrator.resolve_batch(&url).await;

    assert!(matches!(first.outcomes[&url[0]], Outcome::Classified(_)));
    assert!(matches!(second.outcomes[&url[0]], Outcome::Cached(_)));
    assert_eq!(first.results(), second.results());
    assert_eq!(state.cache.len(), 1);
    // MockServer verifies the single remote call on drop
}

// Scenario B: the 11th check in a window is rejected and comes back ~10s later
#[tokio::test(start_paused = true)]
async fn test_scenario_b_rate_limited_url_is_retried() {
    let classifier = Scripted::new(verdict(false, 0.1));
    let state = state_with(classifier.clone(), Arc::new(Recorder::default()), None);
    let url = "http://b.test/";

    for _ in 0..10 {
        assert!(state.limiter.try_admit(url));
    }

    let start = Instant::now();
    let mut session = state.new_session().await;
    // Another spelling of the same URL shares its window
    session.submit(["HTTP://B.test:80"]).unwrap();

    let first = session.next_report().await.unwrap();
    assert_eq!(first.retrying, vec![url.to_string()]);
    let limited = &first.results[url];
    assert_eq!(limited.status, ResultStatus::Error);
    assert!(limited.is_phishing);
    assert_eq!(start.elapsed().as_secs(), 3);

    // Requeued after the 10s backoff, then one more quiet period
    let second = session.next_report().await.unwrap();
    assert_eq!(second.retrying, vec![url.to_string()]);
    assert_eq!(start.elapsed().as_secs(), 16);

    // Keeps retrying until the window frees up
    let resolved = loop {
        let report = session.next_report().await.unwrap();
        if report.retrying.is_empty() {
            break report;
        }
    };
    assert!(start.elapsed() >= Duration::from_secs(60));
    assert!(resolved.results[url].is_success());
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);

    session.close().await;
}

// Scenario C: a failed remote call is fail-closed and never cached
#[tokio::test]
async fn test_scenario_c_failure_is_not_cached() {
    let state = state_with(
        Scripted::new(ClassificationResult::failure("operation timed out")),
        Arc::new(Recorder::default()),
        None,
    );
    let url = vec!["http://c.test/".to_string()];

    let resolution = state.orchestrator.resolve_batch(&url).await;
    let result = resolution.outcomes[&url[0]].result();
    assert_eq!(result.status, ResultStatus::Error);
    assert!(result.is_phishing);
    assert_eq!(result.message.as_deref(), Some("operation timed out"));
    assert!(state.cache.lookup(&url[0]).is_none());
    assert!(state.cache.is_empty());
}

// Scenario D: five URLs at once are split 3 + 2, earliest first
#[tokio::test(start_paused = true)]
async fn test_scenario_d_batches_are_bounded() {
    let classifier = Scripted::new(verdict(false, 0.2));
    let state = state_with(classifier.clone(), Arc::new(Recorder::default()), None);
    let all = urls(5);

    let start = Instant::now();
    let mut session = state.new_session().await;
    session.submit(all.clone()).unwrap();

    let first = session.next_report().await.unwrap();
    assert_eq!(keys(&first.results), all[..3].iter().cloned().collect());
    assert_eq!(start.elapsed().as_secs(), 3);

    let second = session.next_report().await.unwrap();
    assert_eq!(keys(&second.results), all[3..].iter().cloned().collect());
    assert_eq!(start.elapsed().as_secs(), 6);

    assert_eq!(classifier.calls.load(Ordering::SeqCst), 5);
    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_cached_urls_are_not_dispatched_again() {
    let classifier = Scripted::new(verdict(false, 0.2));
    let state = state_with(classifier.clone(), Arc::new(Recorder::default()), None);

    let mut session = state.new_session().await;
    session.submit(["http://seen.test"]).unwrap();
    session.next_report().await.unwrap();

    // A second page context sees the same link, spelled differently
    let mut other = state.new_session().await;
    other
        .submit(["http://SEEN.test/", "http://new.test/"])
        .unwrap();
    let report = other.next_report().await.unwrap();
    assert_eq!(
        keys(&report.results),
        HashSet::from(["http://new.test/".to_string()])
    );
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 2);

    session.close().await;
    other.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_high_risk_notification_and_history() {
    let recorder = Arc::new(Recorder::default());
    let db = history::init_memory_history().await.unwrap();
    let state = state_with(
        Scripted::new(verdict(true, 0.96)),
        recorder.clone(),
        Some(db),
    );

    let mut session = state.new_session().await;
    session.submit(["http://evil.test/"]).unwrap();
    let report = session.next_report().await.unwrap();

    // The advisory signal does not alter the returned verdict
    assert_eq!(report.results["http://evil.test/"], verdict(true, 0.96));
    assert_eq!(
        *recorder.alerts.lock().unwrap(),
        vec![("http://evil.test/".to_string(), 0.96)]
    );

    let db = state.history.as_ref().unwrap();
    assert_eq!(history::count(db).await.unwrap(), 1);
    let records = history::recent(db, 10).await.unwrap();
    assert_eq!(records[0].url, "http://evil.test/");
    assert!(records[0].is_phishing);

    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_closed_session_drops_late_high_risk_alert() {
    let recorder = Arc::new(Recorder::default());
    let classifier = Scripted::slow(verdict(true, 0.97), Duration::from_secs(5));
    let state = state_with(classifier.clone(), recorder.clone(), None);

    let session = state.new_session().await;
    session.submit(["http://evil.test/"]).unwrap();

    // Dispatched at 3s, the remote call is still running at 3.5s
    sleep(Duration::from_millis(3500)).await;
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    session.close().await;

    assert!(recorder.alerts.lock().unwrap().is_empty());
    // The verdict itself is still cached for later checks
    assert_eq!(
        state.cache.lookup("http://evil.test/"),
        Some(verdict(true, 0.97))
    );
}

#[tokio::test]
async fn test_failures_are_not_written_to_history() {
    let db = history::init_memory_history().await.unwrap();
    let state = state_with(
        Scripted::new(ClassificationResult::failure("boom")),
        Arc::new(Recorder::default()),
        Some(db),
    );

    let resolution = state
        .orchestrator
        .resolve_batch(&["http://x.test/".to_string()])
        .await;
    let retry = phishguard::application::session::apply_side_effects(&state.deps(), &resolution)
        .await;
    assert!(retry.is_empty());
    assert_eq!(
        history::count(state.history.as_ref().unwrap()).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_feedback_invalidates_cached_verdict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/feedback"))
        .and(body_json(json!({ "url": "http://a.test/", "feedback": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "Feedback saved"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let state = AppState::with_classifier(
        config_for(&server.uri()),
        Scripted::new(verdict(false, 0.1)),
        Arc::new(Recorder::default()),
        None,
        Arc::new(TokioClock),
    )
    .unwrap();

    state
        .orchestrator
        .resolve_batch(&["http://a.test".to_string()])
        .await;
    assert!(state.cache.lookup("http://a.test/").is_some());

    state.feedback("HTTP://A.TEST", true).await.unwrap();
    assert!(state.cache.lookup("http://a.test/").is_none());
}
