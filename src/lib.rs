//! # phishguard
//!
//! Request orchestration in front of a remote phishing scoring service.
//!
//! - `domain::normalize` - canonical URL keys shared by cache, limiter and scheduler
//! - `infrastructure::storage::cache` - per-URL result cache with TTL
//! - `infrastructure::limiter` - per-URL sliding-window rate limiter
//! - `application::scheduler` - debounced, size-bounded batching of discovered URLs
//! - `infrastructure::network::client` - single remote call, failures folded into fail-closed results
//! - `application::orchestrator` - cache -> limiter -> client resolution with retry events
//! - `application::session` - one scheduler per page context driving the shared orchestrator
//!
//! Everything that renders results (terminal output, history listing) sits in
//! `presentation` and only consumes what the core returns.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod presentation;
pub mod state;

pub use application::orchestrator::{Event, Orchestrator, Resolution};
pub use application::scheduler::{BatchScheduler, SchedulerHandle};
pub use application::session::{BatchReport, ScanSession, SessionDeps};
pub use domain::error::PhishError;
pub use domain::normalize::normalize_url;
pub use domain::model::{ClassificationResult, Features, Outcome, ResultStatus};
pub use domain::traits::{Classifier, Clock, ManualClock, Notifier, TokioClock};
pub use infrastructure::config::Config;
pub use infrastructure::limiter::RateLimiter;
pub use infrastructure::network::client::HttpClassifier;
pub use infrastructure::storage::cache::ResultCache;
