//! One scan session per page context.
//!
//! A session owns a [`BatchScheduler`] and a driver task. The driver pushes
//! every dispatched batch through the shared [`Orchestrator`], carries out
//! the requested side effects and hands results to the consumer. Reports are
//! delivered on an unbounded channel so a slow consumer never stalls the core.

use crate::application::orchestrator::{Event, Orchestrator, Resolution};
use crate::application::scheduler::{Batch, BatchScheduler, SchedulerHandle, WeakSchedulerHandle};
use crate::domain::error::PhishError;
use crate::domain::model::{ClassificationResult, DetectionRecord, Outcome};
use crate::domain::traits::Notifier;
use crate::infrastructure::config::SchedulerConfig;
use crate::infrastructure::storage::history;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rusqlite::Connection;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

/// Results of one dispatched batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub results: HashMap<String, ClassificationResult>,
    /// URLs that were rate limited and will come back in a later report.
    pub retrying: Vec<String>,
}

/// Collaborators shared by every session of a process.
#[derive(Clone)]
pub struct SessionDeps {
    pub orchestrator: Arc<Orchestrator>,
    pub notifier: Arc<dyn Notifier>,
    pub history: Option<Arc<Connection>>,
}

pub struct ScanSession {
    id: Uuid,
    handle: SchedulerHandle,
    reports: mpsc::UnboundedReceiver<BatchReport>,
    scheduler_task: JoinHandle<()>,
    driver_task: JoinHandle<()>,
}

impl ScanSession {
    pub fn spawn(deps: SessionDeps, config: SchedulerConfig) -> Self {
        let id = Uuid::new_v4();
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        let (report_tx, reports) = mpsc::unbounded_channel();

        let scheduler = BatchScheduler::new(config, Some(deps.orchestrator.cache().clone()));
        let (handle, scheduler_task) = scheduler.spawn(batch_tx);

        let span = tracing::info_span!("session", %id);
        let driver_task = tokio::spawn(
            drive(deps, batch_rx, handle.downgrade(), report_tx).instrument(span),
        );

        debug!("Started scan session {}", id);
        Self {
            id,
            handle,
            reports,
            scheduler_task,
            driver_task,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn submit<I, S>(&self, urls: I) -> Result<(), PhishError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.handle.submit(urls)
    }

    /// Extra producer handle for the same session.
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    pub async fn next_report(&mut self) -> Option<BatchReport> {
        self.reports.recv().await
    }

    /// Stop accepting URLs and wait for the tasks to wind down.
    ///
    /// Batches still queued are dropped. A batch already being resolved is
    /// finished and its verdicts cached, but no notification, history record
    /// or retry is issued for it.
    pub async fn close(self) {
        let Self {
            handle,
            scheduler_task,
            driver_task,
            ..
        } = self;
        drop(handle);
        let _ = scheduler_task.await;
        let _ = driver_task.await;
    }
}

async fn drive(
    deps: SessionDeps,
    mut batches: mpsc::UnboundedReceiver<Batch>,
    scheduler: WeakSchedulerHandle,
    reports: mpsc::UnboundedSender<BatchReport>,
) {
    while let Some(batch) = batches.recv().await {
        let resolution = deps.orchestrator.resolve_batch(&batch).await;

        // Fresh verdicts are already cached; nobody is left to warn or retry for
        if reports.is_closed() || scheduler.upgrade().is_none() {
            debug!(
                "Session closed while resolving, dropping side effects of {} URL(s)",
                resolution.outcomes.len()
            );
            continue;
        }

        let retry = apply_side_effects(&deps, &resolution).await;
        schedule_retries(&scheduler, retry);

        let report = BatchReport {
            retrying: resolution.retry_urls(),
            results: resolution.into_results(),
        };
        if reports.send(report).is_err() {
            debug!("Report consumer gone, dropping results");
        }
    }
}

/// Record fresh verdicts in history and fire high-risk notifications.
///
/// Returns the rate-limited URLs with their retry delay; requeueing them is
/// up to the caller.
pub async fn apply_side_effects(
    deps: &SessionDeps,
    resolution: &Resolution,
) -> Vec<(String, Duration)> {
    if let Some(db) = &deps.history {
        for (url, outcome) in &resolution.outcomes {
            if let Outcome::Classified(result) = outcome {
                let record = DetectionRecord::from_result(url, result);
                if let Err(e) = history::append(db, &record).await {
                    warn!("Failed to record detection for {}: {}", url, e);
                }
            }
        }
    }

    let mut retry = Vec::new();
    for event in &resolution.events {
        match event {
            Event::HighRisk { url, confidence } => {
                deps.notifier.notify_high_risk(url, *confidence);
            }
            Event::RetryScheduled { url, after } => retry.push((url.clone(), *after)),
        }
    }
    retry
}

fn schedule_retries(scheduler: &WeakSchedulerHandle, retry: Vec<(String, Duration)>) {
    for (url, after) in retry {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // The session may have ended while we slept
            match scheduler.upgrade() {
                Some(handle) => {
                    if handle.requeue(vec![url.clone()]).is_err() {
                        debug!("Session closed before retry of {}", url);
                    }
                }
                None => debug!("Session closed before retry of {}", url),
            }
        });
    }
}
