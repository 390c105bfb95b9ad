//! Debounced batching of discovered URLs.
//!
//! Producers hand URLs to a [`SchedulerHandle`]. The scheduler task
//! normalizes them (anything that is not an absolute web URL is dropped),
//! buffers them, waits for a quiet period of `batch_delay` (bounded by `max_wait`
//! from the first arrival), then releases at most `max_batch_size` URLs in
//! FIFO order. Consecutive dispatches are at least `cooldown` apart; a flush
//! that lands inside the cooldown is postponed, never dropped.

use crate::domain::error::PhishError;
use crate::domain::normalize::normalize_url;
use crate::infrastructure::config::SchedulerConfig;
use crate::infrastructure::storage::cache::ResultCache;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

pub type Batch = Vec<String>;

#[derive(Debug)]
enum Command {
    Submit(Vec<String>),
    Requeue(Vec<String>),
}

/// Producer side of a running scheduler. Cheap to clone.
#[derive(Clone, Debug)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SchedulerHandle {
    /// Offer URLs for checking. Idempotent: duplicates are dropped inside.
    pub fn submit<I, S>(&self, urls: I) -> Result<(), PhishError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let urls: Vec<String> = urls.into_iter().map(Into::into).collect();
        if urls.is_empty() {
            return Ok(());
        }
        self.tx
            .send(Command::Submit(urls))
            .map_err(|_| PhishError::SchedulerClosed)
    }

    /// Clear the dispatched marker of `urls` and queue them again.
    pub fn requeue(&self, urls: Vec<String>) -> Result<(), PhishError> {
        self.tx
            .send(Command::Requeue(urls))
            .map_err(|_| PhishError::SchedulerClosed)
    }

    pub fn downgrade(&self) -> WeakSchedulerHandle {
        WeakSchedulerHandle {
            tx: self.tx.downgrade(),
        }
    }
}

/// Handle that does not keep the scheduler alive.
#[derive(Clone, Debug)]
pub struct WeakSchedulerHandle {
    tx: mpsc::WeakUnboundedSender<Command>,
}

impl WeakSchedulerHandle {
    pub fn upgrade(&self) -> Option<SchedulerHandle> {
        self.tx.upgrade().map(|tx| SchedulerHandle { tx })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// `since` is when the current collection cycle started; `deadline` is
    /// the armed timer.
    Collecting { since: Instant, deadline: Instant },
}

pub struct BatchScheduler {
    config: SchedulerConfig,
    cache: Option<Arc<ResultCache>>,
    pending: VecDeque<String>,
    queued: HashSet<String>,
    dispatched: HashSet<String>,
    phase: Phase,
    last_dispatch: Option<Instant>,
}

impl BatchScheduler {
    pub fn new(config: SchedulerConfig, cache: Option<Arc<ResultCache>>) -> Self {
        Self {
            config,
            cache,
            pending: VecDeque::new(),
            queued: HashSet::new(),
            dispatched: HashSet::new(),
            phase: Phase::Idle,
            last_dispatch: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Idle => None,
            Phase::Collecting { deadline, .. } => Some(deadline),
        }
    }

    fn admit(&mut self, raw: String) -> bool {
        let url = match normalize_url(&raw) {
            Ok(url) => url,
            Err(e) => {
                debug!("Skipping {}", e);
                return false;
            }
        };
        if self.queued.contains(&url) || self.dispatched.contains(&url) {
            return false;
        }
        if self.cache.as_ref().is_some_and(|c| c.contains(&url)) {
            debug!("Skipping {}: cached", url);
            return false;
        }
        self.queued.insert(url.clone());
        self.pending.push_back(url);
        true
    }

    /// Queue new URLs and (re)arm the debounce timer if any were accepted.
    pub fn submit(&mut self, urls: Vec<String>, now: Instant) -> usize {
        let mut accepted = 0;
        for url in urls {
            if self.admit(url) {
                accepted += 1;
            }
        }
        if accepted > 0 {
            self.on_arrival(now);
            debug!("Queued {} URL(s), {} pending", accepted, self.pending.len());
        }
        accepted
    }

    pub fn requeue(&mut self, urls: Vec<String>, now: Instant) -> usize {
        for url in &urls {
            if let Ok(url) = normalize_url(url) {
                self.dispatched.remove(&url);
            }
        }
        self.submit(urls, now)
    }

    fn on_arrival(&mut self, now: Instant) {
        let quiet = now + self.config.batch_delay();
        self.phase = match self.phase {
            Phase::Idle => Phase::Collecting {
                since: now,
                deadline: quiet.min(now + self.config.max_wait()),
            },
            Phase::Collecting { since, .. } => Phase::Collecting {
                since,
                deadline: quiet.min(since + self.config.max_wait()),
            },
        };
    }

    /// Timer fired. Returns the batch to dispatch, if one is due.
    pub fn on_timer(&mut self, now: Instant) -> Option<Batch> {
        let Phase::Collecting { since, .. } = self.phase else {
            return None;
        };

        if self.pending.is_empty() {
            self.phase = Phase::Idle;
            return None;
        }

        if let Some(last) = self.last_dispatch {
            let ready_at = last + self.config.cooldown();
            if now < ready_at {
                debug!("Dispatch inside cooldown, delaying");
                self.phase = Phase::Collecting {
                    since,
                    deadline: ready_at,
                };
                return None;
            }
        }

        let take = self.config.max_batch_size.min(self.pending.len());
        let batch: Batch = self.pending.drain(..take).collect();
        for url in &batch {
            self.queued.remove(url);
            self.dispatched.insert(url.clone());
        }
        self.last_dispatch = Some(now);

        self.phase = if self.pending.is_empty() {
            Phase::Idle
        } else {
            Phase::Collecting {
                since: now,
                deadline: now + self.config.batch_delay(),
            }
        };

        info!(
            "Dispatching batch of {} ({} still pending)",
            batch.len(),
            self.pending.len()
        );
        Some(batch)
    }

    /// Run the scheduler on its own task; batches come out of `batches`.
    ///
    /// The task ends when every strong [`SchedulerHandle`] is dropped or the
    /// batch receiver goes away.
    pub fn spawn(self, batches: mpsc::UnboundedSender<Batch>) -> (SchedulerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx, batches));
        (SchedulerHandle { tx }, task)
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        batches: mpsc::UnboundedSender<Batch>,
    ) {
        loop {
            let deadline = self.deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Submit(urls)) => {
                        self.submit(urls, Instant::now());
                    }
                    Some(Command::Requeue(urls)) => {
                        self.requeue(urls, Instant::now());
                    }
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(batch) = self.on_timer(Instant::now()) {
                        if batches.send(batch).is_err() {
                            break;
                        }
                    }
                }
            }
        }
        debug!("Scheduler stopped with {} pending", self.pending.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::ClassificationResult;
    use crate::domain::traits::TokioClock;
    use std::time::Duration;
    use tokio::time::sleep;

    fn config() -> SchedulerConfig {
        SchedulerConfig::default()
    }

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("http://u{}.test/", i)).collect()
    }

    #[test]
    fn test_first_arrival_starts_collecting() {
        tokio_test_time(|now| {
            let mut s = BatchScheduler::new(config(), None);
            assert_eq!(s.phase(), Phase::Idle);
            s.submit(urls(1), now);
            assert_eq!(
                s.phase(),
                Phase::Collecting {
                    since: now,
                    deadline: now + Duration::from_secs(3)
                }
            );
        });
    }

    #[test]
    fn test_duplicate_submit_queues_once() {
        tokio_test_time(|now| {
            let mut s = BatchScheduler::new(config(), None);
            assert_eq!(s.submit(vec!["http://a.test/".into()], now), 1);
            assert_eq!(
                s.submit(vec!["http://a.test/".into(), "http://a.test/".into()], now),
                0
            );
            assert_eq!(s.pending(), 1);

            let batch = s.on_timer(now + Duration::from_secs(3)).unwrap();
            assert_eq!(batch, vec!["http://a.test/".to_string()]);
            // Dispatched URLs are not accepted again
            assert_eq!(s.submit(vec!["http://a.test/".into()], now), 0);
        });
    }

    #[test]
    fn test_cached_urls_are_dropped_at_admission() {
        tokio_test_time(|now| {
            let cache = Arc::new(ResultCache::new(
                Duration::from_secs(300),
                Arc::new(TokioClock),
            ));
            cache.store("http://cached.test/", ClassificationResult::failure("x"));
            let mut s = BatchScheduler::new(config(), Some(cache));
            assert_eq!(
                s.submit(vec!["http://cached.test".into(), "http://fresh.test".into()], now),
                1
            );
        });
    }

    #[test]
    fn test_spellings_of_one_url_queue_once() {
        tokio_test_time(|now| {
            let mut s = BatchScheduler::new(config(), None);
            let accepted = s.submit(
                vec![
                    "http://b.test".into(),
                    "http://b.test/".into(),
                    "HTTP://B.TEST/".into(),
                    "http://B.test:80/".into(),
                ],
                now,
            );
            assert_eq!(accepted, 1);

            let batch = s.on_timer(now + Duration::from_secs(3)).unwrap();
            assert_eq!(batch, vec!["http://b.test/".to_string()]);
        });
    }

    #[test]
    fn test_non_web_urls_never_enter_the_queue() {
        tokio_test_time(|now| {
            let mut s = BatchScheduler::new(config(), None);
            let accepted = s.submit(
                vec!["not a url".into(), "javascript:alert(1)".into(), "".into()],
                now,
            );
            assert_eq!(accepted, 0);
            assert_eq!(s.pending(), 0);
            assert_eq!(s.phase(), Phase::Idle);
        });
    }

    #[test]
    fn test_batch_never_exceeds_max_size() {
        tokio_test_time(|now| {
            let mut s = BatchScheduler::new(config(), None);
            s.submit(urls(10), now);
            let mut t = now;
            let mut seen = 0;
            while let Some(deadline) = s.deadline() {
                t = t.max(deadline);
                if let Some(batch) = s.on_timer(t) {
                    assert!(batch.len() <= 3);
                    seen += batch.len();
                }
            }
            assert_eq!(seen, 10);
            assert_eq!(s.phase(), Phase::Idle);
        });
    }

    #[test]
    fn test_timer_inside_cooldown_is_postponed() {
        tokio_test_time(|now| {
            let mut cfg = config();
            cfg.batch_delay_ms = 500;
            cfg.max_batch_size = 1;
            let mut s = BatchScheduler::new(cfg, None);
            s.submit(urls(2), now);

            let first = now + Duration::from_millis(500);
            assert!(s.on_timer(first).is_some());
            // Re-armed half a second later, still inside the 2s cooldown
            let rearmed = s.deadline().unwrap();
            assert!(s.on_timer(rearmed).is_none());
            assert_eq!(s.deadline(), Some(first + Duration::from_secs(2)));
            assert!(s.on_timer(first + Duration::from_secs(2)).is_some());
        });
    }

    // Runs a synchronous body with a paused tokio clock so Instant math is stable.
    fn tokio_test_time(body: impl FnOnce(Instant)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        rt.block_on(async { body(Instant::now()) });
    }

    fn assert_elapsed(start: Instant, secs: u64) {
        let elapsed = start.elapsed();
        let expected = Duration::from_secs(secs);
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(50),
            "expected ~{}s, got {:?}",
            secs,
            elapsed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_five_urls_split_into_three_then_two() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (handle, _task) = BatchScheduler::new(config(), None).spawn(tx);
        let start = Instant::now();

        handle.submit(urls(5)).unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first, urls(5)[..3].to_vec());
        assert_elapsed(start, 3);

        let second = rx.recv().await.unwrap();
        assert_eq!(second, urls(5)[3..].to_vec());
        assert_elapsed(start, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_stream_defers_dispatch() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (handle, _task) = BatchScheduler::new(config(), None).spawn(tx);
        let start = Instant::now();

        for url in urls(4) {
            handle.submit([url]).unwrap();
            sleep(Duration::from_secs(2)).await;
            assert!(rx.try_recv().is_err());
        }

        // Last arrival at t=6s, quiet period ends at t=9s
        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_elapsed(start, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_wait_caps_debounce() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut cfg = config();
        cfg.max_wait_ms = 5000;
        let (handle, _task) = BatchScheduler::new(cfg, None).spawn(tx);
        let start = Instant::now();

        let producer = tokio::spawn(async move {
            for url in urls(20) {
                if handle.submit([url]).is_err() {
                    break;
                }
                sleep(Duration::from_secs(1)).await;
            }
            handle
        });

        let batch = rx.recv().await.unwrap();
        assert_elapsed(start, 5);
        assert_eq!(batch, urls(3));
        drop(producer.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_requeue_dispatches_again() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (handle, _task) = BatchScheduler::new(config(), None).spawn(tx);

        handle.submit(["http://b.test"]).unwrap();
        let batch = rx.recv().await.unwrap();
        assert_eq!(batch, vec!["http://b.test/".to_string()]);

        handle.submit(batch.clone()).unwrap();
        handle.requeue(batch.clone()).unwrap();
        let again = rx.recv().await.unwrap();
        assert_eq!(again, batch);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_task() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (handle, task) = BatchScheduler::new(config(), None).spawn(tx);
        let weak = handle.downgrade();
        drop(handle);
        task.await.unwrap();
        assert!(weak.upgrade().is_none());
    }
}
