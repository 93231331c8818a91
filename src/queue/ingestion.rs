use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::helpers::load_config::QueueConfig;
use crate::metrics::metrics::{
    QUEUE_BACKPRESSURE_ACTIVE, QUEUE_DEPTH, QUEUE_DROPPED_TOTAL, QUEUE_PROCESSING_LATENCY_MS,
    QUEUE_RETRIES_TOTAL,
};
use crate::model::{LogEntry, Priority};

use super::priority::PriorityStructure;
use super::stats::{ProcessingTimeSample, QueueStats};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// `BatchProcessor(batch) -> Result<(), String>` (spec §4.2). A plain `Arc<dyn Fn>`
/// returning a boxed future, the manual async-closure idiom used where a crate
/// doesn't pull in `async-trait` for a single callback type.
pub type BatchProcessor =
    Arc<dyn Fn(Vec<LogEntry>) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// `SetErrorHandler(fn(entry, err))` (spec §4.2), invoked once per entry that
/// exhausts its retries.
pub type ErrorHandler = Arc<dyn Fn(LogEntry, String) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted,
    RejectedBackpressure,
    RejectedFull,
    InvalidEntry,
}

struct Inner {
    heap: PriorityStructure,
    backpressure_active: bool,
    completed: Vec<LogEntry>,
    processing_time: ProcessingTimeSample,
    completed_count: u64,
    failed_count: u64,
    dropped_count: u64,
    retry_count: u64,
    priority_distribution: HashMap<Priority, u64>,
    completed_last_window: u64,
}

impl Inner {
    fn new() -> Self {
        Self {
            heap: PriorityStructure::new(),
            backpressure_active: false,
            completed: Vec::new(),
            processing_time: ProcessingTimeSample::default(),
            completed_count: 0,
            failed_count: 0,
            dropped_count: 0,
            retry_count: 0,
            priority_distribution: HashMap::new(),
            completed_last_window: 0,
        }
    }
}

/// The Priority Ingestion Queue (spec §4.2). Owns the `LogEntry.Status`
/// state-machine graph: no code outside this module mutates `status`.
pub struct IngestionQueue {
    config: QueueConfig,
    inner: Mutex<Inner>,
    batch_semaphore: Arc<Semaphore>,
    current_concurrent_batches: AtomicUsize,
    current_batch_size: AtomicUsize,
    processor: Mutex<Option<BatchProcessor>>,
    error_handler: Mutex<Option<ErrorHandler>>,
    cancel: CancellationToken,
    stats: Mutex<QueueStats>,
}

impl std::fmt::Debug for IngestionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionQueue")
            .field("config", &self.config)
            .finish()
    }
}

impl IngestionQueue {
    pub fn new(config: QueueConfig) -> Arc<Self> {
        let max_concurrent = config.max_concurrent_batches;
        let batch_size = config.batch_size;
        Arc::new(Self {
            config,
            inner: Mutex::new(Inner::new()),
            batch_semaphore: Arc::new(Semaphore::new(max_concurrent)),
            current_concurrent_batches: AtomicUsize::new(max_concurrent),
            current_batch_size: AtomicUsize::new(batch_size),
            processor: Mutex::new(None),
            error_handler: Mutex::new(None),
            cancel: CancellationToken::new(),
            stats: Mutex::new(QueueStats::default()),
        })
    }

    /// Current effective batch size, which the Controller may have adjusted
    /// within `[min_batch_size, max_batch_size]` (spec §4.2.7).
    pub fn current_batch_size(&self) -> usize {
        self.current_batch_size.load(Ordering::Relaxed)
    }

    /// Halve the batch size, floor 1 (adaptive action: sustained CPU > 90%,
    /// spec §4.4 table).
    pub fn halve_batch_size(&self) {
        let prev = self.current_batch_size.load(Ordering::Relaxed);
        let next = (prev / 2).max(self.config.min_batch_size.max(1));
        self.current_batch_size.store(next, Ordering::Relaxed);
        tracing::info!(prev, next, "halved batch size (adaptive CPU response)");
    }

    /// Grow the batch size by 20%, capped at `max_batch_size` (adaptive
    /// action: sustained healthy throughput, spec §4.4 table).
    pub fn grow_batch_size(&self) {
        let prev = self.current_batch_size.load(Ordering::Relaxed);
        let grown = ((prev as f64) * 1.2).ceil() as usize;
        let next = grown.min(self.config.max_batch_size).max(prev);
        self.current_batch_size.store(next, Ordering::Relaxed);
        tracing::info!(prev, next, "grew batch size (adaptive throughput response)");
    }

    /// Increase `MaxConcurrentBatches` by 1, capped at 10 (spec §4.4 table).
    pub fn increase_max_concurrent_batches(&self) {
        let prev = self.current_concurrent_batches.load(Ordering::Relaxed);
        if prev >= 10 {
            return;
        }
        self.current_concurrent_batches.store(prev + 1, Ordering::Relaxed);
        self.batch_semaphore.add_permits(1);
        tracing::info!(prev, next = prev + 1, "increased MaxConcurrentBatches (adaptive latency response)");
    }

    pub async fn set_batch_processor(&self, processor: BatchProcessor) {
        *self.processor.lock().await = Some(processor);
    }

    pub async fn set_error_handler(&self, handler: ErrorHandler) {
        *self.error_handler.lock().await = Some(handler);
    }

    /// `Enqueue(LogEntry)` (spec §4.2, §4.2.2). Never blocks more than the
    /// time to acquire the internal lock.
    #[instrument(name = "queue::enqueue", target = "queue::ingestion", skip_all, level = "debug")]
    pub async fn enqueue(&self, entry: LogEntry) -> EnqueueOutcome {
        if !entry.is_valid() {
            return EnqueueOutcome::InvalidEntry;
        }

        let mut inner = self.inner.lock().await;
        let current_len = inner.heap.len();

        if current_len >= self.config.max_queue_size {
            inner.dropped_count += 1;
            QUEUE_DROPPED_TOTAL.inc();
            return EnqueueOutcome::RejectedFull;
        }

        let threshold =
            (self.config.max_queue_size as f64 * self.config.backpressure_threshold) as usize;
        let now_over_threshold = current_len >= threshold;

        if now_over_threshold != inner.backpressure_active {
            inner.backpressure_active = now_over_threshold;
            QUEUE_BACKPRESSURE_ACTIVE.set(if now_over_threshold { 1 } else { 0 });
            tracing::info!(
                backpressure_active = now_over_threshold,
                queue_depth = current_len,
                "queue backpressure state changed"
            );
        }

        if now_over_threshold && !entry.priority.survives_backpressure() {
            inner.dropped_count += 1;
            QUEUE_DROPPED_TOTAL.inc();
            return EnqueueOutcome::RejectedBackpressure;
        }

        *inner.priority_distribution.entry(entry.priority).or_insert(0) += 1;
        inner.heap.push(entry);
        QUEUE_DEPTH.set(inner.heap.len() as i64);

        EnqueueOutcome::Accepted
    }

    /// Drives the batch-forming and dispatch loop until cancelled. Intended
    /// to be spawned once by `runtime::runtime` alongside the stats sampler.
    #[instrument(name = "queue::run", target = "queue::ingestion", skip_all, level = "debug")]
    pub async fn run(self: Arc<Self>) {
        let batch_timeout = Duration::from_millis(self.config.batch_timeout_ms);
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let batch = self.form_batch(batch_timeout).await;
            if batch.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(25)) => {}
                    _ = self.cancel.cancelled() => break,
                }
                continue;
            }

            let permit = match self.batch_semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let queue = Arc::clone(&self);
            tokio::spawn(async move {
                queue.dispatch_batch(batch).await;
                drop(permit);
            });
        }
    }

    /// A batch forms once `BatchSize` entries are ready or `BatchTimeout`
    /// has elapsed since the first entry was placed into it, whichever
    /// comes first (spec §4.2.3). The deadline only starts once the first
    /// entry is collected; an idle queue does not spin-poll forever.
    async fn form_batch(&self, batch_timeout: Duration) -> Vec<LogEntry> {
        let mut batch = Vec::new();
        let mut deadline: Option<Instant> = None;
        let batch_size = self.current_batch_size();

        loop {
            {
                let mut inner = self.inner.lock().await;
                while batch.len() < batch_size {
                    match inner.heap.pop() {
                        Some(mut entry) => {
                            entry.mark_processing_started();
                            if deadline.is_none() {
                                deadline = Some(Instant::now() + batch_timeout);
                            }
                            batch.push(entry);
                        }
                        None => break,
                    }
                }
                QUEUE_DEPTH.set(inner.heap.len() as i64);
            }

            if batch.len() >= batch_size {
                break;
            }
            match deadline {
                Some(d) if Instant::now() >= d => break,
                Some(_) => tokio::time::sleep(Duration::from_millis(10)).await,
                None => break, // nothing collected yet; let the caller back off
            }
        }

        batch
    }

    #[instrument(name = "queue::dispatch_batch", target = "queue::ingestion", skip_all, level = "debug", fields(batch_len = batch.len()))]
    async fn dispatch_batch(&self, batch: Vec<LogEntry>) {
        let processor = self.processor.lock().await.clone();
        let Some(processor) = processor else {
            tracing::warn!("batch formed with no processor set; entries dropped");
            return;
        };

        let started = Instant::now();
        let result = processor(batch.clone()).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        QUEUE_PROCESSING_LATENCY_MS.observe(elapsed_ms);

        match result {
            Ok(()) => self.complete_batch(batch, elapsed_ms).await,
            Err(err) => self.fail_batch(batch, err).await,
        }
    }

    async fn complete_batch(&self, mut batch: Vec<LogEntry>, elapsed_ms: f64) {
        let mut inner = self.inner.lock().await;
        for entry in batch.iter_mut() {
            entry.mark_processing_completed();
        }
        inner.processing_time.record(elapsed_ms);
        inner.completed_count += batch.len() as u64;
        inner.completed_last_window += batch.len() as u64;
        inner.completed.extend(batch);
    }

    async fn fail_batch(&self, mut batch: Vec<LogEntry>, error: String) {
        let handler = self.error_handler.lock().await.clone();
        let mut retriable = Vec::new();

        {
            let mut inner = self.inner.lock().await;
            for entry in batch.iter_mut() {
                entry.mark_processing_failed(error.clone());
                inner.failed_count += 1;

                if entry.can_retry() {
                    entry.mark_for_retry();
                    inner.retry_count += 1;
                    QUEUE_RETRIES_TOTAL.inc();
                    retriable.push(entry.clone());
                } else if let Some(handler) = &handler {
                    handler(entry.clone(), error.clone());
                }
            }
            for entry in retriable {
                inner.heap.push(entry);
            }
            QUEUE_DEPTH.set(inner.heap.len() as i64);
        }
    }

    /// `PurgeCompleted(olderThan)` (spec §4.2.6).
    #[instrument(name = "queue::purge_completed", target = "queue::ingestion", skip_all, level = "debug")]
    pub async fn purge_completed(&self, older_than: chrono::Duration) {
        let cutoff = Utc::now() - older_than;
        let mut inner = self.inner.lock().await;
        inner.completed.retain(|e| match e.processing_completed_at {
            Some(completed_at) => completed_at >= cutoff,
            None => true,
        });
    }

    /// `Stats()` (spec §4.2.5). Cheap read of the last sampled snapshot.
    pub async fn stats(&self) -> QueueStats {
        self.stats.lock().await.clone()
    }

    /// Periodic stats sampler; spawned alongside `run()` on `StatsInterval`.
    pub async fn run_stats_sampler(self: Arc<Self>) {
        let interval = Duration::from_millis(self.config.stats_interval_ms);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.cancel.cancelled() => break,
            }
            self.refresh_stats(interval.as_secs_f64()).await;
        }
    }

    async fn refresh_stats(&self, window_secs: f64) {
        let mut inner = self.inner.lock().await;
        let pending = inner.heap.len();
        let completed = inner.completed_count;
        let failed = inner.failed_count;
        let total_terminal = (completed + failed).max(1);

        let mut stats = self.stats.lock().await;
        stats.total = pending + completed as usize + failed as usize;
        stats.pending = pending;
        stats.processing = 0;
        stats.completed = completed;
        stats.failed = failed;
        stats.priority_distribution = inner.priority_distribution.clone();
        stats.avg_processing_time_ms = inner.processing_time.avg();
        stats.min_processing_time_ms = inner.processing_time.min();
        stats.max_processing_time_ms = inner.processing_time.max();
        stats.throughput_per_second = inner.completed_last_window as f64 / window_secs.max(1.0);
        stats.error_rate = failed as f64 / total_terminal as f64;
        stats.retry_count = inner.retry_count;
        stats.dropped_count = inner.dropped_count;
        stats.backpressure_active = inner.backpressure_active;
        stats.last_updated = Utc::now();

        inner.completed_last_window = 0;
    }

    /// Current queue depth, consulted by the Controller's health check and
    /// adaptive-batching logic (spec §4.2.7, §4.4).
    pub async fn depth(&self) -> usize {
        self.inner.lock().await.heap.len()
    }

    pub fn max_queue_size(&self) -> usize {
        self.config.max_queue_size
    }

    /// `Shutdown()`: stops accepting new batches and drains whatever is
    /// in-flight within the runtime's grace period (spec §5).
    #[instrument(name = "queue::shutdown", target = "queue::ingestion", skip_all, level = "debug")]
    pub async fn shutdown(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::load_config::QueueConfig;
    use crate::model::{LogEntry, Priority};

    fn test_config() -> QueueConfig {
        QueueConfig {
            max_queue_size: 10,
            batch_size: 4,
            min_batch_size: 1,
            max_batch_size: 10,
            batch_timeout_ms: 50,
            max_concurrent_batches: 2,
            backpressure_threshold: 0.8,
            stats_interval_ms: 1000,
        }
    }

    fn entry(priority: Priority) -> LogEntry {
        LogEntry::new("line".into(), "/var/log/a.log".into(), "s1".into(), Utc::now(), priority, 0)
    }

    #[tokio::test]
    async fn invalid_entry_is_rejected() {
        let queue = IngestionQueue::new(test_config());
        let mut e = entry(Priority::Medium);
        e.content.clear();
        assert_eq!(queue.enqueue(e).await, EnqueueOutcome::InvalidEntry);
    }

    #[tokio::test]
    async fn rejects_full_at_hard_ceiling() {
        let queue = IngestionQueue::new(test_config());
        for _ in 0..10 {
            assert_eq!(queue.enqueue(entry(Priority::Bulk)).await, EnqueueOutcome::Accepted);
        }
        assert_eq!(queue.enqueue(entry(Priority::Bulk)).await, EnqueueOutcome::RejectedFull);
    }

    #[tokio::test]
    async fn backpressure_rejects_low_priority_only() {
        let queue = IngestionQueue::new(test_config());
        // threshold = 10 * 0.8 = 8
        for _ in 0..8 {
            queue.enqueue(entry(Priority::Bulk)).await;
        }
        assert_eq!(queue.enqueue(entry(Priority::Low)).await, EnqueueOutcome::RejectedBackpressure);
        assert_eq!(queue.enqueue(entry(Priority::High)).await, EnqueueOutcome::Accepted);
    }
}
