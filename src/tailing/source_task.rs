use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::reader::TailReader;
use crate::model::{LogEntry, LogSource, Priority, SourceStatus};

pub type BoxFuture<T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send>>;

/// Result returned by the consumer callback for one `LogEntry` (spec §4.1
/// step 5: "if consumer returns a backpressure signal, pause reading this
/// source for a bounded backoff").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerOutcome {
    Accepted,
    Backpressure,
}

pub type Consumer = Arc<dyn Fn(LogEntry) -> BoxFuture<ConsumerOutcome> + Send + Sync>;

/// Everything one spawned tailer task needs, shared with the engine so
/// `ListSources`/`Status` can read a live snapshot without touching the
/// task's internals (spec §5 shared-resource policy: single-writer per
/// source, readers take a copy).
pub struct SourceHandle {
    pub source: Arc<Mutex<LogSource>>,
    pub cancel: CancellationToken,
    pub wake: Arc<Notify>,
    pub join: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceHandle").finish_non_exhaustive()
    }
}

/// Spawns the per-source tailer task: file-watch + poll floor + the byte
/// offset read algorithm, handing complete lines to `consumer`.
#[instrument(
    name = "threatlens_spawn_tailer",
    target = "tailing::source_task",
    skip(consumer, max_partial_line_hold),
    level = "debug"
)]
pub fn spawn(
    source: LogSource,
    initial_offset: u64,
    max_partial_line_hold: Duration,
    default_polling_interval_ms: u64,
    consumer: Consumer,
) -> SourceHandle {
    let cancel = CancellationToken::new();
    let wake = Arc::new(Notify::new());
    let shared = Arc::new(Mutex::new(source));

    let task_source = shared.clone();
    let task_cancel = cancel.clone();
    let task_wake = wake.clone();

    let join = tokio::spawn(async move {
        run(
            task_source,
            task_cancel,
            task_wake,
            initial_offset,
            max_partial_line_hold,
            default_polling_interval_ms,
            consumer,
        )
        .await;
    });

    SourceHandle {
        source: shared,
        cancel,
        wake,
        join,
    }
}

async fn run(
    source: Arc<Mutex<LogSource>>,
    cancel: CancellationToken,
    wake: Arc<Notify>,
    initial_offset: u64,
    max_partial_line_hold: Duration,
    default_polling_interval_ms: u64,
    consumer: Consumer,
) {
    let (path, polling_interval, priority, source_name): (PathBuf, Duration, Priority, String) = {
        let s = source.lock().await;
        (s.path.clone(), s.polling_interval(default_polling_interval_ms), s.priority, s.name.clone())
    };

    // Best-effort file watch. A missing-at-startup file (legal per spec
    // §4.1 "path may not yet exist") just means the watch fails silently
    // and the periodic poll becomes the sole change-detection mechanism
    // until the file appears.
    let _watcher = watch_path(&path, wake.clone());

    let mut reader = TailReader::new(initial_offset, max_partial_line_hold);
    let mut backoff = polling_interval;
    let backoff_cap = polling_interval * 10;
    let mut io_error_backoff = Duration::from_secs(1);
    const IO_ERROR_BACKOFF_CAP: Duration = Duration::from_secs(60);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = wake.notified() => {}
            _ = tokio::time::sleep(polling_interval) => {}
        }

        match reader.poll(&path).await {
            Ok(outcome) => {
                io_error_backoff = Duration::from_secs(1);

                if outcome.rotated {
                    tracing::debug!(source = %source_name, "rotation detected, offset reset");
                }

                let mut saw_backpressure = false;
                for line in outcome.lines {
                    let offset_end = line.offset_end;
                    let entry = LogEntry::new(
                        line.content,
                        path.display().to_string(),
                        source_name.clone(),
                        chrono::Utc::now(),
                        priority,
                        offset_end,
                    );
                    match deliver(&consumer, entry).await {
                        ConsumerOutcome::Accepted => reader.ack(offset_end),
                        ConsumerOutcome::Backpressure => {
                            saw_backpressure = true;
                            break;
                        }
                    }
                }

                // Only force out the stale partial if the backlog above
                // drained cleanly; otherwise the consumer is already
                // signalling backpressure and this source should pause
                // reading rather than hand it more (spec §4.1 step 5).
                if !saw_backpressure {
                    if let Some(stale) = reader.take_stale_partial() {
                        let offset_end = stale.offset_end;
                        let entry = LogEntry::new(
                            stale.content,
                            path.display().to_string(),
                            source_name.clone(),
                            chrono::Utc::now(),
                            priority,
                            offset_end,
                        );
                        match deliver(&consumer, entry).await {
                            ConsumerOutcome::Accepted => reader.ack(offset_end),
                            ConsumerOutcome::Backpressure => saw_backpressure = true,
                        }
                    }
                }

                mark_active(&source, &reader).await;

                if saw_backpressure {
                    tracing::debug!(source = %source_name, backoff_ms = %backoff.as_millis(), "backpressure signalled, backing off");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(backoff_cap);
                } else {
                    backoff = polling_interval;
                }
            }
            Err(err) => {
                mark_error(&source, &err.to_string()).await;
                tracing::error!(source = %source_name, error = %err, "tailer I/O error");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(io_error_backoff) => {}
                }
                io_error_backoff = (io_error_backoff * 2).min(IO_ERROR_BACKOFF_CAP);
            }
        }
    }
}

/// Invokes the consumer with panic isolation (spec §7: "a crash in one
/// callback must not take down its component").
async fn deliver(consumer: &Consumer, entry: LogEntry) -> ConsumerOutcome {
    match AssertUnwindSafe(consumer(entry)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::error!("consumer callback panicked, treating as backpressure");
            ConsumerOutcome::Backpressure
        }
    }
}

async fn mark_active(source: &Arc<Mutex<LogSource>>, reader: &TailReader) {
    let mut s = source.lock().await;
    s.runtime.status = SourceStatus::Active;
    s.runtime.last_monitored_at = Some(chrono::Utc::now());
    s.runtime.known_size = reader.known_size();
    s.runtime.last_offset = reader.offset();
    s.runtime.last_error = None;
}

async fn mark_error(source: &Arc<Mutex<LogSource>>, error: &str) {
    let mut s = source.lock().await;
    s.runtime.status = SourceStatus::Error;
    s.runtime.last_monitored_at = Some(chrono::Utc::now());
    s.runtime.last_error = Some(error.to_string());
}

/// Registers a `notify` watch on `path`, triggering `wake` on any event.
/// The watcher is edge-triggered and coalesced with the poll floor in
/// `run`; its own errors are logged, never fatal (spec §4.1).
fn watch_path(path: &std::path::Path, wake: Arc<Notify>) -> Option<RecommendedWatcher> {
    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if res.is_ok() {
                wake.notify_one();
            }
        },
        notify::Config::default(),
    ) {
        Ok(w) => w,
        Err(err) => {
            tracing::debug!(error = %err, "failed to construct notify watcher");
            return None;
        }
    };

    let watch_target = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(path);
    match watcher.watch(watch_target, RecursiveMode::NonRecursive) {
        Ok(()) => Some(watcher),
        Err(err) => {
            tracing::debug!(error = %err, path = %path.display(), "failed to watch path");
            None
        }
    }
}
