//! Wires the four core components together in dependency order (spec §5):
//! Ingestion Queue and Fan-out Bus first (nothing depends on their
//! constructors failing), then the Tailing Engine sources, then the
//! Controller, which holds references into all three but is depended on by
//! none. Shutdown runs in the opposite order. Grounded on the teacher's
//! `runtime::run_log_collector` (`services/log-collector/src/runtime/runtime.rs`):
//! same `Shutdown` broadcast, same "spawn each subsystem, collect join
//! handles, await them after the shutdown signal" shape.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde_json::Value;
use tokio::signal;
use tokio::task::JoinHandle;
use tonic::transport::Server;
use tracing::instrument;

use crate::analyzer::AnalysisResult;
use crate::controller::Controller;
use crate::fanout::grpc::FanoutGrpcService;
use crate::fanout::FanoutBus;
use crate::helpers::load_config::{Config, PersistenceBackend};
use crate::helpers::shutdown::Shutdown;
use crate::metrics::http::start_metrics_server;
use crate::model::{EventUpdate, LogEntry};
use crate::persistence::checkpoint::{CheckpointRecord, CheckpointStore};
use crate::persistence::json_store::JsonFileStore;
use crate::persistence::sqlite_store::SqliteStore;
use crate::proto::fanout::fanout_server::FanoutServer;
use crate::queue::ingestion::{EnqueueOutcome, IngestionQueue};
use crate::tailing::{ConsumerOutcome, TailingEngine};

/// Core runtime initialization and setup.
#[instrument(name = "threatlens_runtime::run", target = "runtime::runtime", skip_all, level = "trace")]
pub async fn run(config_path: PathBuf) -> Result<()> {
    tracing::info!("starting ThreatLens runtime");
    let startup_start = Instant::now();

    let cfg = Config::load(&config_path)?;
    tracing::info!(path = %config_path.display(), "configuration loaded");

    let shutdown = Shutdown::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        signal::ctrl_c().await.ok();
        tracing::info!("CTRL+C received, broadcasting shutdown to runtime components");
        shutdown_signal.trigger();
    });

    let checkpoint_store: Arc<dyn CheckpointStore> = match &cfg.persistence.backend {
        PersistenceBackend::Json { path } => Arc::new(JsonFileStore::new(path)),
        PersistenceBackend::Sqlite { path } => Arc::new(SqliteStore::new(path)?),
    };
    let checkpoints = checkpoint_store.load_all().await?;
    tracing::info!(restored = checkpoints.len(), "checkpoints loaded");

    let queue = IngestionQueue::new(cfg.queue.clone());
    let bus = FanoutBus::new(
        cfg.fanout.max_subscribers,
        cfg.fanout.per_subscriber_queue,
        cfg.fanout.slow_subscriber_threshold,
        Duration::from_millis(cfg.fanout.ping_interval_ms),
        Duration::from_millis(cfg.fanout.pong_timeout_ms),
    );
    let tailing = TailingEngine::new(
        Duration::from_millis(cfg.tailing.max_partial_line_hold_ms),
        cfg.tailing.default_polling_interval_ms,
    );

    let controller = Controller::new(
        cfg.controller.clone(),
        queue.clone(),
        bus.clone(),
        tailing.clone(),
        cfg.fanout.max_subscribers,
    );

    wire_queue(&queue, &bus).await;
    tailing.set_consumer(tailing_consumer(queue.clone())).await;

    for mut source in cfg.tailing.sources.clone() {
        if !source.enabled {
            continue;
        }
        if let Some(record) = checkpoints.get(&source.name) {
            source.runtime.last_offset = record.last_offset;
            source.runtime.known_size = record.known_size;
        }
        if let Err(err) = tailing.add_source(source.clone()).await {
            tracing::error!(source = %source.name, error = %err, "failed to start tailing source");
        }
    }

    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    handles.push(spawn_metrics_server(&cfg.general.metrics_addr, controller.clone(), &shutdown));
    handles.push(spawn_grpc_server(&cfg.fanout.grpc_addr, bus.clone(), &shutdown));
    handles.push(spawn_queue(queue.clone(), &shutdown));
    handles.push(spawn_bus_liveness(bus.clone(), &shutdown));
    handles.push(spawn_controller(controller.clone(), &shutdown));
    handles.push(spawn_directory_rediscovery(tailing.clone(), &shutdown));
    handles.push(spawn_checkpoint_loop(
        tailing.clone(),
        checkpoint_store.clone(),
        Duration::from_millis(cfg.persistence.checkpoint_interval_ms),
        &shutdown,
    ));

    let startup_duration = startup_start.elapsed();
    tracing::info!(elapsed_ms = startup_duration.as_millis(), "startup complete");

    shutdown.wait_for_shutdown().await;
    tracing::info!("shutdown triggered, draining runtime components");

    for handle in handles {
        let _ = handle.await;
    }

    tailing.shutdown().await;
    queue.shutdown().await;
    controller.shutdown();
    flush_checkpoints(&tailing, checkpoint_store.as_ref()).await;

    tracing::info!("runtime shutdown complete");
    Ok(())
}

/// Bridges the Tailing Engine's per-entry callback into the queue's
/// `Enqueue` call, translating backpressure into the tailing engine's own
/// backoff signal (spec §4.1 <-> §4.2 seam).
fn tailing_consumer(queue: Arc<IngestionQueue>) -> crate::tailing::Consumer {
    Arc::new(move |entry: LogEntry| {
        let queue = queue.clone();
        Box::pin(async move {
            match queue.enqueue(entry).await {
                EnqueueOutcome::Accepted => ConsumerOutcome::Accepted,
                EnqueueOutcome::RejectedBackpressure | EnqueueOutcome::RejectedFull => {
                    ConsumerOutcome::Backpressure
                }
                EnqueueOutcome::InvalidEntry => ConsumerOutcome::Accepted,
            }
        })
    })
}

/// Installs the default batch processor and error handler (spec §4.2's
/// `SetBatchProcessor`/`SetErrorHandler` hooks). Analysis content proper is
/// out of scope (spec §1); this passthrough turns each entry into a minimal
/// `AnalysisResult` so the fan-out bus has something to broadcast end to
/// end. A binary embedding this crate with a real `Analyzer` replaces this
/// wiring with its own `set_batch_processor` call.
async fn wire_queue(queue: &Arc<IngestionQueue>, bus: &Arc<FanoutBus>) {
    let bus_for_processor = bus.clone();
    queue
        .set_batch_processor(Arc::new(move |batch: Vec<LogEntry>| {
            let bus = bus_for_processor.clone();
            Box::pin(async move {
                for entry in &batch {
                    let result = passthrough_analyze(entry);
                    let event = EventUpdate::new(
                        result.event_type,
                        priority_to_event_scale(entry),
                        result.payload,
                    );
                    bus.broadcast(event, Some(&entry.source_name)).await;
                }
                Ok(())
            })
        }))
        .await;

    queue
        .set_error_handler(Arc::new(|entry, err| {
            tracing::error!(entry_id = %entry.entry_id, source = %entry.source_name, error = %err, "entry exhausted retries");
        }))
        .await;
}

fn passthrough_analyze(entry: &LogEntry) -> AnalysisResult {
    AnalysisResult::new(
        entry,
        "log_entry",
        Value::String(entry.content.clone()),
    )
}

fn priority_to_event_scale(entry: &LogEntry) -> u8 {
    match entry.priority {
        crate::model::Priority::Critical => 10,
        crate::model::Priority::High => 8,
        crate::model::Priority::Medium => 5,
        crate::model::Priority::Low => 3,
        crate::model::Priority::Bulk => 1,
    }
}

fn spawn_metrics_server(addr: &str, controller: Arc<Controller>, shutdown: &Shutdown) -> JoinHandle<()> {
    let addr = addr.to_string();
    let mut shutdown_rx = shutdown.subscribe();
    tokio::spawn(async move {
        tokio::select! {
            res = start_metrics_server(&addr, controller) => {
                if let Err(err) = res {
                    tracing::error!(error = %err, "metrics server exited with error");
                }
            }
            _ = shutdown_rx.recv() => {
                tracing::debug!("metrics server shutting down");
            }
        }
    })
}

fn spawn_grpc_server(addr: &str, bus: Arc<FanoutBus>, shutdown: &Shutdown) -> JoinHandle<()> {
    let addr = addr.to_string();
    let mut shutdown_rx = shutdown.subscribe();
    tokio::spawn(async move {
        let socket_addr = match addr.parse() {
            Ok(addr) => addr,
            Err(err) => {
                tracing::error!(error = %err, %addr, "invalid gRPC listen address");
                return;
            }
        };
        let service = FanoutGrpcService::new(bus);
        tracing::info!(%socket_addr, "fan-out gRPC server listening");
        if let Err(err) = Server::builder()
            .add_service(FanoutServer::new(service))
            .serve_with_shutdown(socket_addr, async move {
                shutdown_rx.recv().await.ok();
                tracing::debug!("fan-out gRPC server shutting down");
            })
            .await
        {
            tracing::error!(error = %err, "fan-out gRPC server error");
        }
    })
}

fn spawn_queue(queue: Arc<IngestionQueue>, shutdown: &Shutdown) -> JoinHandle<()> {
    let mut shutdown_rx = shutdown.subscribe();
    let run_queue = queue.clone();
    let stats_queue = queue;
    tokio::spawn(async move {
        tokio::spawn(stats_queue.run_stats_sampler());
        tokio::select! {
            _ = run_queue.run() => {}
            _ = shutdown_rx.recv() => {
                tracing::debug!("ingestion queue main loop shutting down");
            }
        }
    })
}

fn spawn_bus_liveness(bus: Arc<FanoutBus>, shutdown: &Shutdown) -> JoinHandle<()> {
    let cancel = tokio_util::sync::CancellationToken::new();
    let mut shutdown_rx = shutdown.subscribe();
    let cancel_for_wait = cancel.clone();
    tokio::spawn(async move {
        shutdown_rx.recv().await.ok();
        cancel_for_wait.cancel();
    });
    tokio::spawn(bus.run_liveness(cancel))
}

fn spawn_controller(controller: Arc<Controller>, shutdown: &Shutdown) -> JoinHandle<()> {
    let mut shutdown_rx = shutdown.subscribe();
    tokio::spawn(async move {
        tokio::select! {
            _ = controller.run() => {}
            _ = shutdown_rx.recv() => {
                tracing::debug!("controller shutting down");
            }
        }
    })
}

fn spawn_directory_rediscovery(tailing: Arc<TailingEngine>, shutdown: &Shutdown) -> JoinHandle<()> {
    let mut shutdown_rx = shutdown.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(5)) => {
                    tailing.rediscover_directories().await;
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    })
}

fn spawn_checkpoint_loop(
    tailing: Arc<TailingEngine>,
    store: Arc<dyn CheckpointStore>,
    interval: Duration,
    shutdown: &Shutdown,
) -> JoinHandle<()> {
    let mut shutdown_rx = shutdown.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    flush_checkpoints(&tailing, store.as_ref()).await;
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    })
}

async fn flush_checkpoints(tailing: &TailingEngine, store: &dyn CheckpointStore) {
    let status = tailing.status().await;
    let mut records = HashMap::with_capacity(status.per_source.len());
    for source in status.per_source {
        records.insert(
            source.name.clone(),
            CheckpointRecord {
                source_name: source.name,
                last_offset: source.last_offset,
                known_size: source.known_size,
                status: source.status,
                last_error: source.last_error,
            },
        );
    }
    if let Err(err) = store.save_all(records).await {
        tracing::error!(error = %err, "failed to persist checkpoints");
    }
}
