//! Queue worker: claims pending items and drives the pipeline.
//!
//! Runs a bounded number of item tasks concurrently. Item failures are
//! isolated; one item's failure never aborts its siblings. Retry and
//! dead-letter accounting lives here, not in the claim query, so a
//! crashed worker leaves items claimable rather than half-counted.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use docflow_core::defaults;
use docflow_core::{EventBus, QueueItem, QueueRepository, Result, ServerEvent};

use crate::pipeline::ProcessingPipeline;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum item tasks in flight.
    pub concurrency: usize,
    /// Idle poll interval.
    pub poll_interval: Duration,
    /// Base retry backoff. Retry delay is `2^attempts x base`.
    pub backoff_base: chrono::Duration,
    /// Age past which terminal items are purged.
    pub cleanup_after: chrono::Duration,
    /// How often the cleanup pass runs.
    pub cleanup_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: defaults::WORKER_CONCURRENCY,
            poll_interval: Duration::from_millis(defaults::WORKER_POLL_INTERVAL_MS),
            backoff_base: chrono::Duration::seconds(defaults::QUEUE_BACKOFF_BASE_SECS as i64),
            cleanup_after: chrono::Duration::days(defaults::QUEUE_CLEANUP_DAYS as i64),
            cleanup_interval: Duration::from_secs(3600),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            concurrency: std::env::var("WORKER_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(base.concurrency),
            poll_interval: std::env::var("WORKER_POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(base.poll_interval),
            backoff_base: std::env::var("QUEUE_BACKOFF_BASE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(chrono::Duration::seconds)
                .unwrap_or(base.backoff_base),
            cleanup_after: std::env::var("QUEUE_CLEANUP_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(chrono::Duration::days)
                .unwrap_or(base.cleanup_after),
            cleanup_interval: base.cleanup_interval,
        }
    }
}

/// Shutdown signal for a running worker.
pub struct WorkerHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl WorkerHandle {
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Claims queue items and processes them through the pipeline.
pub struct QueueWorker {
    queue: Arc<dyn QueueRepository>,
    pipeline: Arc<ProcessingPipeline>,
    events: EventBus,
    config: WorkerConfig,
}

impl QueueWorker {
    pub fn new(
        queue: Arc<dyn QueueRepository>,
        pipeline: Arc<ProcessingPipeline>,
        events: EventBus,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            pipeline,
            events,
            config,
        }
    }

    /// Spawn the worker loop. Returns a handle for graceful shutdown.
    pub fn spawn(self: Arc<Self>) -> (WorkerHandle, tokio::task::JoinHandle<()>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move { self.run(shutdown_rx).await });
        (WorkerHandle { shutdown_tx }, join)
    }

    /// Worker loop: claim up to the free capacity, process concurrently,
    /// wait for at least one task before the next claim round.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            subsystem = "pipeline",
            component = "queue_worker",
            concurrency = self.config.concurrency,
            "Queue worker started"
        );

        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut cleanup_tick = tokio::time::interval(self.config.cleanup_interval);
        cleanup_tick.tick().await; // first tick fires immediately

        loop {
            if *shutdown.borrow() {
                break;
            }

            let capacity = self.config.concurrency.saturating_sub(tasks.len());
            let claimed = if capacity > 0 {
                match self.queue.claim_batch(capacity).await {
                    Ok(items) => items,
                    Err(e) => {
                        error!(
                            subsystem = "pipeline",
                            component = "queue_worker",
                            error = %e,
                            "Claim failed"
                        );
                        Vec::new()
                    }
                }
            } else {
                Vec::new()
            };

            for item in claimed {
                let queue = self.queue.clone();
                let pipeline = self.pipeline.clone();
                let events = self.events.clone();
                let backoff_base = self.config.backoff_base;
                tasks.spawn(async move {
                    process_item(queue, pipeline, events, backoff_base, item).await;
                });
            }

            if tasks.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                    _ = cleanup_tick.tick() => self.cleanup_once().await,
                    _ = shutdown.changed() => {}
                }
            } else {
                tokio::select! {
                    _ = tasks.join_next() => {}
                    _ = cleanup_tick.tick() => self.cleanup_once().await,
                    _ = shutdown.changed() => {}
                }
            }
        }

        // Drain in-flight items before exiting.
        info!(
            subsystem = "pipeline",
            component = "queue_worker",
            in_flight = tasks.len(),
            "Queue worker draining"
        );
        while tasks.join_next().await.is_some() {}
        info!(
            subsystem = "pipeline",
            component = "queue_worker",
            "Queue worker stopped"
        );
    }

    /// Purge terminal items past the retention window.
    pub async fn cleanup_once(&self) {
        let cutoff = Utc::now() - self.config.cleanup_after;
        match self.queue.cleanup(cutoff).await {
            Ok(removed) if removed > 0 => info!(
                subsystem = "pipeline",
                component = "queue_worker",
                removed,
                "Purged old queue items"
            ),
            Ok(_) => {}
            Err(e) => warn!(
                subsystem = "pipeline",
                component = "queue_worker",
                error = %e,
                "Queue cleanup failed"
            ),
        }
    }

    /// Process one claimed item. Public for direct-drive tests.
    pub async fn process_claimed(&self, item: QueueItem) {
        process_item(
            self.queue.clone(),
            self.pipeline.clone(),
            self.events.clone(),
            self.config.backoff_base,
            item,
        )
        .await;
    }
}

async fn process_item(
    queue: Arc<dyn QueueRepository>,
    pipeline: Arc<ProcessingPipeline>,
    events: EventBus,
    backoff_base: chrono::Duration,
    item: QueueItem,
) {
    info!(
        subsystem = "pipeline",
        component = "queue_worker",
        item_id = %item.id,
        document_id = %item.document_id,
        attempt = item.attempts + 1,
        "Processing queue item"
    );

    let outcome = pipeline.process_document(item.document_id).await;

    let result: Result<()> = match outcome {
        Ok(_) => queue.complete(item.id).await.map(|_| {
            events.emit(ServerEvent::QueueItemCompleted {
                item_id: item.id,
                document_id: item.document_id,
            });
        }),
        Err(error) => {
            let next = item.attempts + 1;
            if next >= item.max_attempts {
                warn!(
                    subsystem = "pipeline",
                    component = "queue_worker",
                    item_id = %item.id,
                    document_id = %item.document_id,
                    attempts = next,
                    error = %error,
                    "Dead-lettering queue item"
                );
                queue.mark_failed(item.id, &error.to_string()).await.map(|_| {
                    events.emit(ServerEvent::QueueItemDeadLettered {
                        item_id: item.id,
                        document_id: item.document_id,
                        error: error.to_string(),
                    });
                })
            } else {
                // delay = 2^attempts x base: 5 min, 10 min, ...
                let delay = backoff_base * 2i32.pow(item.attempts.max(0) as u32);
                warn!(
                    subsystem = "pipeline",
                    component = "queue_worker",
                    item_id = %item.id,
                    document_id = %item.document_id,
                    attempts = next,
                    delay_secs = delay.num_seconds(),
                    error = %error,
                    "Rescheduling queue item"
                );
                queue
                    .retry_later(item.id, &error.to_string(), delay)
                    .await
                    .map(|_| {
                        events.emit(ServerEvent::QueueItemRetried {
                            item_id: item.id,
                            document_id: item.document_id,
                            attempts: next,
                            delay_secs: delay.num_seconds(),
                        });
                    })
            }
        }
    };

    if let Err(e) = result {
        error!(
            subsystem = "pipeline",
            component = "queue_worker",
            item_id = %item.id,
            error = %e,
            "Failed to record item outcome"
        );
    }
}
