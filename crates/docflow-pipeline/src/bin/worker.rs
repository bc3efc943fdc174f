//! docflow-worker - queue processing daemon for docflow
//!
//! Claims queued documents, runs them through the detection and indexing
//! pipeline, and delivers webhooks for lifecycle events. Shuts down
//! gracefully on Ctrl-C, draining in-flight work first.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docflow_core::{defaults, EventBus};
use docflow_db::{
    Database, FilesystemStore, PgChunkRepository, PgDocumentRepository, PgErrorLogRepository,
    PgFieldRepository, PgQueueRepository, PgWebhookRepository,
};
use docflow_inference::docai::{DocAiClient, DocAiConfig, DEFAULT_PROCESSOR_TYPE};
use docflow_inference::{OpenAIBackend, ProcessorPool, ProcessorPoolConfig};
use docflow_pipeline::strategies::docai::DocAiStrategy;
use docflow_pipeline::strategies::native::NativeFormStrategy;
use docflow_pipeline::strategies::pattern::PatternStrategy;
use docflow_pipeline::strategies::synthetic::SyntheticStrategy;
use docflow_pipeline::strategies::{DetectionChain, DetectionStrategy};
use docflow_pipeline::{
    EmbedderConfig, EmbeddingGenerator, ErrorRecoveryService, ProcessingPipeline, QueueWorker,
    WebhookOutbox, WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   RUST_LOG    - standard env filter (default: "docflow_pipeline=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "docflow_pipeline=debug,docflow_db=info,docflow_inference=info".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("docflow-worker.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false),
                )
                .init();
        }
        Some(guard)
    } else if log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
        None
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    // Database
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/docflow".to_string());
    let db = Database::connect(&database_url).await?;
    info!("Database connected");

    // Blob storage
    let storage_path =
        std::env::var("STORAGE_PATH").unwrap_or_else(|_| "./data/blobs".to_string());
    let signing_key = std::env::var("STORAGE_SIGNING_KEY")
        .unwrap_or_else(|_| "docflow-dev-signing-key".to_string());
    let public_base =
        std::env::var("STORAGE_PUBLIC_BASE").unwrap_or_else(|_| "/files".to_string());
    let store = Arc::new(FilesystemStore::new(storage_path, signing_key, public_base));

    // Event bus shared by the pipeline, worker, and webhook outbox
    let events = EventBus::default();

    // Document-AI client pool with periodic sweep
    let docai_config = DocAiConfig::from_env();
    let pool = Arc::new(ProcessorPool::new(
        ProcessorPoolConfig::from_env(),
        move |_processor_type| DocAiClient::new(docai_config.clone()),
    ));
    let sweeper_pool = pool.clone();
    tokio::spawn(async move {
        let mut tick =
            tokio::time::interval(Duration::from_secs(defaults::POOL_SWEEP_INTERVAL_SECS));
        loop {
            tick.tick().await;
            sweeper_pool.sweep();
        }
    });

    // Detection chain: document-AI, native form structure, text patterns,
    // synthetic fallback, in priority order.
    let processor_type = std::env::var("DOCAI_PROCESSOR_TYPE")
        .unwrap_or_else(|_| DEFAULT_PROCESSOR_TYPE.to_string());
    let strategies: Vec<Arc<dyn DetectionStrategy>> = vec![
        Arc::new(DocAiStrategy::new(pool.clone(), processor_type)),
        Arc::new(NativeFormStrategy::new()),
        Arc::new(PatternStrategy::new()),
        Arc::new(SyntheticStrategy::new()),
    ];
    let chain = Arc::new(DetectionChain::new(strategies));

    // Embedding backend
    let backend = Arc::new(OpenAIBackend::from_env()?);
    let embedder =
        Arc::new(EmbeddingGenerator::new(backend).with_config(EmbedderConfig::from_env()));

    // Error recovery with a database-backed audit trail
    let recovery = Arc::new(ErrorRecoveryService::new(Arc::new(PgErrorLogRepository::new(
        db.pool.clone(),
    ))));

    let pipeline = Arc::new(ProcessingPipeline::new(
        Arc::new(PgDocumentRepository::new(db.pool.clone())),
        Arc::new(PgFieldRepository::new(db.pool.clone())),
        Arc::new(PgChunkRepository::new(db.pool.clone())),
        store,
        chain,
        embedder,
        recovery,
        events.clone(),
    ));

    // Webhook outbox
    let outbox = Arc::new(WebhookOutbox::new(Arc::new(PgWebhookRepository::new(
        db.pool.clone(),
    )))?);
    let (outbox_handle, outbox_join) = outbox.spawn(&events);

    // Queue worker
    let worker = Arc::new(QueueWorker::new(
        Arc::new(PgQueueRepository::new(db.pool.clone())),
        pipeline,
        events,
        WorkerConfig::from_env(),
    ));
    let (handle, worker_join) = worker.spawn();
    info!("Worker started");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, draining");

    // Drain the worker first so its final events still reach the outbox,
    // then let the outbox finish any delivery already underway.
    handle.shutdown();
    worker_join.await?;
    outbox_handle.shutdown();
    outbox_join.await?;
    pool.shutdown().await;

    info!("Worker stopped");
    Ok(())
}
