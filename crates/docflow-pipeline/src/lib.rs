//! # docflow-pipeline
//!
//! Document processing orchestration for docflow.
//!
//! This crate provides:
//! - A four-strategy field detection chain with typed outcomes
//! - A per-document stage machine with single-flight admission
//! - A priority queue worker with exponential backoff and dead-lettering
//! - Centralized error classification and recovery with an audit trail
//! - Sentence-aware chunking and rate-limited batch embedding
//! - Webhook delivery driven by the server event bus
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use docflow_pipeline::{
//!     DetectionChain, EmbeddingGenerator, ErrorRecoveryService, ProcessingPipeline,
//!     QueueWorker, WorkerConfig,
//! };
//! use docflow_core::EventBus;
//! use docflow_db::{
//!     Database, PgChunkRepository, PgDocumentRepository, PgFieldRepository, PgQueueRepository,
//! };
//!
//! let db = Database::connect("postgres://...").await?;
//! let events = EventBus::default();
//!
//! let pipeline = Arc::new(ProcessingPipeline::new(
//!     Arc::new(PgDocumentRepository::new(db.pool.clone())),
//!     Arc::new(PgFieldRepository::new(db.pool.clone())),
//!     Arc::new(PgChunkRepository::new(db.pool.clone())),
//!     store,
//!     chain,
//!     embedder,
//!     recovery,
//!     events.clone(),
//! ));
//!
//! let worker = Arc::new(QueueWorker::new(
//!     Arc::new(PgQueueRepository::new(db.pool.clone())),
//!     pipeline,
//!     events,
//!     WorkerConfig::from_env(),
//! ));
//! let (handle, join) = worker.spawn();
//! ```

pub mod chunker;
pub mod embedder;
pub mod outbox;
pub mod pipeline;
pub mod recovery;
pub mod strategies;
pub mod validation;
pub mod worker;

// Re-export core types
pub use docflow_core::*;

pub use chunker::{Chunker, ChunkerConfig};
pub use embedder::{EmbedFailurePolicy, EmbedderConfig, EmbeddingGenerator};
pub use outbox::{OutboxConfig, OutboxHandle, WebhookOutbox};
pub use pipeline::{
    FlightGuard, PipelineConfig, ProcessingPipeline, ProcessingReport, ProcessingStage,
    SingleFlight,
};
pub use recovery::{
    ErrorClassifier, ErrorRecoveryService, ErrorType, HeuristicClassifier, RecoveryConfig,
    RecoveryDecision, RecoveryStrategy,
};
pub use strategies::{
    docai::DocAiStrategy, native::NativeFormStrategy, pattern::PatternStrategy,
    synthetic::SyntheticStrategy, ChainResult, DetectionChain, DetectionOutcome, DetectionRequest,
    DetectionStrategy,
};
pub use validation::{FieldValidator, ValidationWarning};
pub use worker::{QueueWorker, WorkerConfig, WorkerHandle};
