//! Structured logging schema and field name constants for docflow.
//!
//! All crates use these constants for consistent structured logging fields
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data (chunks, tokens) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "pipeline", "queue", "db", "inference", "chat", "outbox"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "strategy_chain", "processor_pool", "worker", "embedder"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "process_document", "claim_batch", "embed_texts", "ask"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Document UUID being operated on.
pub const DOCUMENT_ID: &str = "document_id";

/// Queue item UUID being processed.
pub const ITEM_ID: &str = "item_id";

/// Chat session UUID.
pub const SESSION_ID: &str = "session_id";

/// Webhook UUID.
pub const WEBHOOK_ID: &str = "webhook_id";

/// Detection strategy name.
pub const STRATEGY: &str = "strategy";

/// Pipeline stage name.
pub const STAGE: &str = "stage";

/// Document-AI processor type.
pub const PROCESSOR_TYPE: &str = "processor_type";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of fields produced by detection.
pub const FIELD_COUNT: &str = "field_count";

/// Number of chunks processed (chunking, embedding).
pub const CHUNK_COUNT: &str = "chunk_count";

/// Current attempt number for a retried operation.
pub const ATTEMPT: &str = "attempt";

/// Number of queue items claimed or processed in one pass.
pub const BATCH_SIZE: &str = "batch_size";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for inference.
pub const MODEL: &str = "model";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Recovery strategy chosen for a failure.
pub const RECOVERY_STRATEGY: &str = "recovery_strategy";
