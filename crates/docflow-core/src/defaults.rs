//! Centralized default constants for docflow.
//!
//! **This module is the single source of truth** for all shared default values.
//! All crates reference these constants instead of defining their own magic
//! numbers.
//!
//! Organized by domain area. When adding new constants, place them in the
//! appropriate section and document the rationale for the chosen value.

// =============================================================================
// CHUNKING
// =============================================================================

/// Maximum characters per chunk for text splitting.
pub const CHUNK_SIZE: usize = 1500;

/// Overlap characters carried between adjacent chunks.
pub const CHUNK_OVERLAP: usize = 200;

/// Minimum characters for a trailing chunk; smaller tails are merged into
/// the previous chunk.
pub const CHUNK_MIN_SIZE: usize = 100;

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding model name.
pub const EMBED_MODEL: &str = "text-embedding-3-small";

/// Default embedding vector dimension.
pub const EMBED_DIMENSION: usize = 1536;

/// Number of texts per embedding request batch.
pub const EMBED_BATCH_SIZE: usize = 16;

/// Pause between embedding batches in milliseconds.
pub const EMBED_BATCH_DELAY_MS: u64 = 100;

/// Timeout for embedding requests in seconds.
pub const EMBED_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// GENERATION
// =============================================================================

/// Default generation model name.
pub const GEN_MODEL: &str = "gpt-4o-mini";

/// Timeout for generation requests in seconds.
pub const GEN_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// QUEUE PROCESSING
// =============================================================================

/// Default maximum attempts before a queue item dead-letters.
pub const QUEUE_MAX_ATTEMPTS: i32 = 3;

/// Base unit for queue retry backoff in seconds (5 minutes).
/// Delay after a failure is `2^attempts * QUEUE_BACKOFF_BASE_SECS`.
pub const QUEUE_BACKOFF_BASE_SECS: i64 = 300;

/// Default number of queue items processed concurrently per worker.
pub const WORKER_CONCURRENCY: usize = 4;

/// Worker poll interval when the queue is empty, in milliseconds.
pub const WORKER_POLL_INTERVAL_MS: u64 = 1000;

/// Age cutoff for terminal queue item cleanup, in days.
pub const QUEUE_CLEANUP_DAYS: i64 = 7;

// =============================================================================
// DOCUMENT-AI CLIENT POOL
// =============================================================================

/// Global ceiling on concurrently admitted document-AI requests.
pub const POOL_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Maximum clients kept per processor type.
pub const POOL_MAX_CLIENTS_PER_PROCESSOR: usize = 4;

/// Idle client time-to-live in seconds before the sweep retires it.
pub const POOL_CLIENT_TTL_SECS: u64 = 300;

/// Requests served before a client is recycled.
pub const POOL_CLIENT_MAX_REQUESTS: u64 = 1000;

/// Interval between pool sweep passes in seconds.
pub const POOL_SWEEP_INTERVAL_SECS: u64 = 60;

// =============================================================================
// ERROR RECOVERY
// =============================================================================

/// Maximum recovery retries per (operation, document) before FailFast.
pub const RECOVERY_MAX_RETRIES: u32 = 3;

/// Base backoff for RetryWithBackoff in milliseconds.
/// Delay for retry n is `RECOVERY_BACKOFF_BASE_MS * 2^(n - 1)`.
pub const RECOVERY_BACKOFF_BASE_MS: u64 = 1000;

// =============================================================================
// DETECTION
// =============================================================================

/// Confidence below which a detected field is flagged for review.
pub const FIELD_CONFIDENCE_REVIEW_THRESHOLD: f32 = 0.5;

/// Base confidence assigned to synthetic fallback fields. Individual
/// fields score between this and 1.0 depending on keyword match strength.
pub const SYNTHETIC_FIELD_CONFIDENCE: f32 = 0.85;

/// Confidence assigned to fields parsed from native form structure.
pub const NATIVE_FIELD_CONFIDENCE: f32 = 1.0;

/// Confidence assigned to pattern-matched fields.
pub const PATTERN_FIELD_CONFIDENCE: f32 = 0.7;

// =============================================================================
// CHAT / RETRIEVAL
// =============================================================================

/// Number of chunks retrieved as context for a chat turn.
pub const CHAT_TOP_K: usize = 5;

/// Number of prior messages included in the generation prompt.
pub const CHAT_HISTORY_LIMIT: i64 = 10;

// =============================================================================
// EVENTS & WEBHOOKS
// =============================================================================

/// Event bus broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Webhook HTTP request timeout in seconds.
pub const WEBHOOK_TIMEOUT_SECS: u64 = 10;

/// Default per-delivery retry budget for a webhook endpoint.
pub const WEBHOOK_MAX_RETRIES: i32 = 3;

/// Consecutive failures after which a webhook is disabled.
pub const WEBHOOK_AUTO_DISABLE_THRESHOLD: i32 = 10;

// =============================================================================
// STORAGE
// =============================================================================

/// Default signed URL lifetime in seconds (15 minutes).
pub const SIGNED_URL_TTL_SECS: i64 = 900;

// =============================================================================
// DATABASE
// =============================================================================

/// Default maximum connections in the Postgres pool.
pub const DB_MAX_CONNECTIONS: u32 = 10;

/// Default database connection acquire timeout in seconds.
pub const DB_ACQUIRE_TIMEOUT_SECS: u64 = 30;
