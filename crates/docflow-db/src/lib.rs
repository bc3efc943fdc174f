//! # docflow-db
//!
//! PostgreSQL persistence layer for docflow.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for documents, fields, chunks, queue, chat,
//!   webhooks, and the error audit log
//! - Vector similarity search with pgvector
//! - Filesystem object storage with signed URLs
//! - In-memory repository implementations for tests and single-process runs
//!
//! ## Example
//!
//! ```rust,ignore
//! use docflow_db::Database;
//! use docflow_core::{CreateDocumentRequest, DocumentRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/docflow").await?;
//!
//!     let document = db.documents.create(CreateDocumentRequest {
//!         filename: "invoice.pdf".to_string(),
//!         storage_path: "documents/invoice.pdf".to_string(),
//!         mime_type: "application/pdf".to_string(),
//!         metadata: None,
//!     }).await?;
//!
//!     println!("Registered document: {}", document.id);
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod chunks;
pub mod documents;
pub mod error_log;
pub mod fields;
pub mod memory;
pub mod pool;
pub mod queue;
pub mod storage;
pub mod webhooks;

// Re-export core types
pub use docflow_core::*;

pub use chat::PgChatRepository;
pub use chunks::PgChunkRepository;
pub use documents::PgDocumentRepository;
pub use error_log::PgErrorLogRepository;
pub use fields::PgFieldRepository;
pub use memory::{
    MemoryChatRepository, MemoryChunkRepository, MemoryDocumentRepository,
    MemoryErrorLogRepository, MemoryFieldRepository, MemoryObjectStore, MemoryQueueRepository,
    MemoryWebhookRepository,
};
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use queue::PgQueueRepository;
pub use storage::FilesystemStore;
pub use webhooks::PgWebhookRepository;

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Document repository for lifecycle management.
    pub documents: PgDocumentRepository,
    /// Detected field repository.
    pub fields: PgFieldRepository,
    /// Chunk repository for embeddings and similarity search.
    pub chunks: PgChunkRepository,
    /// Processing queue repository.
    pub queue: PgQueueRepository,
    /// Chat session and message repository.
    pub chat: PgChatRepository,
    /// Error-recovery audit log repository.
    pub error_log: PgErrorLogRepository,
    /// Webhook registration and delivery repository.
    pub webhooks: PgWebhookRepository,
}

impl Database {
    /// Connect with default pool configuration.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = create_pool(database_url).await?;
        Ok(Self::from_pool(pool))
    }

    /// Connect with custom pool configuration.
    pub async fn connect_with_config(database_url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(database_url, config).await?;
        Ok(Self::from_pool(pool))
    }

    /// Build repositories around an existing pool.
    pub fn from_pool(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            documents: PgDocumentRepository::new(pool.clone()),
            fields: PgFieldRepository::new(pool.clone()),
            chunks: PgChunkRepository::new(pool.clone()),
            queue: PgQueueRepository::new(pool.clone()),
            chat: PgChatRepository::new(pool.clone()),
            error_log: PgErrorLogRepository::new(pool.clone()),
            webhooks: PgWebhookRepository::new(pool.clone()),
            pool,
        }
    }
}
