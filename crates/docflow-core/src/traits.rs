//! Core trait definitions for repositories, storage, and inference backends.
//!
//! Repository traits decouple the pipeline, queue worker, and chat service
//! from the persistence layer. The `docflow-db` crate provides both Postgres
//! and in-memory implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    ChatMessage, ChatSession, Chunk, ChunkHit, CreateDocumentRequest, CreateWebhookRequest,
    Document, DocumentStatus, EnqueueRequest, ErrorLogEntry, QueueItem, QueueStats, Webhook,
    WebhookDelivery,
};

/// Repository for document lifecycle management.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Register a newly uploaded document with status pending.
    async fn create(&self, request: CreateDocumentRequest) -> Result<Document>;

    /// Fetch a document by id.
    async fn get(&self, id: Uuid) -> Result<Document>;

    /// List documents, most recently created first.
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Document>>;

    /// Transition a document's status.
    async fn update_status(&self, id: Uuid, status: DocumentStatus) -> Result<()>;

    /// Store extracted text and page count after text extraction.
    async fn set_extracted_text(&self, id: Uuid, text: &str, page_count: Option<i32>)
        -> Result<()>;

    /// Record a failed processing run: increments `processing_attempts`,
    /// stores the error, and sets status failed.
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()>;

    /// Clear failure state and reset the document to pending for a retry.
    async fn reset_for_retry(&self, id: Uuid) -> Result<()>;

    /// Delete a document and all dependent rows.
    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Repository for detected form fields.
#[async_trait]
pub trait FieldRepository: Send + Sync {
    /// Replace the full field set for a document. The previous set is
    /// deleted in the same transaction.
    async fn replace_for_document(
        &self,
        document_id: Uuid,
        fields: Vec<crate::models::DetectedField>,
    ) -> Result<()>;

    /// Fetch all fields for a document, in insertion order.
    async fn list_for_document(&self, document_id: Uuid) -> Result<Vec<crate::models::DetectedField>>;

    /// Update a single field's value.
    async fn update_value(&self, field_id: Uuid, value: Option<String>) -> Result<()>;
}

/// Repository for embedded text chunks and similarity search.
#[async_trait]
pub trait ChunkRepository: Send + Sync {
    /// Replace the full chunk set for a document.
    async fn replace_for_document(&self, document_id: Uuid, chunks: Vec<Chunk>) -> Result<()>;

    /// Fetch all chunks for a document ordered by chunk_index.
    async fn list_for_document(&self, document_id: Uuid) -> Result<Vec<Chunk>>;

    /// Top-k cosine similarity search within one document's chunks.
    /// Results are ordered by similarity descending, then chunk_index
    /// ascending for ties.
    async fn search(&self, document_id: Uuid, embedding: &[f32], top_k: usize)
        -> Result<Vec<ChunkHit>>;
}

/// Repository for the persisted processing queue.
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Insert a pending queue item.
    async fn enqueue(&self, request: EnqueueRequest) -> Result<QueueItem>;

    /// Fetch a queue item by id.
    async fn get(&self, id: Uuid) -> Result<QueueItem>;

    /// Atomically claim up to `limit` due pending items, marking them
    /// processing. Ordered by priority descending, then scheduled_at
    /// ascending. Items past their attempt budget are never returned.
    async fn claim_batch(&self, limit: usize) -> Result<Vec<QueueItem>>;

    /// Mark a claimed item completed.
    async fn complete(&self, id: Uuid) -> Result<()>;

    /// Return a failed item to pending with incremented attempts and a
    /// scheduled_at pushed `delay` into the future.
    async fn retry_later(&self, id: Uuid, error: &str, delay: chrono::Duration) -> Result<()>;

    /// Dead-letter an item: terminal failed status, error recorded.
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()>;

    /// Aggregate statistics across the queue.
    async fn stats(&self) -> Result<QueueStats>;

    /// Delete terminal items older than the cutoff. Returns rows removed.
    async fn cleanup(&self, older_than: DateTime<Utc>) -> Result<u64>;
}

/// Repository for chat sessions and messages.
#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// Fetch the session for (document, user), creating it if absent.
    async fn get_or_create_session(&self, document_id: Uuid, user_id: &str) -> Result<ChatSession>;

    /// Append a message to a session.
    async fn add_message(&self, message: ChatMessage) -> Result<()>;

    /// Fetch the most recent `limit` messages in chronological order.
    async fn recent_messages(&self, session_id: Uuid, limit: i64) -> Result<Vec<ChatMessage>>;
}

/// Repository for the error-recovery audit log.
#[async_trait]
pub trait ErrorLogRepository: Send + Sync {
    /// Record one recovery invocation.
    async fn record(&self, entry: ErrorLogEntry) -> Result<()>;

    /// Fetch recent entries for a document, newest first.
    async fn list_for_document(&self, document_id: Uuid, limit: i64) -> Result<Vec<ErrorLogEntry>>;
}

/// Repository for webhook registrations and delivery history.
#[async_trait]
pub trait WebhookRepository: Send + Sync {
    async fn create(&self, request: CreateWebhookRequest) -> Result<Webhook>;

    async fn get(&self, id: Uuid) -> Result<Webhook>;

    /// Active webhooks subscribed to `event_type` (empty filter matches all).
    async fn list_active_for_event(&self, event_type: &str) -> Result<Vec<Webhook>>;

    /// Record a delivery attempt. Success resets the failure counter;
    /// failure increments it and disables the webhook past the threshold.
    async fn record_delivery(&self, delivery: WebhookDelivery) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Object storage for raw document bytes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes under a key. Overwrites any existing object.
    async fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Fetch the full object.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Issue a time-limited signed read URL for an object.
    async fn signed_url(&self, key: &str, ttl_secs: i64) -> Result<String>;
}

/// Backend for embedding text into vectors.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a batch of texts. Returns one vector per input, same order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Vector dimension this backend produces.
    fn dimension(&self) -> usize;
}

/// Backend for text generation.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate a completion for a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate with an explicit system message.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traits_are_object_safe() {
        fn assert_object_safe<T: ?Sized>() {}

        assert_object_safe::<dyn DocumentRepository>();
        assert_object_safe::<dyn FieldRepository>();
        assert_object_safe::<dyn ChunkRepository>();
        assert_object_safe::<dyn QueueRepository>();
        assert_object_safe::<dyn ChatRepository>();
        assert_object_safe::<dyn ErrorLogRepository>();
        assert_object_safe::<dyn WebhookRepository>();
        assert_object_safe::<dyn ObjectStore>();
        assert_object_safe::<dyn EmbeddingBackend>();
        assert_object_safe::<dyn GenerationBackend>();
    }
}
