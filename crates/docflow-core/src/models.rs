//! Core data models for docflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// =============================================================================
// DOCUMENT
// =============================================================================

/// Lifecycle status of an uploaded document.
///
/// Transitions move forward only (pending → processing → completed/failed),
/// except for an explicit retry requeue which resets a failed document to
/// pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl DocumentStatus {
    /// String form used in the database and in API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
            DocumentStatus::Cancelled => "cancelled",
        }
    }

    /// Parse from the database string form. Unknown values fall back to pending.
    pub fn parse(s: &str) -> Self {
        match s {
            "processing" => DocumentStatus::Processing,
            "completed" => DocumentStatus::Completed,
            "failed" => DocumentStatus::Failed,
            "cancelled" => DocumentStatus::Cancelled,
            _ => DocumentStatus::Pending,
        }
    }

    /// Terminal states are never picked up by the worker again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DocumentStatus::Completed | DocumentStatus::Failed | DocumentStatus::Cancelled
        )
    }
}

/// An uploaded document and its processing state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub filename: String,
    /// Key into the object store where the raw bytes live.
    pub storage_path: String,
    pub mime_type: String,
    pub status: DocumentStatus,
    /// Number of processing runs that ended in failure.
    pub processing_attempts: i32,
    pub processing_error: Option<String>,
    /// Text extracted during processing; input to the chunker.
    pub extracted_text: Option<String>,
    pub page_count: Option<i32>,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request for registering a newly uploaded document.
#[derive(Debug, Clone)]
pub struct CreateDocumentRequest {
    pub filename: String,
    pub storage_path: String,
    pub mime_type: String,
    pub metadata: Option<JsonValue>,
}

// =============================================================================
// DETECTED FIELDS
// =============================================================================

/// Semantic type of a detected form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Email,
    Phone,
    Date,
    Ssn,
    Zip,
    Number,
    Currency,
    Checkbox,
    Radio,
    Signature,
    Address,
    Select,
    Textarea,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Email => "email",
            FieldType::Phone => "phone",
            FieldType::Date => "date",
            FieldType::Ssn => "ssn",
            FieldType::Zip => "zip",
            FieldType::Number => "number",
            FieldType::Currency => "currency",
            FieldType::Checkbox => "checkbox",
            FieldType::Radio => "radio",
            FieldType::Signature => "signature",
            FieldType::Address => "address",
            FieldType::Select => "select",
            FieldType::Textarea => "textarea",
        }
    }

    /// Parse from string form. Unknown values fall back to text.
    pub fn parse(s: &str) -> Self {
        match s {
            "email" => FieldType::Email,
            "phone" => FieldType::Phone,
            "date" => FieldType::Date,
            "ssn" => FieldType::Ssn,
            "zip" => FieldType::Zip,
            "number" => FieldType::Number,
            "currency" => FieldType::Currency,
            "checkbox" => FieldType::Checkbox,
            "radio" => FieldType::Radio,
            "signature" => FieldType::Signature,
            "address" => FieldType::Address,
            "select" => FieldType::Select,
            "textarea" => FieldType::Textarea,
            _ => FieldType::Text,
        }
    }
}

/// Page-relative position of a field, all values in percent of page size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldCoordinates {
    pub page: i32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A form field produced by one detection strategy.
///
/// The field set for a document is replaced wholesale on every detection
/// run; there is no partial merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedField {
    pub id: Uuid,
    pub document_id: Uuid,
    pub name: String,
    pub label: String,
    pub field_type: FieldType,
    pub value: Option<String>,
    /// Detection confidence in [0, 1].
    pub confidence: f32,
    pub coordinates: Option<FieldCoordinates>,
    /// Identifier of the strategy that produced this field.
    pub source_strategy: String,
    pub metadata: JsonValue,
}

// =============================================================================
// PROCESSING QUEUE
// =============================================================================

/// Status of a queue item. `Failed` is terminal (dead letter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "processing" => QueueStatus::Processing,
            "completed" => QueueStatus::Completed,
            "failed" => QueueStatus::Failed,
            _ => QueueStatus::Pending,
        }
    }
}

/// A persisted unit of processing work.
///
/// Invariant: `attempts <= max_attempts` always holds; `Failed` is never
/// reconsidered by the claim query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: Uuid,
    pub document_id: Uuid,
    /// Higher priority is claimed sooner.
    pub priority: i32,
    pub status: QueueStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    /// Which processors to run for this item (e.g. "detection", "embedding").
    pub processor_types: Vec<String>,
    /// Earliest time this item may be claimed; pushed forward on backoff.
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request for enqueueing a document for processing.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub document_id: Uuid,
    pub priority: i32,
    pub processor_types: Vec<String>,
    pub max_attempts: i32,
}

impl EnqueueRequest {
    /// Enqueue with default priority, processors and attempt budget.
    pub fn new(document_id: Uuid) -> Self {
        Self {
            document_id,
            priority: 0,
            processor_types: vec!["detection".to_string(), "embedding".to_string()],
            max_attempts: crate::defaults::QUEUE_MAX_ATTEMPTS,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_processors(mut self, processors: Vec<String>) -> Self {
        self.processor_types = processors;
        self
    }
}

/// Aggregated queue statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    /// Average started_at − scheduled_at over completed items, milliseconds.
    pub avg_wait_ms: Option<f64>,
    /// Average completed_at − started_at over completed items, milliseconds.
    pub avg_processing_ms: Option<f64>,
}

// =============================================================================
// CHUNKS
// =============================================================================

/// An embedded segment of extracted document text.
///
/// Chunk indices are 0-based and contiguous per document; the whole set is
/// replaced when a document is reprocessed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: i32,
    pub text: String,
    pub embedding: Vec<f32>,
    pub page_number: Option<i32>,
    pub metadata: JsonValue,
}

/// A chunk returned from similarity search, with its cosine similarity.
#[derive(Debug, Clone)]
pub struct ChunkHit {
    pub chunk: Chunk,
    pub similarity: f32,
}

// =============================================================================
// CHAT
// =============================================================================

/// Role of a chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "assistant" => MessageRole::Assistant,
            "system" => MessageRole::System,
            _ => MessageRole::User,
        }
    }
}

/// A numbered source citation attached to an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub source_text: String,
    pub page_number: Option<i32>,
    pub relevance_score: f32,
    pub chunk_index: i32,
}

/// A single chat message. Citations only ever appear on assistant messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub citations: Vec<Citation>,
    pub created_at: DateTime<Utc>,
}

/// A chat session scoped to one document and one user.
///
/// Sessions are idempotent per (document_id, user_id): lookups reuse an
/// existing session instead of creating a duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub document_id: Uuid,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// ERROR AUDIT LOG
// =============================================================================

/// Audit record written for every error-recovery invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub id: Uuid,
    pub operation: String,
    pub document_id: Option<Uuid>,
    pub error_type: String,
    pub message: String,
    /// Recovery strategy chosen for this failure.
    pub strategy: String,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

impl ErrorLogEntry {
    pub fn new(
        operation: &str,
        document_id: Option<Uuid>,
        error_type: &str,
        message: &str,
        strategy: &str,
        success: bool,
    ) -> Self {
        Self {
            id: crate::uuid_utils::new_v7(),
            operation: operation.to_string(),
            document_id,
            error_type: error_type.to_string(),
            message: message.to_string(),
            strategy: strategy.to_string(),
            success,
            created_at: Utc::now(),
        }
    }
}

// =============================================================================
// WEBHOOKS
// =============================================================================

/// An outbound webhook registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub id: Uuid,
    pub url: String,
    /// Shared secret for HMAC-SHA256 payload signing.
    pub secret: Option<String>,
    /// Event types this webhook subscribes to. Empty = all events.
    pub events: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub failure_count: i32,
    pub max_retries: i32,
}

/// A recorded webhook delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub event_type: String,
    pub payload: JsonValue,
    pub status_code: Option<i32>,
    pub response_body: Option<String>,
    pub delivered_at: DateTime<Utc>,
    pub success: bool,
}

/// Request for registering a webhook.
#[derive(Debug, Clone)]
pub struct CreateWebhookRequest {
    pub url: String,
    pub secret: Option<String>,
    pub events: Vec<String>,
    pub max_retries: i32,
}
