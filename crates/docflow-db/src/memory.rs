//! In-memory repository implementations.
//!
//! Back the same traits the Postgres repositories implement, for tests and
//! single-process runs without a database. Semantics mirror the SQL
//! implementations: claim ordering, attempt accounting, idempotent chat
//! sessions, webhook failure tracking.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use docflow_core::defaults;
use docflow_core::{
    new_v7, ChatMessage, ChatRepository, ChatSession, Chunk, ChunkHit, ChunkRepository,
    CreateDocumentRequest, CreateWebhookRequest, DetectedField, Document, DocumentRepository,
    DocumentStatus, EnqueueRequest, Error, ErrorLogEntry, ErrorLogRepository, FieldRepository,
    ObjectStore, QueueItem, QueueRepository, QueueStats, QueueStatus, Result, Webhook,
    WebhookDelivery, WebhookRepository,
};

// =============================================================================
// DOCUMENTS
// =============================================================================

/// In-memory DocumentRepository.
#[derive(Default, Clone)]
pub struct MemoryDocumentRepository {
    documents: Arc<Mutex<HashMap<Uuid, Document>>>,
}

impl MemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentRepository for MemoryDocumentRepository {
    async fn create(&self, request: CreateDocumentRequest) -> Result<Document> {
        let now = Utc::now();
        let document = Document {
            id: new_v7(),
            filename: request.filename,
            storage_path: request.storage_path,
            mime_type: request.mime_type,
            status: DocumentStatus::Pending,
            processing_attempts: 0,
            processing_error: None,
            extracted_text: None,
            page_count: None,
            metadata: request.metadata.unwrap_or_else(|| serde_json::json!({})),
            created_at: now,
            updated_at: now,
        };
        self.documents
            .lock()
            .unwrap()
            .insert(document.id, document.clone());
        Ok(document)
    }

    async fn get(&self, id: Uuid) -> Result<Document> {
        self.documents
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(Error::DocumentNotFound(id))
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = self.documents.lock().unwrap().values().cloned().collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(docs
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn update_status(&self, id: Uuid, status: DocumentStatus) -> Result<()> {
        let mut docs = self.documents.lock().unwrap();
        let doc = docs.get_mut(&id).ok_or(Error::DocumentNotFound(id))?;
        doc.status = status;
        doc.updated_at = Utc::now();
        Ok(())
    }

    async fn set_extracted_text(
        &self,
        id: Uuid,
        text: &str,
        page_count: Option<i32>,
    ) -> Result<()> {
        let mut docs = self.documents.lock().unwrap();
        let doc = docs.get_mut(&id).ok_or(Error::DocumentNotFound(id))?;
        doc.extracted_text = Some(text.to_string());
        doc.page_count = page_count;
        doc.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        let mut docs = self.documents.lock().unwrap();
        let doc = docs.get_mut(&id).ok_or(Error::DocumentNotFound(id))?;
        doc.status = DocumentStatus::Failed;
        doc.processing_error = Some(error.to_string());
        doc.processing_attempts += 1;
        doc.updated_at = Utc::now();
        Ok(())
    }

    async fn reset_for_retry(&self, id: Uuid) -> Result<()> {
        let mut docs = self.documents.lock().unwrap();
        let doc = docs.get_mut(&id).ok_or(Error::DocumentNotFound(id))?;
        doc.status = DocumentStatus::Pending;
        doc.processing_error = None;
        doc.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.documents.lock().unwrap().remove(&id);
        Ok(())
    }
}

// =============================================================================
// FIELDS
// =============================================================================

/// In-memory FieldRepository.
#[derive(Default, Clone)]
pub struct MemoryFieldRepository {
    fields: Arc<Mutex<HashMap<Uuid, Vec<DetectedField>>>>,
}

impl MemoryFieldRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FieldRepository for MemoryFieldRepository {
    async fn replace_for_document(
        &self,
        document_id: Uuid,
        fields: Vec<DetectedField>,
    ) -> Result<()> {
        self.fields.lock().unwrap().insert(document_id, fields);
        Ok(())
    }

    async fn list_for_document(&self, document_id: Uuid) -> Result<Vec<DetectedField>> {
        Ok(self
            .fields
            .lock()
            .unwrap()
            .get(&document_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_value(&self, field_id: Uuid, value: Option<String>) -> Result<()> {
        let mut fields = self.fields.lock().unwrap();
        for field_set in fields.values_mut() {
            if let Some(field) = field_set.iter_mut().find(|f| f.id == field_id) {
                field.value = value;
                return Ok(());
            }
        }
        Err(Error::NotFound(format!("field {}", field_id)))
    }
}

// =============================================================================
// CHUNKS
// =============================================================================

/// In-memory ChunkRepository with brute-force cosine search.
#[derive(Default, Clone)]
pub struct MemoryChunkRepository {
    chunks: Arc<Mutex<HashMap<Uuid, Vec<Chunk>>>>,
}

impl MemoryChunkRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl ChunkRepository for MemoryChunkRepository {
    async fn replace_for_document(&self, document_id: Uuid, chunks: Vec<Chunk>) -> Result<()> {
        self.chunks.lock().unwrap().insert(document_id, chunks);
        Ok(())
    }

    async fn list_for_document(&self, document_id: Uuid) -> Result<Vec<Chunk>> {
        let mut chunks = self
            .chunks
            .lock()
            .unwrap()
            .get(&document_id)
            .cloned()
            .unwrap_or_default();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn search(
        &self,
        document_id: Uuid,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ChunkHit>> {
        let chunks = self
            .chunks
            .lock()
            .unwrap()
            .get(&document_id)
            .cloned()
            .unwrap_or_default();

        let mut hits: Vec<ChunkHit> = chunks
            .into_iter()
            .map(|chunk| ChunkHit {
                similarity: cosine_similarity(embedding, &chunk.embedding),
                chunk,
            })
            .collect();

        // Similarity descending, chunk_index ascending on ties.
        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}

// =============================================================================
// QUEUE
// =============================================================================

/// In-memory QueueRepository.
#[derive(Default, Clone)]
pub struct MemoryQueueRepository {
    items: Arc<Mutex<HashMap<Uuid, QueueItem>>>,
}

impl MemoryQueueRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pull a pending item's scheduled_at back to now so tests can claim
    /// it without waiting out the backoff.
    pub fn make_due(&self, id: Uuid) {
        if let Some(item) = self.items.lock().unwrap().get_mut(&id) {
            item.scheduled_at = Utc::now();
        }
    }
}

#[async_trait]
impl QueueRepository for MemoryQueueRepository {
    async fn enqueue(&self, request: EnqueueRequest) -> Result<QueueItem> {
        let now = Utc::now();
        let item = QueueItem {
            id: new_v7(),
            document_id: request.document_id,
            priority: request.priority,
            status: QueueStatus::Pending,
            attempts: 0,
            max_attempts: request.max_attempts,
            processor_types: request.processor_types,
            scheduled_at: now,
            started_at: None,
            completed_at: None,
            error: None,
            created_at: now,
        };
        self.items.lock().unwrap().insert(item.id, item.clone());
        Ok(item)
    }

    async fn get(&self, id: Uuid) -> Result<QueueItem> {
        self.items
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("queue item {}", id)))
    }

    async fn claim_batch(&self, limit: usize) -> Result<Vec<QueueItem>> {
        let now = Utc::now();
        let mut items = self.items.lock().unwrap();

        let mut due: Vec<Uuid> = items
            .values()
            .filter(|item| {
                item.status == QueueStatus::Pending
                    && item.scheduled_at <= now
                    && item.attempts < item.max_attempts
            })
            .map(|item| item.id)
            .collect();

        due.sort_by(|a, b| {
            let ia = &items[a];
            let ib = &items[b];
            ib.priority
                .cmp(&ia.priority)
                .then(ia.scheduled_at.cmp(&ib.scheduled_at))
        });
        due.truncate(limit);

        let mut claimed = Vec::with_capacity(due.len());
        for id in due {
            if let Some(item) = items.get_mut(&id) {
                item.status = QueueStatus::Processing;
                item.started_at = Some(now);
                claimed.push(item.clone());
            }
        }
        Ok(claimed)
    }

    async fn complete(&self, id: Uuid) -> Result<()> {
        let mut items = self.items.lock().unwrap();
        let item = items
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("queue item {}", id)))?;
        item.status = QueueStatus::Completed;
        item.completed_at = Some(Utc::now());
        item.error = None;
        Ok(())
    }

    async fn retry_later(&self, id: Uuid, error: &str, delay: Duration) -> Result<()> {
        let mut items = self.items.lock().unwrap();
        let item = items
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("queue item {}", id)))?;
        item.status = QueueStatus::Pending;
        item.attempts += 1;
        item.error = Some(error.to_string());
        item.scheduled_at = Utc::now() + delay;
        item.started_at = None;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        let mut items = self.items.lock().unwrap();
        let item = items
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("queue item {}", id)))?;
        item.status = QueueStatus::Failed;
        item.attempts += 1;
        item.error = Some(error.to_string());
        item.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn stats(&self) -> Result<QueueStats> {
        let items = self.items.lock().unwrap();
        let mut stats = QueueStats::default();
        let mut wait_total = 0.0;
        let mut processing_total = 0.0;
        let mut completed_with_times = 0u32;

        for item in items.values() {
            match item.status {
                QueueStatus::Pending => stats.pending += 1,
                QueueStatus::Processing => stats.processing += 1,
                QueueStatus::Completed => stats.completed += 1,
                QueueStatus::Failed => stats.failed += 1,
            }
            if item.status == QueueStatus::Completed {
                if let (Some(started), Some(completed)) = (item.started_at, item.completed_at) {
                    wait_total += (started - item.scheduled_at).num_milliseconds() as f64;
                    processing_total += (completed - started).num_milliseconds() as f64;
                    completed_with_times += 1;
                }
            }
        }

        if completed_with_times > 0 {
            stats.avg_wait_ms = Some(wait_total / completed_with_times as f64);
            stats.avg_processing_ms = Some(processing_total / completed_with_times as f64);
        }
        Ok(stats)
    }

    async fn cleanup(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let mut items = self.items.lock().unwrap();
        let before = items.len();
        items.retain(|_, item| {
            !(matches!(item.status, QueueStatus::Completed | QueueStatus::Failed)
                && item.completed_at.is_some_and(|t| t < older_than))
        });
        Ok((before - items.len()) as u64)
    }
}

// =============================================================================
// CHAT
// =============================================================================

/// In-memory ChatRepository.
#[derive(Default, Clone)]
pub struct MemoryChatRepository {
    sessions: Arc<Mutex<HashMap<(Uuid, String), ChatSession>>>,
    messages: Arc<Mutex<HashMap<Uuid, Vec<ChatMessage>>>>,
}

impl MemoryChatRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatRepository for MemoryChatRepository {
    async fn get_or_create_session(&self, document_id: Uuid, user_id: &str) -> Result<ChatSession> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .entry((document_id, user_id.to_string()))
            .or_insert_with(|| ChatSession {
                id: new_v7(),
                document_id,
                user_id: user_id.to_string(),
                created_at: Utc::now(),
            });
        Ok(session.clone())
    }

    async fn add_message(&self, message: ChatMessage) -> Result<()> {
        self.messages
            .lock()
            .unwrap()
            .entry(message.session_id)
            .or_default()
            .push(message);
        Ok(())
    }

    async fn recent_messages(&self, session_id: Uuid, limit: i64) -> Result<Vec<ChatMessage>> {
        let messages = self.messages.lock().unwrap();
        let all = messages.get(&session_id).cloned().unwrap_or_default();
        let skip = all.len().saturating_sub(limit as usize);
        Ok(all.into_iter().skip(skip).collect())
    }
}

// =============================================================================
// ERROR LOG
// =============================================================================

/// In-memory ErrorLogRepository.
#[derive(Default, Clone)]
pub struct MemoryErrorLogRepository {
    entries: Arc<Mutex<Vec<ErrorLogEntry>>>,
}

impl MemoryErrorLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded entries, in insertion order.
    pub fn entries(&self) -> Vec<ErrorLogEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ErrorLogRepository for MemoryErrorLogRepository {
    async fn record(&self, entry: ErrorLogEntry) -> Result<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    async fn list_for_document(&self, document_id: Uuid, limit: i64) -> Result<Vec<ErrorLogEntry>> {
        let entries = self.entries.lock().unwrap();
        let mut matching: Vec<ErrorLogEntry> = entries
            .iter()
            .filter(|e| e.document_id == Some(document_id))
            .cloned()
            .collect();
        matching.reverse();
        matching.truncate(limit as usize);
        Ok(matching)
    }
}

// =============================================================================
// WEBHOOKS
// =============================================================================

/// In-memory WebhookRepository.
#[derive(Default, Clone)]
pub struct MemoryWebhookRepository {
    webhooks: Arc<Mutex<HashMap<Uuid, Webhook>>>,
    deliveries: Arc<Mutex<Vec<WebhookDelivery>>>,
}

impl MemoryWebhookRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded deliveries, in insertion order.
    pub fn deliveries(&self) -> Vec<WebhookDelivery> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookRepository for MemoryWebhookRepository {
    async fn create(&self, request: CreateWebhookRequest) -> Result<Webhook> {
        let now = Utc::now();
        let webhook = Webhook {
            id: new_v7(),
            url: request.url,
            secret: request.secret,
            events: request.events,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_triggered_at: None,
            failure_count: 0,
            max_retries: request.max_retries,
        };
        self.webhooks
            .lock()
            .unwrap()
            .insert(webhook.id, webhook.clone());
        Ok(webhook)
    }

    async fn get(&self, id: Uuid) -> Result<Webhook> {
        self.webhooks
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("webhook {}", id)))
    }

    async fn list_active_for_event(&self, event_type: &str) -> Result<Vec<Webhook>> {
        Ok(self
            .webhooks
            .lock()
            .unwrap()
            .values()
            .filter(|w| {
                w.is_active
                    && (w.events.is_empty() || w.events.iter().any(|e| e == event_type))
            })
            .cloned()
            .collect())
    }

    async fn record_delivery(&self, delivery: WebhookDelivery) -> Result<()> {
        let mut webhooks = self.webhooks.lock().unwrap();
        if let Some(webhook) = webhooks.get_mut(&delivery.webhook_id) {
            webhook.updated_at = Utc::now();
            if delivery.success {
                webhook.last_triggered_at = Some(delivery.delivered_at);
                webhook.failure_count = 0;
            } else {
                webhook.failure_count += 1;
                if webhook.failure_count >= defaults::WEBHOOK_AUTO_DISABLE_THRESHOLD {
                    webhook.is_active = false;
                }
            }
        }
        self.deliveries.lock().unwrap().push(delivery);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.webhooks.lock().unwrap().remove(&id);
        self.deliveries
            .lock()
            .unwrap()
            .retain(|d| d.webhook_id != id);
        Ok(())
    }
}

// =============================================================================
// OBJECT STORE
// =============================================================================

/// In-memory ObjectStore.
#[derive(Default, Clone)]
pub struct MemoryObjectStore {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::Storage(format!("object not found: {}", key)))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn signed_url(&self, key: &str, ttl_secs: i64) -> Result<String> {
        let expires = Utc::now().timestamp() + ttl_secs;
        Ok(format!("memory://{}?expires={}", key, expires))
    }
}
