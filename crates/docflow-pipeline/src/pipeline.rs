//! Per-document processing pipeline.
//!
//! Stages run in a fixed order: UPLOAD, FIELD_DETECTION, optional OCR,
//! optional VALIDATION, STORAGE, COMPLETED. FAILED absorbs from any
//! stage; CANCELLED is reached only by explicit cancellation.
//!
//! The single-flight guard is process-local. Running multiple pipeline
//! instances against the same database needs an external mutual-exclusion
//! mechanism (e.g. a conditional row update) to keep the guarantee.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};
use uuid::Uuid;

use docflow_core::{
    Chunk, ChunkRepository, DetectedField, Document, DocumentRepository, DocumentStatus, Error,
    EventBus, FieldRepository, ObjectStore, Result, ServerEvent,
};

use crate::chunker::Chunker;
use crate::embedder::EmbeddingGenerator;
use crate::recovery::ErrorRecoveryService;
use crate::strategies::{ChainResult, DetectionChain, DetectionRequest};
use crate::validation::{FieldValidator, ValidationWarning};

/// Stage of a document's processing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    Upload,
    FieldDetection,
    Ocr,
    Validation,
    Storage,
    Completed,
    Failed,
    Cancelled,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStage::Upload => "upload",
            ProcessingStage::FieldDetection => "field_detection",
            ProcessingStage::Ocr => "ocr",
            ProcessingStage::Validation => "validation",
            ProcessingStage::Storage => "storage",
            ProcessingStage::Completed => "completed",
            ProcessingStage::Failed => "failed",
            ProcessingStage::Cancelled => "cancelled",
        }
    }
}

/// Process-local single-flight guard keyed by document id.
///
/// The map holds the current stage for observability. Entries are removed
/// by the RAII [`FlightGuard`] on every exit path.
#[derive(Clone, Default)]
pub struct SingleFlight {
    active: Arc<Mutex<HashMap<Uuid, ProcessingStage>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim a document. Returns `None` when a run is already
    /// active for the id.
    pub fn try_acquire(&self, document_id: Uuid) -> Option<FlightGuard> {
        let mut active = self.active.lock().unwrap();
        if active.contains_key(&document_id) {
            return None;
        }
        active.insert(document_id, ProcessingStage::Upload);
        Some(FlightGuard {
            active: self.active.clone(),
            document_id,
        })
    }

    /// Stage of an active run, if any.
    pub fn current_stage(&self, document_id: Uuid) -> Option<ProcessingStage> {
        self.active.lock().unwrap().get(&document_id).copied()
    }

    /// Forcibly remove a document's entry. Used by cancellation.
    pub fn remove(&self, document_id: Uuid) -> bool {
        self.active.lock().unwrap().remove(&document_id).is_some()
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap().len()
    }
}

/// RAII handle for one processing run.
pub struct FlightGuard {
    active: Arc<Mutex<HashMap<Uuid, ProcessingStage>>>,
    document_id: Uuid,
}

impl FlightGuard {
    fn set_stage(&self, stage: ProcessingStage) {
        // Missing entry means the run was cancelled out from under us;
        // do not resurrect it.
        if let Some(current) = self.active.lock().unwrap().get_mut(&self.document_id) {
            *current = stage;
        }
    }

    fn is_cancelled(&self) -> bool {
        !self.active.lock().unwrap().contains_key(&self.document_id)
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.active.lock().unwrap().remove(&self.document_id);
    }
}

/// Pipeline feature toggles.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Run the validation stage.
    pub enable_validation: bool,
    /// Persist extracted text and build the chunk index.
    pub enable_indexing: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enable_validation: true,
            enable_indexing: true,
        }
    }
}

/// Outcome of a successful processing run.
#[derive(Debug, Clone)]
pub struct ProcessingReport {
    pub document_id: Uuid,
    pub strategy_id: String,
    pub field_count: usize,
    pub chunk_count: usize,
    pub degraded_chunks: usize,
    pub warnings: Vec<ValidationWarning>,
}

/// Orchestrates the per-document stage machine.
pub struct ProcessingPipeline {
    documents: Arc<dyn DocumentRepository>,
    fields: Arc<dyn FieldRepository>,
    chunks: Arc<dyn ChunkRepository>,
    store: Arc<dyn ObjectStore>,
    chain: Arc<DetectionChain>,
    chunker: Chunker,
    embedder: Arc<EmbeddingGenerator>,
    validator: FieldValidator,
    recovery: Arc<ErrorRecoveryService>,
    events: EventBus,
    guard: SingleFlight,
    config: PipelineConfig,
}

impl ProcessingPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        fields: Arc<dyn FieldRepository>,
        chunks: Arc<dyn ChunkRepository>,
        store: Arc<dyn ObjectStore>,
        chain: Arc<DetectionChain>,
        embedder: Arc<EmbeddingGenerator>,
        recovery: Arc<ErrorRecoveryService>,
        events: EventBus,
    ) -> Self {
        Self {
            documents,
            fields,
            chunks,
            store,
            chain,
            chunker: Chunker::default(),
            embedder,
            validator: FieldValidator::new(),
            recovery,
            events,
            guard: SingleFlight::new(),
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_chunker(mut self, chunker: Chunker) -> Self {
        self.chunker = chunker;
        self
    }

    /// Single-flight guard, shared with cancellation callers.
    pub fn guard(&self) -> &SingleFlight {
        &self.guard
    }

    /// Run the full stage machine for one document.
    ///
    /// A second concurrent call for the same id fails immediately with
    /// [`Error::AlreadyProcessing`] without touching storage or the
    /// external service, and without incrementing processing_attempts.
    pub async fn process_document(&self, document_id: Uuid) -> Result<ProcessingReport> {
        let guard = self
            .guard
            .try_acquire(document_id)
            .ok_or(Error::AlreadyProcessing(document_id))?;

        let document = self.documents.get(document_id).await?;

        self.documents
            .update_status(document_id, DocumentStatus::Processing)
            .await?;
        self.events
            .emit(ServerEvent::DocumentProcessing { document_id });

        match self.run_stages(&guard, &document).await {
            Ok(report) => {
                guard.set_stage(ProcessingStage::Completed);
                self.documents
                    .update_status(document_id, DocumentStatus::Completed)
                    .await?;
                self.recovery.clear_retries("process_document", Some(document_id));
                self.events.emit(ServerEvent::DocumentProcessed {
                    document_id,
                    field_count: report.field_count,
                    chunk_count: report.chunk_count,
                });
                info!(
                    subsystem = "pipeline",
                    component = "processing",
                    document_id = %document_id,
                    strategy = %report.strategy_id,
                    field_count = report.field_count,
                    chunk_count = report.chunk_count,
                    "Document processed"
                );
                Ok(report)
            }
            Err(error) if guard.is_cancelled() => {
                // Cancellation surfaced as an error mid-run; the document
                // status was already set by cancel().
                warn!(
                    subsystem = "pipeline",
                    component = "processing",
                    document_id = %document_id,
                    "Processing run cancelled"
                );
                Err(error)
            }
            Err(error) => {
                guard.set_stage(ProcessingStage::Failed);
                self.recovery
                    .handle("process_document", Some(document_id), &error)
                    .await;
                self.documents
                    .mark_failed(document_id, &error.to_string())
                    .await?;
                self.events.emit(ServerEvent::DocumentFailed {
                    document_id,
                    error: error.to_string(),
                });
                Err(error)
            }
        }
    }

    /// Cancel an active run and mark the document cancelled.
    ///
    /// In-flight external calls are not aborted; the running task observes
    /// the missing guard entry at its next stage boundary.
    pub async fn cancel(&self, document_id: Uuid) -> Result<bool> {
        let was_active = self.guard.remove(document_id);
        self.documents
            .update_status(document_id, DocumentStatus::Cancelled)
            .await?;
        info!(
            subsystem = "pipeline",
            component = "processing",
            document_id = %document_id,
            was_active,
            "Document cancelled"
        );
        Ok(was_active)
    }

    async fn run_stages(
        &self,
        guard: &FlightGuard,
        document: &Document,
    ) -> Result<ProcessingReport> {
        // UPLOAD: fetch the raw bytes.
        guard.set_stage(ProcessingStage::Upload);
        let content = self.store.get(&document.storage_path).await?;
        self.check_cancelled(guard, document.id)?;

        // FIELD_DETECTION: run the strategy chain.
        guard.set_stage(ProcessingStage::FieldDetection);
        let request = DetectionRequest {
            document_id: document.id,
            filename: document.filename.clone(),
            mime_type: document.mime_type.clone(),
            content,
            text: document.extracted_text.clone(),
        };
        let detection = self.chain.detect(&request).await;
        if !detection.is_success() {
            return Err(Error::Detection(format!(
                "no strategy produced fields for document {}",
                document.id
            )));
        }
        self.check_cancelled(guard, document.id)?;

        // OCR: persist extracted text when a strategy obtained it.
        guard.set_stage(ProcessingStage::Ocr);
        let text = self.resolve_text(&request, &detection);
        if self.config.enable_indexing {
            if let Some(ref text) = text {
                let page_count = document.page_count;
                self.documents
                    .set_extracted_text(document.id, text, page_count)
                    .await?;
            }
        }
        self.check_cancelled(guard, document.id)?;

        // VALIDATION: per-type checks, warnings only.
        let warnings = if self.config.enable_validation {
            guard.set_stage(ProcessingStage::Validation);
            self.validator.validate(&detection.fields)
        } else {
            Vec::new()
        };

        // STORAGE: replace fields wholesale, then rebuild the chunk index.
        guard.set_stage(ProcessingStage::Storage);
        let field_count = detection.fields.len();
        self.persist_fields(document.id, detection.fields).await?;

        let (chunk_count, degraded_chunks) = if self.config.enable_indexing {
            match text {
                Some(ref text) if !text.trim().is_empty() => {
                    let mut chunks = self.chunker.chunk(document.id, text);
                    let degraded = self.embedder.embed_chunks(&mut chunks).await?;
                    let count = chunks.len();
                    self.chunks.replace_for_document(document.id, chunks).await?;
                    (count, degraded)
                }
                _ => (0, 0),
            }
        } else {
            (0, 0)
        };

        Ok(ProcessingReport {
            document_id: document.id,
            strategy_id: detection
                .strategy_id
                .clone()
                .unwrap_or_default(),
            field_count,
            chunk_count,
            degraded_chunks,
            warnings,
        })
    }

    fn resolve_text(&self, request: &DetectionRequest, detection: &ChainResult) -> Option<String> {
        if let Some(ref text) = detection.text {
            return Some(text.clone());
        }
        if let Some(ref text) = request.text {
            return Some(text.clone());
        }
        if request.mime_type.starts_with("text/") {
            return String::from_utf8(request.content.clone()).ok();
        }
        None
    }

    async fn persist_fields(&self, document_id: Uuid, fields: Vec<DetectedField>) -> Result<()> {
        self.fields.replace_for_document(document_id, fields).await
    }

    /// List the chunks currently indexed for a document.
    pub async fn indexed_chunks(&self, document_id: Uuid) -> Result<Vec<Chunk>> {
        self.chunks.list_for_document(document_id).await
    }

    fn check_cancelled(&self, guard: &FlightGuard, document_id: Uuid) -> Result<()> {
        if guard.is_cancelled() {
            return Err(Error::Internal(format!(
                "processing cancelled for document {}",
                document_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::{DetectionOutcome, DetectionStrategy, SyntheticStrategy};
    use async_trait::async_trait;
    use docflow_core::{CreateDocumentRequest, ErrorLogRepository};
    use docflow_db::memory::{
        MemoryChunkRepository, MemoryDocumentRepository, MemoryErrorLogRepository,
        MemoryFieldRepository, MemoryObjectStore,
    };
    use docflow_inference::mock::MockInferenceBackend;
    use std::time::Duration;

    struct SlowStrategy {
        delay: Duration,
    }

    #[async_trait]
    impl DetectionStrategy for SlowStrategy {
        fn id(&self) -> &'static str {
            "slow"
        }

        async fn attempt(&self, request: &DetectionRequest) -> DetectionOutcome {
            tokio::time::sleep(self.delay).await;
            SyntheticStrategy::new().attempt(request).await
        }
    }

    struct TestHarness {
        pipeline: Arc<ProcessingPipeline>,
        documents: MemoryDocumentRepository,
        fields: MemoryFieldRepository,
        chunks: MemoryChunkRepository,
        store: MemoryObjectStore,
    }

    async fn harness(chain: DetectionChain) -> TestHarness {
        let documents = MemoryDocumentRepository::new();
        let fields = MemoryFieldRepository::new();
        let chunks = MemoryChunkRepository::new();
        let store = MemoryObjectStore::new();
        let error_log = MemoryErrorLogRepository::new();

        let embedder = Arc::new(EmbeddingGenerator::new(Arc::new(
            MockInferenceBackend::new().with_dimension(32),
        )));
        let recovery = Arc::new(ErrorRecoveryService::new(
            Arc::new(error_log.clone()) as Arc<dyn ErrorLogRepository>
        ));

        let pipeline = Arc::new(ProcessingPipeline::new(
            Arc::new(documents.clone()),
            Arc::new(fields.clone()),
            Arc::new(chunks.clone()),
            Arc::new(store.clone()),
            Arc::new(chain),
            embedder,
            recovery,
            EventBus::default(),
        ));

        TestHarness {
            pipeline,
            documents,
            fields,
            chunks,
            store,
        }
    }

    async fn upload(harness: &TestHarness, filename: &str, mime: &str, body: &[u8]) -> Uuid {
        let path = format!("documents/{}", filename);
        harness.store.put(&path, body).await.unwrap();
        let document = harness
            .documents
            .create(CreateDocumentRequest {
                filename: filename.to_string(),
                storage_path: path,
                mime_type: mime.to_string(),
                metadata: None,
            })
            .await
            .unwrap();
        document.id
    }

    fn synthetic_chain() -> DetectionChain {
        DetectionChain::new(vec![Arc::new(SyntheticStrategy::new())])
    }

    #[tokio::test]
    async fn test_successful_run_persists_everything() {
        let harness = harness(synthetic_chain()).await;
        let id = upload(
            &harness,
            "application.txt",
            "text/plain",
            b"Rental application form. The applicant completes all sections.",
        )
        .await;

        let report = harness.pipeline.process_document(id).await.unwrap();
        assert_eq!(report.strategy_id, "synthetic");
        assert!(report.field_count > 0);
        assert!(report.chunk_count > 0);

        let document = harness.documents.get(id).await.unwrap();
        assert_eq!(document.status, DocumentStatus::Completed);
        assert!(document.extracted_text.is_some());

        let fields = harness.fields.list_for_document(id).await.unwrap();
        assert_eq!(fields.len(), report.field_count);

        let chunks = harness.chunks.list_for_document(id).await.unwrap();
        assert_eq!(chunks.len(), report.chunk_count);
        assert!(chunks.iter().all(|c| !c.embedding.is_empty()));

        // Guard entry released.
        assert_eq!(harness.pipeline.guard().active_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_call_rejected_without_side_effects() {
        let chain = DetectionChain::new(vec![Arc::new(SlowStrategy {
            delay: Duration::from_millis(100),
        })]);
        let harness = harness(chain).await;
        let id = upload(&harness, "form.txt", "text/plain", b"Name: Jo").await;

        let pipeline = harness.pipeline.clone();
        let first = tokio::spawn(async move { pipeline.process_document(id).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = harness.pipeline.process_document(id).await;

        match second {
            Err(Error::AlreadyProcessing(rejected)) => assert_eq!(rejected, id),
            other => panic!("expected ALREADY_PROCESSING, got {:?}", other.map(|_| ())),
        }

        first.await.unwrap().unwrap();

        // One successful run, zero failed attempts recorded.
        let document = harness.documents.get(id).await.unwrap();
        assert_eq!(document.processing_attempts, 0);
        assert_eq!(document.status, DocumentStatus::Completed);
    }

    #[tokio::test]
    async fn test_failure_marks_document_and_increments_attempts() {
        // Chain with no strategies never produces fields.
        let harness = harness(DetectionChain::new(vec![])).await;
        let id = upload(&harness, "scan.pdf", "application/pdf", b"%PDF-1.4").await;

        let err = harness.pipeline.process_document(id).await.unwrap_err();
        assert!(matches!(err, Error::Detection(_)));

        let document = harness.documents.get(id).await.unwrap();
        assert_eq!(document.status, DocumentStatus::Failed);
        assert_eq!(document.processing_attempts, 1);
        assert!(document.processing_error.is_some());
        assert_eq!(harness.pipeline.guard().active_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_blob_fails_cleanly() {
        let harness = harness(synthetic_chain()).await;
        let document = harness
            .documents
            .create(CreateDocumentRequest {
                filename: "ghost.pdf".to_string(),
                storage_path: "documents/ghost.pdf".to_string(),
                mime_type: "application/pdf".to_string(),
                metadata: None,
            })
            .await
            .unwrap();

        assert!(harness.pipeline.process_document(document.id).await.is_err());
        let document = harness.documents.get(document.id).await.unwrap();
        assert_eq!(document.status, DocumentStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancel_marks_cancelled_and_clears_guard() {
        let chain = DetectionChain::new(vec![Arc::new(SlowStrategy {
            delay: Duration::from_millis(200),
        })]);
        let harness = harness(chain).await;
        let id = upload(&harness, "form.txt", "text/plain", b"Name: Jo").await;

        let pipeline = harness.pipeline.clone();
        let run = tokio::spawn(async move { pipeline.process_document(id).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let was_active = harness.pipeline.cancel(id).await.unwrap();
        assert!(was_active);

        // The run observes the cancellation at its next stage boundary.
        assert!(run.await.unwrap().is_err());
        let document = harness.documents.get(id).await.unwrap();
        assert_eq!(document.status, DocumentStatus::Cancelled);
        assert_eq!(harness.pipeline.guard().active_count(), 0);
    }

    #[tokio::test]
    async fn test_sequential_reruns_allowed() {
        let harness = harness(synthetic_chain()).await;
        let id = upload(&harness, "form.txt", "text/plain", b"Application form").await;

        harness.pipeline.process_document(id).await.unwrap();
        // A finished run releases the guard, so reprocessing works.
        harness.pipeline.process_document(id).await.unwrap();
    }
}
