//! AI-backed detection via the external document-AI service.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use docflow_core::{DetectedField, FieldCoordinates, FieldType};
use docflow_inference::docai::{AnalyzeRequest, DocumentAiBackend};
use docflow_inference::pool::ProcessorPool;

use super::field_types::infer_field_type;
use super::{DetectionOutcome, DetectionRequest, DetectionStrategy};

const SUPPORTED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "image/png",
    "image/jpeg",
    "image/tiff",
    "image/webp",
];

/// Strategy that sends raw bytes to the document-AI service.
///
/// Clients are taken from the processor pool so the service's global
/// concurrency budget applies.
pub struct DocAiStrategy<C: DocumentAiBackend + Send + Sync + 'static> {
    pool: Arc<ProcessorPool<C>>,
    processor_type: String,
}

impl<C: DocumentAiBackend + Send + Sync + 'static> DocAiStrategy<C> {
    pub fn new(pool: Arc<ProcessorPool<C>>, processor_type: impl Into<String>) -> Self {
        Self {
            pool,
            processor_type: processor_type.into(),
        }
    }
}

#[async_trait]
impl<C: DocumentAiBackend + Send + Sync + 'static> DetectionStrategy for DocAiStrategy<C> {
    fn id(&self) -> &'static str {
        "docai"
    }

    async fn attempt(&self, request: &DetectionRequest) -> DetectionOutcome {
        if !SUPPORTED_MIME_TYPES.contains(&request.mime_type.as_str()) {
            return DetectionOutcome::NotApplicable {
                reason: format!("unsupported mime type {}", request.mime_type),
            };
        }

        let guard = match self.pool.acquire(&self.processor_type).await {
            Ok(guard) => guard,
            Err(error) => return DetectionOutcome::Error { error },
        };

        let analyze = AnalyzeRequest {
            content: request.content.clone(),
            mime_type: request.mime_type.clone(),
            processor_type: self.processor_type.clone(),
            pages: None,
        };

        let analyzed = match guard.client().analyze(analyze).await {
            Ok(analyzed) => analyzed,
            Err(error) => return DetectionOutcome::Error { error },
        };

        let fields: Vec<DetectedField> = analyzed
            .form_fields
            .iter()
            .map(|f| {
                // Prefer the service's own type hint; fall back to keyword
                // inference when it says "text" or something unknown.
                let hinted = FieldType::parse(&f.field_type);
                let field_type = if hinted == FieldType::Text {
                    infer_field_type(&f.name, &f.name)
                } else {
                    hinted
                };

                DetectedField {
                    id: docflow_core::uuid_utils::new_v7(),
                    document_id: request.document_id,
                    name: f.name.clone(),
                    label: f.name.clone(),
                    field_type,
                    value: f.value.clone(),
                    confidence: f.confidence.clamp(0.0, 1.0),
                    coordinates: f.bounding_box.map(|b| FieldCoordinates {
                        page: f.page.max(1),
                        x: b.x,
                        y: b.y,
                        width: b.width,
                        height: b.height,
                    }),
                    source_strategy: "docai".to_string(),
                    metadata: json!({ "processor_type": self.processor_type }),
                }
            })
            .collect();

        debug!(
            subsystem = "pipeline",
            component = "detection_chain",
            strategy = "docai",
            document_id = %request.document_id,
            field_count = fields.len(),
            "Document AI analysis complete"
        );

        let text = if analyzed.text.is_empty() {
            None
        } else {
            Some(analyzed.text)
        };

        DetectionOutcome::Success { fields, text }
    }
}
