//! Ordered fallback chain of form-field detection strategies.
//!
//! Strategies are tried in a fixed order and the chain returns on the
//! first one producing at least one field. A strategy that does not apply
//! to the input (wrong mime type, unconfigured service) reports
//! [`DetectionOutcome::NotApplicable`]; a strategy that genuinely crashed
//! reports [`DetectionOutcome::Error`]. Both advance the chain.

pub mod docai;
mod field_types;
pub mod native;
pub mod pattern;
pub mod synthetic;

pub use docai::DocAiStrategy;
pub use field_types::{infer_field_type, infer_field_type_scored};
pub use native::NativeFormStrategy;
pub use pattern::PatternStrategy;
pub use synthetic::SyntheticStrategy;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use docflow_core::{DetectedField, Error};

/// Input handed to every strategy in the chain.
#[derive(Debug, Clone)]
pub struct DetectionRequest {
    pub document_id: Uuid,
    pub filename: String,
    pub mime_type: String,
    /// Raw document bytes.
    pub content: Vec<u8>,
    /// Extracted text, when an earlier stage already produced it.
    pub text: Option<String>,
}

/// Three-way result of one strategy attempt.
pub enum DetectionOutcome {
    /// The strategy ran and produced fields. `text` carries extracted
    /// document text when the strategy obtained it as a side effect.
    Success {
        fields: Vec<DetectedField>,
        text: Option<String>,
    },
    /// The strategy does not apply to this input.
    NotApplicable { reason: String },
    /// The strategy applied but failed.
    Error { error: Error },
}

/// A single detection strategy.
#[async_trait]
pub trait DetectionStrategy: Send + Sync {
    /// Stable identifier recorded on every field this strategy produces.
    fn id(&self) -> &'static str;

    async fn attempt(&self, request: &DetectionRequest) -> DetectionOutcome;
}

/// Result of running the full chain.
#[derive(Debug, Clone)]
pub struct ChainResult {
    pub fields: Vec<DetectedField>,
    /// Strategy that produced the fields. `None` when every strategy
    /// yielded zero fields.
    pub strategy_id: Option<String>,
    /// Extracted text from the winning strategy, if any.
    pub text: Option<String>,
}

impl ChainResult {
    pub fn is_success(&self) -> bool {
        self.strategy_id.is_some()
    }
}

/// Ordered fallback chain over detection strategies.
pub struct DetectionChain {
    strategies: Vec<Arc<dyn DetectionStrategy>>,
}

impl DetectionChain {
    /// Build a chain with an explicit strategy order.
    pub fn new(strategies: Vec<Arc<dyn DetectionStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_ids(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.id()).collect()
    }

    /// Run strategies in order, returning on the first that yields at
    /// least one field.
    pub async fn detect(&self, request: &DetectionRequest) -> ChainResult {
        for strategy in &self.strategies {
            match strategy.attempt(request).await {
                DetectionOutcome::Success { fields, text } if !fields.is_empty() => {
                    info!(
                        subsystem = "pipeline",
                        component = "detection_chain",
                        document_id = %request.document_id,
                        strategy = strategy.id(),
                        field_count = fields.len(),
                        "Detection succeeded"
                    );
                    return ChainResult {
                        fields,
                        strategy_id: Some(strategy.id().to_string()),
                        text,
                    };
                }
                DetectionOutcome::Success { .. } => {
                    debug!(
                        subsystem = "pipeline",
                        component = "detection_chain",
                        document_id = %request.document_id,
                        strategy = strategy.id(),
                        "Strategy produced zero fields, continuing"
                    );
                }
                DetectionOutcome::NotApplicable { reason } => {
                    debug!(
                        subsystem = "pipeline",
                        component = "detection_chain",
                        document_id = %request.document_id,
                        strategy = strategy.id(),
                        reason = %reason,
                        "Strategy not applicable"
                    );
                }
                DetectionOutcome::Error { error } => {
                    warn!(
                        subsystem = "pipeline",
                        component = "detection_chain",
                        document_id = %request.document_id,
                        strategy = strategy.id(),
                        error = %error,
                        "Strategy failed, continuing"
                    );
                }
            }
        }

        warn!(
            subsystem = "pipeline",
            component = "detection_chain",
            document_id = %request.document_id,
            "No strategy produced fields"
        );
        ChainResult {
            fields: Vec::new(),
            strategy_id: None,
            text: None,
        }
    }
}
