//! Error classification and recovery strategy selection.
//!
//! Failures from the external document-AI service, the embedding API, and
//! storage arrive as free-form messages. The classifier maps them onto a
//! small taxonomy by substring heuristics (best effort, replaceable with
//! structured codes later), and the recovery service consults a fixed table
//! to pick an action. Retry counts are tracked per (operation, document)
//! and never reset except by explicit clear.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use docflow_core::defaults;
use docflow_core::{Error, ErrorLogEntry, ErrorLogRepository};

/// Failure taxonomy for external and internal errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    Network,
    Auth,
    Storage,
    Processing,
    Validation,
    QuotaExceeded,
    Unknown,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Network => "network",
            ErrorType::Auth => "auth",
            ErrorType::Storage => "storage",
            ErrorType::Processing => "processing",
            ErrorType::Validation => "validation",
            ErrorType::QuotaExceeded => "quota_exceeded",
            ErrorType::Unknown => "unknown",
        }
    }
}

/// Recovery action selected for a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Retry after the advisory delay.
    RetryWithBackoff,
    /// Substitute a simpler outcome without failing the operation.
    Fallback,
    /// Surface the error to the user without automatic retry.
    NotifyUser,
    /// Re-enqueue for later processing.
    QueueForLater,
    /// Record and continue.
    LogAndContinue,
    /// Terminal failure.
    FailFast,
}

impl RecoveryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStrategy::RetryWithBackoff => "retry_with_backoff",
            RecoveryStrategy::Fallback => "fallback",
            RecoveryStrategy::NotifyUser => "notify_user",
            RecoveryStrategy::QueueForLater => "queue_for_later",
            RecoveryStrategy::LogAndContinue => "log_and_continue",
            RecoveryStrategy::FailFast => "fail_fast",
        }
    }
}

/// Outcome of one recovery consultation.
#[derive(Debug, Clone)]
pub struct RecoveryDecision {
    pub error_type: ErrorType,
    pub strategy: RecoveryStrategy,
    /// Advisory delay before the caller retries. Only set for
    /// [`RecoveryStrategy::RetryWithBackoff`].
    pub retry_after: Option<Duration>,
    /// Attempt number that produced this decision (1-based).
    pub attempt: u32,
}

/// Maps an error onto the failure taxonomy.
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, error: &Error) -> ErrorType;
}

/// Substring-based classifier over error messages.
///
/// Known to misclassify messages that embed another category's keyword.
/// Categories are checked in a fixed order so e.g. a rate-limit message
/// containing "service" still lands on QuotaExceeded.
#[derive(Debug, Clone, Default)]
pub struct HeuristicClassifier;

impl HeuristicClassifier {
    pub fn new() -> Self {
        Self
    }

    fn matches_any(message: &str, needles: &[&str]) -> bool {
        needles.iter().any(|n| message.contains(n))
    }
}

impl ErrorClassifier for HeuristicClassifier {
    fn classify(&self, error: &Error) -> ErrorType {
        // Variant-level shortcuts before message heuristics.
        match error {
            Error::Database(_) | Error::Storage(_) | Error::Io(_) => return ErrorType::Storage,
            Error::Unauthorized(_) => return ErrorType::Auth,
            Error::InvalidInput(_) => return ErrorType::Validation,
            _ => {}
        }

        let message = error.to_string().to_lowercase();

        if Self::matches_any(
            &message,
            &[
                "quota",
                "rate limit",
                "429",
                "too many requests",
                "resource exhausted",
            ],
        ) {
            return ErrorType::QuotaExceeded;
        }

        if Self::matches_any(
            &message,
            &[
                "unauthorized",
                "forbidden",
                "401",
                "403",
                "api key",
                "credential",
                "permission denied",
                "authentication",
            ],
        ) {
            return ErrorType::Auth;
        }

        if Self::matches_any(
            &message,
            &[
                "network",
                "connection",
                "timeout",
                "timed out",
                "deadline exceeded",
                "unavailable",
                "unreachable",
                "502",
                "503",
                "504",
                "dns",
                "socket",
            ],
        ) {
            return ErrorType::Network;
        }

        if Self::matches_any(
            &message,
            &[
                "storage",
                "bucket",
                "no such file",
                "file not found",
                "disk",
                "upload failed",
                "download failed",
            ],
        ) {
            return ErrorType::Storage;
        }

        if Self::matches_any(
            &message,
            &["validation", "invalid", "malformed", "missing required", "400"],
        ) {
            return ErrorType::Validation;
        }

        if Self::matches_any(
            &message,
            &[
                "processing",
                "parse",
                "extract",
                "detection",
                "ocr",
                "unsupported",
                "corrupt",
            ],
        ) {
            return ErrorType::Processing;
        }

        ErrorType::Unknown
    }
}

/// Configuration for [`ErrorRecoveryService`].
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Attempts before the exhausted column of the strategy table applies.
    pub max_retries: u32,
    /// Base backoff delay in milliseconds.
    pub backoff_base_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::RECOVERY_MAX_RETRIES,
            backoff_base_ms: defaults::RECOVERY_BACKOFF_BASE_MS,
        }
    }
}

/// Classifies failures, selects recovery strategies, and keeps the audit
/// trail. Constructed once and shared by reference.
pub struct ErrorRecoveryService {
    classifier: Arc<dyn ErrorClassifier>,
    error_log: Arc<dyn ErrorLogRepository>,
    config: RecoveryConfig,
    retry_counts: Mutex<HashMap<(String, Option<Uuid>), u32>>,
}

impl ErrorRecoveryService {
    pub fn new(error_log: Arc<dyn ErrorLogRepository>) -> Self {
        Self::with_classifier(error_log, Arc::new(HeuristicClassifier::new()))
    }

    pub fn with_classifier(
        error_log: Arc<dyn ErrorLogRepository>,
        classifier: Arc<dyn ErrorClassifier>,
    ) -> Self {
        Self {
            classifier,
            error_log,
            config: RecoveryConfig::default(),
            retry_counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_config(mut self, config: RecoveryConfig) -> Self {
        self.config = config;
        self
    }

    /// Classify a failure and pick a recovery strategy.
    ///
    /// Increments the (operation, document) retry counter and appends an
    /// audit entry regardless of outcome.
    pub async fn handle(
        &self,
        operation: &str,
        document_id: Option<Uuid>,
        error: &Error,
    ) -> RecoveryDecision {
        let error_type = self.classifier.classify(error);

        let attempt = {
            let mut counts = self.retry_counts.lock().unwrap();
            let count = counts
                .entry((operation.to_string(), document_id))
                .or_insert(0);
            *count += 1;
            *count
        };

        let strategy = self.select_strategy(error_type, attempt);

        let retry_after = if strategy == RecoveryStrategy::RetryWithBackoff {
            Some(Duration::from_millis(
                self.config.backoff_base_ms * 2u64.pow(attempt.saturating_sub(1)),
            ))
        } else {
            None
        };

        warn!(
            subsystem = "pipeline",
            component = "recovery",
            operation = %operation,
            document_id = ?document_id,
            error_type = error_type.as_str(),
            recovery_strategy = strategy.as_str(),
            attempt,
            error = %error,
            "Recovery decision"
        );

        let entry = ErrorLogEntry::new(
            operation,
            document_id,
            error_type.as_str(),
            &error.to_string(),
            strategy.as_str(),
            strategy != RecoveryStrategy::FailFast,
        );
        if let Err(log_err) = self.error_log.record(entry).await {
            warn!(
                subsystem = "pipeline",
                component = "recovery",
                error = %log_err,
                "Failed to record error log entry"
            );
        }

        RecoveryDecision {
            error_type,
            strategy,
            retry_after,
            attempt,
        }
    }

    /// Strategy table lookup. `attempt` is 1-based.
    fn select_strategy(&self, error_type: ErrorType, attempt: u32) -> RecoveryStrategy {
        let exhausted = attempt > self.config.max_retries;
        match (error_type, exhausted) {
            (ErrorType::Network, false) => RecoveryStrategy::RetryWithBackoff,
            (ErrorType::Network, true) => RecoveryStrategy::FailFast,
            (ErrorType::Auth, _) => RecoveryStrategy::NotifyUser,
            // First storage failure gets a retry, subsequent ones fall back.
            (ErrorType::Storage, false) => {
                if attempt == 1 {
                    RecoveryStrategy::RetryWithBackoff
                } else {
                    RecoveryStrategy::Fallback
                }
            }
            (ErrorType::Storage, true) => RecoveryStrategy::FailFast,
            (ErrorType::Processing, false) => RecoveryStrategy::Fallback,
            (ErrorType::Processing, true) => RecoveryStrategy::QueueForLater,
            (ErrorType::Validation, _) => RecoveryStrategy::LogAndContinue,
            (ErrorType::QuotaExceeded, _) => RecoveryStrategy::QueueForLater,
            (ErrorType::Unknown, false) => RecoveryStrategy::LogAndContinue,
            (ErrorType::Unknown, true) => RecoveryStrategy::FailFast,
        }
    }

    /// Current retry count for a key.
    pub fn retry_count(&self, operation: &str, document_id: Option<Uuid>) -> u32 {
        self.retry_counts
            .lock()
            .unwrap()
            .get(&(operation.to_string(), document_id))
            .copied()
            .unwrap_or(0)
    }

    /// Clear the retry counter for a key, e.g. after a successful run.
    pub fn clear_retries(&self, operation: &str, document_id: Option<Uuid>) {
        let removed = self
            .retry_counts
            .lock()
            .unwrap()
            .remove(&(operation.to_string(), document_id));
        if removed.is_some() {
            info!(
                subsystem = "pipeline",
                component = "recovery",
                operation = %operation,
                document_id = ?document_id,
                "Cleared retry counter"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_db::memory::MemoryErrorLogRepository;

    fn service() -> (ErrorRecoveryService, MemoryErrorLogRepository) {
        let log = MemoryErrorLogRepository::new();
        let service = ErrorRecoveryService::new(Arc::new(log.clone()));
        (service, log)
    }

    #[test]
    fn test_classify_network() {
        let classifier = HeuristicClassifier::new();
        let err = Error::DocumentAi("Request timeout: connection refused".to_string());
        assert_eq!(classifier.classify(&err), ErrorType::Network);

        let err = Error::DocumentAi("Document AI returned 503: unavailable".to_string());
        assert_eq!(classifier.classify(&err), ErrorType::Network);
    }

    #[test]
    fn test_classify_quota_before_network() {
        let classifier = HeuristicClassifier::new();
        let err = Error::Embedding("OpenAI returned 429: rate limit on connection".to_string());
        assert_eq!(classifier.classify(&err), ErrorType::QuotaExceeded);
    }

    #[test]
    fn test_classify_auth() {
        let classifier = HeuristicClassifier::new();
        let err = Error::DocumentAi("Document AI returned 403: permission denied".to_string());
        assert_eq!(classifier.classify(&err), ErrorType::Auth);
    }

    #[test]
    fn test_classify_unknown() {
        let classifier = HeuristicClassifier::new();
        let err = Error::Internal("something happened".to_string());
        assert_eq!(classifier.classify(&err), ErrorType::Unknown);
    }

    #[tokio::test]
    async fn test_network_backoff_progression() {
        let (service, _log) = service();
        let err = Error::DocumentAi("connection reset".to_string());
        let doc = Some(Uuid::new_v4());

        let expected = [1000u64, 2000, 4000];
        for expected_ms in expected {
            let decision = service.handle("detect", doc, &err).await;
            assert_eq!(decision.strategy, RecoveryStrategy::RetryWithBackoff);
            assert_eq!(
                decision.retry_after,
                Some(Duration::from_millis(expected_ms))
            );
        }

        let decision = service.handle("detect", doc, &err).await;
        assert_eq!(decision.strategy, RecoveryStrategy::FailFast);
        assert!(decision.retry_after.is_none());
    }

    #[tokio::test]
    async fn test_storage_retries_once_then_falls_back() {
        let (service, _log) = service();
        let err = Error::Storage("bucket write failed".to_string());
        let doc = Some(Uuid::new_v4());

        let first = service.handle("store", doc, &err).await;
        assert_eq!(first.strategy, RecoveryStrategy::RetryWithBackoff);

        let second = service.handle("store", doc, &err).await;
        assert_eq!(second.strategy, RecoveryStrategy::Fallback);

        let third = service.handle("store", doc, &err).await;
        assert_eq!(third.strategy, RecoveryStrategy::Fallback);

        let fourth = service.handle("store", doc, &err).await;
        assert_eq!(fourth.strategy, RecoveryStrategy::FailFast);
    }

    #[tokio::test]
    async fn test_processing_degrades_to_queue_for_later() {
        let (service, _log) = service();
        let err = Error::Detection("parse error in page 3".to_string());
        let doc = Some(Uuid::new_v4());

        for _ in 0..3 {
            let decision = service.handle("detect", doc, &err).await;
            assert_eq!(decision.strategy, RecoveryStrategy::Fallback);
        }
        let exhausted = service.handle("detect", doc, &err).await;
        assert_eq!(exhausted.strategy, RecoveryStrategy::QueueForLater);
    }

    #[tokio::test]
    async fn test_auth_always_notifies() {
        let (service, _log) = service();
        let err = Error::Unauthorized("bad token".to_string());
        for _ in 0..5 {
            let decision = service.handle("detect", None, &err).await;
            assert_eq!(decision.strategy, RecoveryStrategy::NotifyUser);
        }
    }

    #[tokio::test]
    async fn test_counters_isolated_per_operation_and_document() {
        let (service, _log) = service();
        let err = Error::DocumentAi("connection reset".to_string());
        let doc_a = Some(Uuid::new_v4());
        let doc_b = Some(Uuid::new_v4());

        service.handle("detect", doc_a, &err).await;
        service.handle("detect", doc_a, &err).await;
        service.handle("detect", doc_b, &err).await;
        service.handle("embed", doc_a, &err).await;

        assert_eq!(service.retry_count("detect", doc_a), 2);
        assert_eq!(service.retry_count("detect", doc_b), 1);
        assert_eq!(service.retry_count("embed", doc_a), 1);
    }

    #[tokio::test]
    async fn test_clear_resets_counter() {
        let (service, _log) = service();
        let err = Error::DocumentAi("connection reset".to_string());
        let doc = Some(Uuid::new_v4());

        service.handle("detect", doc, &err).await;
        service.clear_retries("detect", doc);
        assert_eq!(service.retry_count("detect", doc), 0);

        let decision = service.handle("detect", doc, &err).await;
        assert_eq!(decision.attempt, 1);
        assert_eq!(
            decision.retry_after,
            Some(Duration::from_millis(1000))
        );
    }

    #[tokio::test]
    async fn test_every_invocation_is_audited() {
        let (service, log) = service();
        let err = Error::DocumentAi("connection reset".to_string());
        let doc = Some(Uuid::new_v4());

        for _ in 0..4 {
            service.handle("detect", doc, &err).await;
        }

        let entries = log.entries();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].error_type, "network");
        assert_eq!(entries[3].strategy, "fail_fast");
        assert!(!entries[3].success);
    }
}
