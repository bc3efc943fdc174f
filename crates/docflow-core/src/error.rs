//! Error types for docflow.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using docflow's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for docflow operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Document not found
    #[error("Document not found: {0}")]
    DocumentNotFound(Uuid),

    /// A processing run for this document is already in flight
    #[error("ALREADY_PROCESSING: document {0} is already being processed")]
    AlreadyProcessing(Uuid),

    /// Field detection failed across the whole strategy chain
    #[error("Detection error: {0}")]
    Detection(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Inference/generation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// External document-AI service call failed
    #[error("Document AI error: {0}")]
    DocumentAi(String),

    /// Queue operation failed
    #[error("Queue error: {0}")]
    Queue(String),

    /// Object storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Authentication/authorization failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("test resource".to_string());
        assert_eq!(err.to_string(), "Not found: test resource");
    }

    #[test]
    fn test_error_display_document_not_found() {
        let id = Uuid::nil();
        let err = Error::DocumentNotFound(id);
        assert_eq!(err.to_string(), format!("Document not found: {}", id));
    }

    #[test]
    fn test_error_display_already_processing_contains_code() {
        let id = Uuid::new_v4();
        let err = Error::AlreadyProcessing(id);
        assert!(err.to_string().starts_with("ALREADY_PROCESSING"));
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_error_display_detection() {
        let err = Error::Detection("no strategy produced fields".to_string());
        assert_eq!(
            err.to_string(),
            "Detection error: no strategy produced fields"
        );
    }

    #[test]
    fn test_error_display_queue() {
        let err = Error::Queue("claim failed".to_string());
        assert_eq!(err.to_string(), "Queue error: claim failed");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
