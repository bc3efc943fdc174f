//! HTTP client for the external document-AI service.
//!
//! The service accepts raw document bytes and returns extracted text, page
//! layout, and detected form fields. Requests are shaped per processor type
//! (e.g. "form-parser", "ocr", "invoice").

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use docflow_core::{Error, Result};

/// Default document-AI endpoint.
pub const DEFAULT_DOCAI_URL: &str = "http://127.0.0.1:8710/v1";

/// Default processor type.
pub const DEFAULT_PROCESSOR_TYPE: &str = "form-parser";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Configuration for the document-AI client.
#[derive(Debug, Clone)]
pub struct DocAiConfig {
    /// Base URL for the service.
    pub base_url: String,
    /// API key for authentication (optional for local deployments).
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for DocAiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_DOCAI_URL.to_string(),
            api_key: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl DocAiConfig {
    /// Create from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("DOCAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_DOCAI_URL.to_string()),
            api_key: std::env::var("DOCAI_API_KEY").ok(),
            timeout_seconds: std::env::var("DOCAI_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Request for document analysis.
#[derive(Debug, Clone)]
pub struct AnalyzeRequest {
    /// Raw document bytes.
    pub content: Vec<u8>,
    pub mime_type: String,
    /// Processor type selecting the analysis profile.
    pub processor_type: String,
    /// Optional page range hint (1-based, inclusive).
    pub pages: Option<(i32, i32)>,
}

/// A form field detected by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocAiFormField {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    pub field_type: String,
    pub confidence: f32,
    #[serde(default)]
    pub page: i32,
    #[serde(default)]
    pub bounding_box: Option<DocAiBoundingBox>,
}

/// Page-relative bounding box, values in percent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DocAiBoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A single analyzed page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocAiPage {
    pub page_number: i32,
    pub text: String,
}

/// Full analysis result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedDocument {
    /// Full extracted text across all pages.
    pub text: String,
    #[serde(default)]
    pub pages: Vec<DocAiPage>,
    #[serde(default)]
    pub form_fields: Vec<DocAiFormField>,
}

/// Backend interface for document analysis.
#[async_trait]
pub trait DocumentAiBackend: Send + Sync {
    async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalyzedDocument>;
}

#[derive(Serialize)]
struct AnalyzeBody {
    raw_document: RawDocument,
    #[serde(skip_serializing_if = "Option::is_none")]
    pages: Option<PageRange>,
}

#[derive(Serialize)]
struct RawDocument {
    content: String,
    mime_type: String,
}

#[derive(Serialize)]
struct PageRange {
    start: i32,
    end: i32,
}

#[derive(Deserialize)]
struct DocAiErrorBody {
    #[serde(default)]
    message: String,
}

/// reqwest-backed document-AI client.
pub struct DocAiClient {
    client: Client,
    config: DocAiConfig,
}

impl DocAiClient {
    pub fn new(config: DocAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::DocumentAi(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "docai",
            base_url = %config.base_url,
            "Initializing document-AI client"
        );

        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(DocAiConfig::from_env())
    }

    pub fn config(&self) -> &DocAiConfig {
        &self.config
    }
}

#[async_trait]
impl DocumentAiBackend for DocAiClient {
    async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalyzedDocument> {
        debug!(
            subsystem = "inference",
            component = "docai",
            op = "analyze",
            processor_type = %request.processor_type,
            size = request.content.len(),
            "Analyzing document"
        );

        let body = AnalyzeBody {
            raw_document: RawDocument {
                content: base64::engine::general_purpose::STANDARD.encode(&request.content),
                mime_type: request.mime_type.clone(),
            },
            pages: request.pages.map(|(start, end)| PageRange { start, end }),
        };

        let url = format!(
            "{}/processors/{}:analyze",
            self.config.base_url.trim_end_matches('/'),
            request.processor_type
        );

        let mut req = self.client.post(&url).json(&body);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::DocumentAi(format!("Request timeout: {}", e))
                } else {
                    Error::DocumentAi(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body: DocAiErrorBody = response.json().await.unwrap_or(DocAiErrorBody {
                message: "Unknown error".to_string(),
            });
            // Status code stays in the message; the recovery classifier
            // keys on it.
            return Err(Error::DocumentAi(format!(
                "Document AI returned {}: {}",
                status.as_u16(),
                body.message
            )));
        }

        let analyzed: AnalyzedDocument = response
            .json()
            .await
            .map_err(|e| Error::DocumentAi(format!("Failed to parse response: {}", e)))?;

        debug!(
            subsystem = "inference",
            component = "docai",
            op = "analyze",
            field_count = analyzed.form_fields.len(),
            page_count = analyzed.pages.len(),
            "Analysis complete"
        );

        Ok(analyzed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DocAiConfig::default();
        assert_eq!(config.base_url, DEFAULT_DOCAI_URL);
        assert!(config.api_key.is_none());
        assert_eq!(config.timeout_seconds, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_client_creation() {
        let client = DocAiClient::new(DocAiConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_analyzed_document_deserialization() {
        let json = r#"{
            "text": "Invoice total: $120.00",
            "pages": [{"page_number": 1, "text": "Invoice total: $120.00"}],
            "form_fields": [{
                "name": "total",
                "value": "$120.00",
                "field_type": "currency",
                "confidence": 0.97,
                "page": 1,
                "bounding_box": {"x": 10.0, "y": 80.0, "width": 20.0, "height": 3.0}
            }]
        }"#;

        let doc: AnalyzedDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.form_fields.len(), 1);
        assert_eq!(doc.form_fields[0].field_type, "currency");
        assert!(doc.form_fields[0].bounding_box.is_some());
    }

    #[test]
    fn test_analyzed_document_minimal() {
        let json = r#"{"text": "plain text only"}"#;
        let doc: AnalyzedDocument = serde_json::from_str(json).unwrap();
        assert!(doc.pages.is_empty());
        assert!(doc.form_fields.is_empty());
    }

    #[test]
    fn test_analyze_body_serialization() {
        let body = AnalyzeBody {
            raw_document: RawDocument {
                content: "aGVsbG8=".to_string(),
                mime_type: "application/pdf".to_string(),
            },
            pages: Some(PageRange { start: 1, end: 3 }),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("aGVsbG8="));
        assert!(json.contains("application/pdf"));
        assert!(json.contains("\"start\":1"));
    }
}
