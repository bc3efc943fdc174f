//! Wire format for OpenAI-compatible embedding and chat endpoints.
//!
//! These structs mirror the JSON bodies exchanged with the configured
//! inference service. Field names follow the wire, not this codebase;
//! the persisted chat model (ids, citations, timestamps) lives in
//! docflow-core and never crosses this boundary.

use serde::{Deserialize, Serialize};

/// Body for `POST /embeddings`.
#[derive(Debug, Serialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding_format: Option<String>,
}

impl EmbeddingRequest {
    /// Batch request in float encoding, the representation the chunk
    /// index stores.
    pub fn batch(model: impl Into<String>, input: Vec<String>) -> Self {
        Self {
            model: model.into(),
            input,
            encoding_format: Some("float".to_string()),
        }
    }
}

/// Body returned by `POST /embeddings`.
#[derive(Debug, Deserialize)]
pub struct EmbeddingResponse {
    pub data: Vec<EmbeddingVector>,
    pub model: String,
    pub usage: TokenUsage,
}

impl EmbeddingResponse {
    /// Vectors in input order. The service may return them out of
    /// order; each carries its batch position.
    pub fn vectors_in_input_order(self) -> Vec<Vec<f32>> {
        let mut data = self.data;
        data.sort_by_key(|v| v.index);
        data.into_iter().map(|v| v.embedding).collect()
    }
}

/// One embedding vector tagged with its position in the input batch.
#[derive(Debug, Deserialize)]
pub struct EmbeddingVector {
    pub embedding: Vec<f32>,
    pub index: usize,
}

/// Body for `POST /chat/completions`.
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatTurn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatTurn>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            stream: false,
        }
    }

    /// Request token-by-token delivery instead of a single body.
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// A single wire-format chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Body returned by `POST /chat/completions`.
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Option<TokenUsage>,
}

impl ChatResponse {
    /// Content of the first choice; empty when the service returned none.
    pub fn first_content(self) -> String {
        self.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default()
    }
}

/// Single completion choice.
#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub index: usize,
    pub message: ChatTurn,
    pub finish_reason: Option<String>,
}

/// Token accounting. Embedding responses omit `completion_tokens`.
#[derive(Debug, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: Option<u32>,
    pub total_tokens: u32,
}

/// Error envelope carried on non-2xx statuses.
#[derive(Debug, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error: ApiError,
}

impl ApiErrorEnvelope {
    /// Fallback for when the error body itself fails to parse.
    pub fn unparseable() -> Self {
        Self {
            error: ApiError {
                message: "Unknown error".to_string(),
                error_type: "unknown".to_string(),
                code: None,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: Option<String>,
}
