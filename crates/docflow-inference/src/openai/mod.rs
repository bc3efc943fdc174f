//! OpenAI-compatible inference backend.
//!
//! Works with any OpenAI-compatible API endpoint: the OpenAI cloud API,
//! Azure OpenAI, Ollama in compatibility mode, vLLM, LocalAI, LM Studio.
//!
//! # Example
//!
//! ```rust,no_run
//! use docflow_inference::openai::{OpenAIBackend, OpenAIConfig};
//! use docflow_core::EmbeddingBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OpenAIBackend::from_env().unwrap();
//!
//!     let texts = vec!["Invoice total: $120.00".to_string()];
//!     let vectors = backend.embed_texts(&texts).await.unwrap();
//!     assert_eq!(vectors.len(), 1);
//! }
//! ```

mod backend;
mod streaming;
mod types;

pub use backend::{OpenAIBackend, OpenAIConfig, DEFAULT_OPENAI_URL, DEFAULT_TIMEOUT_SECS};
pub use streaming::{decode_token_stream, SseDecoder, StreamingGeneration, TokenStream};
pub use types::*;
