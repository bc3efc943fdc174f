//! # docflow-inference
//!
//! External service clients for docflow:
//!
//! - [`openai`]: OpenAI-compatible embedding and generation backend with
//!   SSE streaming support
//! - [`docai`]: document-AI service client for form field detection and OCR
//! - [`pool`]: bounded client pool with global admission control
//! - [`mock`]: deterministic mock backends for tests
//!
//! The trait seams ([`docflow_core::EmbeddingBackend`],
//! [`docflow_core::GenerationBackend`], [`docai::DocumentAiBackend`]) let the
//! pipeline and chat crates swap real clients for mocks.

pub mod docai;
pub mod mock;
pub mod openai;
pub mod pool;

pub use docai::{
    AnalyzeRequest, AnalyzedDocument, DocAiBoundingBox, DocAiClient, DocAiConfig, DocAiFormField,
    DocAiPage, DocumentAiBackend,
};
pub use mock::{cosine_similarity, MockDocAi, MockEmbeddingGenerator, MockInferenceBackend};
pub use openai::{OpenAIBackend, OpenAIConfig, StreamingGeneration, TokenStream};
pub use pool::{PoolGuard, ProcessorPool, ProcessorPoolConfig};
