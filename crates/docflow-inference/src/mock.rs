//! Mock inference backends for deterministic testing.
//!
//! Provides mock implementations of the embedding, generation, and
//! document-AI backends. Embeddings are deterministic functions of the
//! input text, so similarity-based tests are reproducible.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docflow_inference::mock::MockInferenceBackend;
//! use docflow_core::EmbeddingBackend;
//!
//! #[tokio::test]
//! async fn test_with_mock_backend() {
//!     let backend = MockInferenceBackend::new()
//!         .with_dimension(384)
//!         .with_fixed_response("Test response");
//!
//!     let vectors = backend.embed_texts(&["test".to_string()]).await.unwrap();
//!     assert_eq!(vectors[0].len(), 384);
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use docflow_core::{EmbeddingBackend, Error, GenerationBackend, Result};

use crate::docai::{AnalyzeRequest, AnalyzedDocument, DocumentAiBackend};

/// Mock embedding and generation backend.
#[derive(Clone)]
pub struct MockInferenceBackend {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    dimension: usize,
    fixed_responses: HashMap<String, String>,
    default_response: String,
    latency_ms: u64,
    fail_after: Option<usize>,
    failure_message: String,
}

/// A logged backend invocation, for assertions.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub input: String,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            dimension: 384,
            fixed_responses: HashMap::new(),
            default_response: "Mock response".to_string(),
            latency_ms: 0,
            fail_after: None,
            failure_message: "Simulated failure".to_string(),
        }
    }
}

impl MockInferenceBackend {
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        Arc::make_mut(&mut self.config).dimension = dimension;
        self
    }

    /// Set a fixed response for generation requests.
    pub fn with_fixed_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).default_response = response.into();
        self
    }

    /// Add a response mapping for specific prompts.
    pub fn with_response_mapping(
        mut self,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.config)
            .fixed_responses
            .insert(input.into(), output.into());
        self
    }

    /// Set simulated latency for all operations.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// Fail every call after the first `n` succeed. `n = 0` fails all.
    pub fn with_fail_after(mut self, n: usize) -> Self {
        Arc::make_mut(&mut self.config).fail_after = Some(n);
        self
    }

    /// Set the error message used for simulated failures. Useful for
    /// exercising the error classifier.
    pub fn with_failure_message(mut self, message: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).failure_message = message.into();
        self
    }

    /// Get all logged calls.
    pub fn calls(&self) -> Vec<MockCall> {
        self.call_log.lock().unwrap().clone()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        self.call_log.lock().unwrap().clear()
    }

    /// Number of embed calls so far.
    pub fn embed_call_count(&self) -> usize {
        self.call_log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation == "embed")
            .count()
    }

    /// Number of generation calls so far.
    pub fn generate_call_count(&self) -> usize {
        self.call_log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation == "generate")
            .count()
    }

    fn log_call(&self, operation: &str, input: &str) -> usize {
        let mut log = self.call_log.lock().unwrap();
        log.push(MockCall {
            operation: operation.to_string(),
            input: input.to_string(),
        });
        log.len()
    }

    fn should_fail(&self, call_number: usize) -> bool {
        match self.config.fail_after {
            Some(n) => call_number > n,
            None => false,
        }
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.config.latency_ms)).await;
        }
    }
}

impl Default for MockInferenceBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingBackend for MockInferenceBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            let call_number = self.log_call("embed", text);
            self.simulate_latency().await;

            if self.should_fail(call_number) {
                return Err(Error::Embedding(self.config.failure_message.clone()));
            }

            vectors.push(MockEmbeddingGenerator::generate(
                text,
                self.config.dimension,
            ));
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}

#[async_trait]
impl GenerationBackend for MockInferenceBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let call_number = self.log_call("generate", prompt);
        self.simulate_latency().await;

        if self.should_fail(call_number) {
            return Err(Error::Inference(self.config.failure_message.clone()));
        }

        if let Some(response) = self.config.fixed_responses.get(prompt) {
            return Ok(response.clone());
        }

        Ok(self.config.default_response.clone())
    }

    async fn generate_with_system(&self, _system: &str, prompt: &str) -> Result<String> {
        self.generate(prompt).await
    }
}

/// Deterministic embedding generator.
pub struct MockEmbeddingGenerator;

impl MockEmbeddingGenerator {
    /// Generate a deterministic embedding from text.
    ///
    /// Uses character-based hashing for reproducibility. The same text
    /// always produces the same normalized vector, and similar texts
    /// produce similar vectors.
    pub fn generate(text: &str, dimension: usize) -> Vec<f32> {
        let mut vec = vec![0.0; dimension];

        for (i, c) in text.chars().enumerate() {
            let idx = (c as usize + i) % dimension;
            vec[idx] += 0.1;
        }

        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vec {
                *v /= norm;
            }
        }

        vec
    }
}

/// Cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Scripted outcome for one mock document-AI analysis.
#[derive(Clone)]
enum DocAiScript {
    Succeed(AnalyzedDocument),
    Fail(String),
}

/// Mock document-AI backend with scripted responses.
#[derive(Clone, Default)]
pub struct MockDocAi {
    scripts: Arc<Mutex<Vec<DocAiScript>>>,
    fallback: Arc<Mutex<Option<AnalyzedDocument>>>,
    call_log: Arc<Mutex<Vec<String>>>,
}

impl MockDocAi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful analysis result. Scripted outcomes are consumed
    /// in order; after they run out the fallback (or an error) applies.
    pub fn push_success(&self, doc: AnalyzedDocument) {
        self.scripts.lock().unwrap().push(DocAiScript::Succeed(doc));
    }

    /// Queue a failure with the given message.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.scripts
            .lock()
            .unwrap()
            .push(DocAiScript::Fail(message.into()));
    }

    /// Set a result returned once scripted outcomes are exhausted.
    pub fn set_fallback(&self, doc: AnalyzedDocument) {
        *self.fallback.lock().unwrap() = Some(doc);
    }

    /// Processor types requested so far.
    pub fn requested_processors(&self) -> Vec<String> {
        self.call_log.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }
}

#[async_trait]
impl DocumentAiBackend for MockDocAi {
    async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalyzedDocument> {
        self.call_log
            .lock()
            .unwrap()
            .push(request.processor_type.clone());

        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                None
            } else {
                Some(scripts.remove(0))
            }
        };

        match script {
            Some(DocAiScript::Succeed(doc)) => Ok(doc),
            Some(DocAiScript::Fail(message)) => Err(Error::DocumentAi(message)),
            None => match self.fallback.lock().unwrap().clone() {
                Some(doc) => Ok(doc),
                None => Err(Error::DocumentAi(
                    "Document AI returned 503: no scripted response".to_string(),
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deterministic_embeddings() {
        let backend = MockInferenceBackend::new().with_dimension(64);

        let a = backend
            .embed_texts(&["hello world".to_string()])
            .await
            .unwrap();
        let b = backend
            .embed_texts(&["hello world".to_string()])
            .await
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(a[0].len(), 64);
    }

    #[tokio::test]
    async fn test_embeddings_are_normalized() {
        let vectors = MockInferenceBackend::new()
            .embed_texts(&["normalize me".to_string()])
            .await
            .unwrap();

        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_similar_texts_score_higher() {
        let backend = MockInferenceBackend::new().with_dimension(128);
        let vectors = backend
            .embed_texts(&[
                "the invoice total is due".to_string(),
                "the invoice total is paid".to_string(),
                "zebra quantum xylophone".to_string(),
            ])
            .await
            .unwrap();

        let close = cosine_similarity(&vectors[0], &vectors[1]);
        let far = cosine_similarity(&vectors[0], &vectors[2]);
        assert!(close > far);
    }

    #[tokio::test]
    async fn test_fail_after_threshold() {
        let backend = MockInferenceBackend::new()
            .with_fail_after(2)
            .with_failure_message("Network connection refused");

        assert!(backend.embed_texts(&["one".to_string()]).await.is_ok());
        assert!(backend.embed_texts(&["two".to_string()]).await.is_ok());

        let err = backend
            .embed_texts(&["three".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Network connection refused"));
    }

    #[tokio::test]
    async fn test_response_mapping() {
        let backend = MockInferenceBackend::new()
            .with_fixed_response("default")
            .with_response_mapping("special", "mapped");

        assert_eq!(backend.generate("special").await.unwrap(), "mapped");
        assert_eq!(backend.generate("anything else").await.unwrap(), "default");
        assert_eq!(backend.generate_call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_docai_scripted_outcomes() {
        let docai = MockDocAi::new();
        docai.push_failure("Document AI returned 429: rate limited");
        docai.push_success(AnalyzedDocument {
            text: "recovered".to_string(),
            pages: vec![],
            form_fields: vec![],
        });

        let request = AnalyzeRequest {
            content: b"%PDF-1.4".to_vec(),
            mime_type: "application/pdf".to_string(),
            processor_type: "form-parser".to_string(),
            pages: None,
        };

        let err = docai.analyze(request.clone()).await.unwrap_err();
        assert!(err.to_string().contains("429"));

        let doc = docai.analyze(request).await.unwrap();
        assert_eq!(doc.text, "recovered");
        assert_eq!(docai.call_count(), 2);
    }
}
