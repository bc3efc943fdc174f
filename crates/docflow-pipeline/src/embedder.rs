//! Rate-limited batch embedding of chunks.
//!
//! Batches run strictly sequentially with a fixed inter-batch delay to
//! respect the external API's rate limits. What happens when a batch
//! fails is a deliberate, configurable choice: fail the whole job
//! (default), or degrade to zero vectors and mark the affected chunks.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, warn};

use docflow_core::defaults;
use docflow_core::{Chunk, EmbeddingBackend, Error, Result};

/// What to do when one embedding batch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbedFailurePolicy {
    /// Propagate the error and fail the processing job.
    #[default]
    FailJob,
    /// Substitute zero vectors for the failed batch and continue. The
    /// affected chunks are marked `embedding_degraded` in metadata so the
    /// degradation is visible downstream.
    ZeroFill,
}

impl EmbedFailurePolicy {
    /// Read from `EMBED_FAILURE_POLICY`. Anything other than `zero_fill`
    /// means fail-job.
    pub fn from_env() -> Self {
        match std::env::var("EMBED_FAILURE_POLICY").as_deref() {
            Ok("zero_fill") => EmbedFailurePolicy::ZeroFill,
            _ => EmbedFailurePolicy::FailJob,
        }
    }
}

/// Configuration for [`EmbeddingGenerator`].
#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    /// Chunk texts per API call.
    pub batch_size: usize,
    /// Delay between consecutive batches.
    pub batch_delay: Duration,
    pub failure_policy: EmbedFailurePolicy,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::EMBED_BATCH_SIZE,
            batch_delay: Duration::from_millis(defaults::EMBED_BATCH_DELAY_MS),
            failure_policy: EmbedFailurePolicy::default(),
        }
    }
}

impl EmbedderConfig {
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            batch_size: std::env::var("EMBED_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(base.batch_size),
            batch_delay: std::env::var("EMBED_BATCH_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(base.batch_delay),
            failure_policy: EmbedFailurePolicy::from_env(),
        }
    }
}

/// Sequentially batches chunk texts through an embedding backend.
pub struct EmbeddingGenerator {
    backend: Arc<dyn EmbeddingBackend>,
    config: EmbedderConfig,
}

impl EmbeddingGenerator {
    pub fn new(backend: Arc<dyn EmbeddingBackend>) -> Self {
        Self {
            backend,
            config: EmbedderConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EmbedderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn dimension(&self) -> usize {
        self.backend.dimension()
    }

    /// Embed a single query text, bypassing batching.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.backend.embed_texts(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::Embedding("backend returned no vector".to_string()))
    }

    /// Fill in embeddings for a chunk set.
    ///
    /// Batches run one after another, never in parallel. Returns the
    /// number of degraded chunks (always 0 under the fail-job policy).
    pub async fn embed_chunks(&self, chunks: &mut [Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let total_batches = chunks.len().div_ceil(self.config.batch_size);
        let mut degraded = 0;

        for (batch_number, batch) in chunks.chunks_mut(self.config.batch_size).enumerate() {
            if batch_number > 0 {
                tokio::time::sleep(self.config.batch_delay).await;
            }

            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            debug!(
                subsystem = "pipeline",
                component = "embedder",
                op = "embed_batch",
                batch = batch_number + 1,
                total_batches,
                batch_size = texts.len(),
                "Embedding batch"
            );

            match self.backend.embed_texts(&texts).await {
                Ok(vectors) => {
                    if vectors.len() != batch.len() {
                        return Err(Error::Embedding(format!(
                            "backend returned {} vectors for {} texts",
                            vectors.len(),
                            batch.len()
                        )));
                    }
                    for (chunk, vector) in batch.iter_mut().zip(vectors) {
                        chunk.embedding = vector;
                    }
                }
                Err(error) => match self.config.failure_policy {
                    EmbedFailurePolicy::FailJob => {
                        warn!(
                            subsystem = "pipeline",
                            component = "embedder",
                            batch = batch_number + 1,
                            error = %error,
                            "Embedding batch failed, failing job"
                        );
                        return Err(error);
                    }
                    EmbedFailurePolicy::ZeroFill => {
                        warn!(
                            subsystem = "pipeline",
                            component = "embedder",
                            batch = batch_number + 1,
                            chunk_count = batch.len(),
                            error = %error,
                            "Embedding batch failed, zero-filling"
                        );
                        let dimension = self.backend.dimension();
                        for chunk in batch.iter_mut() {
                            chunk.embedding = vec![0.0; dimension];
                            if let Some(map) = chunk.metadata.as_object_mut() {
                                map.insert("embedding_degraded".to_string(), json!(true));
                            } else {
                                chunk.metadata = json!({ "embedding_degraded": true });
                            }
                            degraded += 1;
                        }
                    }
                },
            }
        }

        info!(
            subsystem = "pipeline",
            component = "embedder",
            chunk_count = chunks.len(),
            degraded,
            "Embedding complete"
        );
        Ok(degraded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_inference::mock::MockInferenceBackend;
    use serde_json::json;
    use uuid::Uuid;

    fn chunks(n: usize) -> Vec<Chunk> {
        let document_id = Uuid::new_v4();
        (0..n)
            .map(|i| Chunk {
                id: Uuid::new_v4(),
                document_id,
                chunk_index: i as i32,
                text: format!("chunk text {}", i),
                embedding: Vec::new(),
                page_number: None,
                metadata: json!({}),
            })
            .collect()
    }

    fn generator(backend: MockInferenceBackend, policy: EmbedFailurePolicy) -> EmbeddingGenerator {
        EmbeddingGenerator::new(Arc::new(backend)).with_config(EmbedderConfig {
            batch_size: 4,
            batch_delay: Duration::from_millis(0),
            failure_policy: policy,
        })
    }

    #[tokio::test]
    async fn test_embeds_all_chunks_in_order() {
        let backend = MockInferenceBackend::new().with_dimension(32);
        let generator = generator(backend.clone(), EmbedFailurePolicy::FailJob);

        let mut set = chunks(10);
        let degraded = generator.embed_chunks(&mut set).await.unwrap();

        assert_eq!(degraded, 0);
        for chunk in &set {
            assert_eq!(chunk.embedding.len(), 32);
        }
        // 10 texts through the backend, batched 4/4/2.
        assert_eq!(backend.embed_call_count(), 10);
    }

    #[tokio::test]
    async fn test_fail_job_policy_propagates() {
        let backend = MockInferenceBackend::new()
            .with_fail_after(4)
            .with_failure_message("OpenAI returned 429: rate limit");
        let generator = generator(backend, EmbedFailurePolicy::FailJob);

        let mut set = chunks(10);
        let err = generator.embed_chunks(&mut set).await.unwrap_err();
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn test_zero_fill_policy_degrades_and_continues() {
        // First batch of 4 succeeds, second fails, third succeeds.
        let backend = MockInferenceBackend::new()
            .with_dimension(16)
            .with_fail_after(4)
            .with_failure_message("connection reset");
        let generator = generator(backend, EmbedFailurePolicy::ZeroFill);

        let mut set = chunks(10);
        let degraded = generator.embed_chunks(&mut set).await.unwrap();

        // The mock fails every call after the fourth, so batches two and
        // three both degrade.
        assert_eq!(degraded, 6);
        for chunk in &set[0..4] {
            assert!(chunk.embedding.iter().any(|v| *v != 0.0));
            assert!(chunk.metadata.get("embedding_degraded").is_none());
        }
        for chunk in &set[4..10] {
            assert!(chunk.embedding.iter().all(|v| *v == 0.0));
            assert_eq!(chunk.metadata["embedding_degraded"], json!(true));
        }
    }

    #[tokio::test]
    async fn test_embed_query_single_vector() {
        let backend = MockInferenceBackend::new().with_dimension(8);
        let generator = EmbeddingGenerator::new(Arc::new(backend));
        let vector = generator.embed_query("what is the total?").await.unwrap();
        assert_eq!(vector.len(), 8);
    }

    #[tokio::test]
    async fn test_empty_chunk_set() {
        let generator = EmbeddingGenerator::new(Arc::new(MockInferenceBackend::new()));
        let mut set: Vec<Chunk> = Vec::new();
        assert_eq!(generator.embed_chunks(&mut set).await.unwrap(), 0);
    }

    #[test]
    fn test_policy_from_env_default() {
        std::env::remove_var("EMBED_FAILURE_POLICY");
        assert_eq!(EmbedFailurePolicy::from_env(), EmbedFailurePolicy::FailJob);
    }
}
