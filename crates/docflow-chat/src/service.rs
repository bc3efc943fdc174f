//! Retrieval-augmented chat over a processed document.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use docflow_core::defaults;
use docflow_core::uuid_utils::new_v7;
use docflow_core::{
    ChatMessage, ChatRepository, ChunkRepository, EventBus, GenerationBackend, MessageRole,
    Result, ServerEvent,
};
use docflow_inference::StreamingGeneration;
use docflow_pipeline::EmbeddingGenerator;
use uuid::Uuid;

use crate::context::{build_context, build_prompt, SYSTEM_PROMPT};

/// Configuration for [`ChatService`].
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Chunks retrieved as context per turn.
    pub top_k: usize,
    /// Prior messages included in the prompt.
    pub history_limit: i64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            top_k: defaults::CHAT_TOP_K,
            history_limit: defaults::CHAT_HISTORY_LIMIT,
        }
    }
}

/// Answers questions about a document using its indexed chunks.
///
/// Each turn embeds the query, retrieves the top-k most similar chunks,
/// and generates an answer grounded in a numbered citation context. Both
/// the user message and the assistant reply are persisted; citations are
/// attached to assistant messages only.
pub struct ChatService {
    chat: Arc<dyn ChatRepository>,
    chunks: Arc<dyn ChunkRepository>,
    embedder: Arc<EmbeddingGenerator>,
    generator: Arc<dyn GenerationBackend>,
    streamer: Option<Arc<dyn StreamingGeneration>>,
    events: EventBus,
    config: ChatConfig,
}

impl ChatService {
    pub fn new(
        chat: Arc<dyn ChatRepository>,
        chunks: Arc<dyn ChunkRepository>,
        embedder: Arc<EmbeddingGenerator>,
        generator: Arc<dyn GenerationBackend>,
        events: EventBus,
    ) -> Self {
        Self {
            chat,
            chunks,
            embedder,
            generator,
            streamer: None,
            events,
            config: ChatConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ChatConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable token streaming through a streaming-capable backend.
    pub fn with_streaming(mut self, streamer: Arc<dyn StreamingGeneration>) -> Self {
        self.streamer = Some(streamer);
        self
    }

    /// Answer a query about a document.
    ///
    /// When `tokens` is provided, generated tokens are forwarded to it as
    /// they arrive while the full response accumulates; a dropped receiver
    /// stops forwarding but never fails the turn. The persisted assistant
    /// message is returned once generation completes.
    pub async fn ask(
        &self,
        document_id: Uuid,
        user_id: &str,
        query: &str,
        tokens: Option<mpsc::Sender<String>>,
    ) -> Result<ChatMessage> {
        let session = self.chat.get_or_create_session(document_id, user_id).await?;
        let history = self
            .chat
            .recent_messages(session.id, self.config.history_limit)
            .await?;

        let query_embedding = self.embedder.embed_query(query).await?;
        let hits = self
            .chunks
            .search(document_id, &query_embedding, self.config.top_k)
            .await?;
        debug!(
            subsystem = "chat",
            op = "ask",
            session_id = %session.id,
            document_id = %document_id,
            hit_count = hits.len(),
            "Retrieved context"
        );

        let (context, citations) = build_context(&hits);
        let prompt = build_prompt(&context, &history, query);

        let content = self.generate(&prompt, tokens).await?;

        let user_message = ChatMessage {
            id: new_v7(),
            session_id: session.id,
            role: MessageRole::User,
            content: query.to_string(),
            citations: Vec::new(),
            created_at: Utc::now(),
        };
        self.chat.add_message(user_message).await?;

        let assistant_message = ChatMessage {
            id: new_v7(),
            session_id: session.id,
            role: MessageRole::Assistant,
            content,
            citations,
            created_at: Utc::now(),
        };
        self.chat.add_message(assistant_message.clone()).await?;

        self.events.emit(ServerEvent::ChatMessage {
            session_id: session.id,
            document_id,
            message_id: assistant_message.id,
        });
        info!(
            subsystem = "chat",
            op = "ask",
            session_id = %session.id,
            document_id = %document_id,
            citation_count = assistant_message.citations.len(),
            "Chat turn complete"
        );

        Ok(assistant_message)
    }

    /// Generate the response, streaming tokens out when possible.
    async fn generate(&self, prompt: &str, tokens: Option<mpsc::Sender<String>>) -> Result<String> {
        match (&self.streamer, tokens) {
            (Some(streamer), Some(tx)) => {
                let mut stream = streamer
                    .generate_with_system_stream(SYSTEM_PROMPT, prompt)
                    .await?;
                let mut content = String::new();
                let mut forward = true;
                while let Some(token) = stream.next().await {
                    let token = token?;
                    content.push_str(&token);
                    if forward && tx.send(token).await.is_err() {
                        // Receiver gone; keep accumulating for persistence.
                        warn!(subsystem = "chat", "Token receiver dropped mid-stream");
                        forward = false;
                    }
                }
                Ok(content)
            }
            (None, Some(tx)) => {
                let content = self
                    .generator
                    .generate_with_system(SYSTEM_PROMPT, prompt)
                    .await?;
                let _ = tx.send(content.clone()).await;
                Ok(content)
            }
            (_, None) => {
                self.generator
                    .generate_with_system(SYSTEM_PROMPT, prompt)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docflow_core::Chunk;
    use docflow_db::memory::{MemoryChatRepository, MemoryChunkRepository};
    use docflow_inference::mock::{MockEmbeddingGenerator, MockInferenceBackend};
    use docflow_inference::TokenStream;
    use serde_json::json;

    const DIMENSION: usize = 384;

    async fn seed_chunks(repo: &MemoryChunkRepository, document_id: Uuid, texts: &[&str]) {
        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| Chunk {
                id: Uuid::new_v4(),
                document_id,
                chunk_index: i as i32,
                text: text.to_string(),
                embedding: MockEmbeddingGenerator::generate(text, DIMENSION),
                page_number: Some(i as i32 + 1),
                metadata: json!({}),
            })
            .collect();
        repo.replace_for_document(document_id, chunks).await.unwrap();
    }

    fn service(
        chat: MemoryChatRepository,
        chunks: MemoryChunkRepository,
        backend: MockInferenceBackend,
    ) -> ChatService {
        let backend = Arc::new(backend);
        ChatService::new(
            Arc::new(chat),
            Arc::new(chunks),
            Arc::new(EmbeddingGenerator::new(backend.clone())),
            backend,
            EventBus::default(),
        )
    }

    #[tokio::test]
    async fn test_turn_persists_user_then_assistant() {
        let chat = MemoryChatRepository::new();
        let chunks = MemoryChunkRepository::new();
        let document_id = Uuid::new_v4();
        seed_chunks(&chunks, document_id, &["alpha text", "beta text"]).await;

        let backend = MockInferenceBackend::new().with_fixed_response("Answer [1].");
        let service = service(chat.clone(), chunks, backend);

        let reply = service
            .ask(document_id, "user-1", "what is alpha?", None)
            .await
            .unwrap();

        assert_eq!(reply.role, MessageRole::Assistant);
        assert_eq!(reply.content, "Answer [1].");

        let session = chat
            .get_or_create_session(document_id, "user-1")
            .await
            .unwrap();
        let messages = chat.recent_messages(session.id, 10).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert!(messages[0].citations.is_empty());
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert!(!messages[1].citations.is_empty());
    }

    #[tokio::test]
    async fn test_session_reused_across_turns() {
        let chat = MemoryChatRepository::new();
        let chunks = MemoryChunkRepository::new();
        let document_id = Uuid::new_v4();
        seed_chunks(&chunks, document_id, &["some text"]).await;

        let service = service(chat.clone(), chunks, MockInferenceBackend::new());
        service
            .ask(document_id, "user-1", "first question", None)
            .await
            .unwrap();
        service
            .ask(document_id, "user-1", "second question", None)
            .await
            .unwrap();

        let session = chat
            .get_or_create_session(document_id, "user-1")
            .await
            .unwrap();
        let messages = chat.recent_messages(session.id, 10).await.unwrap();
        // Two turns accumulate in one session, user/assistant alternating.
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[2].role, MessageRole::User);
        assert_eq!(messages[3].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn test_citations_ranked_by_relevance() {
        let chat = MemoryChatRepository::new();
        let chunks = MemoryChunkRepository::new();
        let document_id = Uuid::new_v4();
        seed_chunks(
            &chunks,
            document_id,
            &[
                "the quarterly revenue was strong",
                "employee parking policy details",
                "revenue grew over the quarter",
            ],
        )
        .await;

        let service = service(chat.clone(), chunks, MockInferenceBackend::new());
        let reply = service
            .ask(
                document_id,
                "user-1",
                "the quarterly revenue was strong",
                None,
            )
            .await
            .unwrap();

        assert!(!reply.citations.is_empty());
        // Exact text match ranks first with similarity ~1.
        assert_eq!(reply.citations[0].source_text, "the quarterly revenue was strong");
        for pair in reply.citations.windows(2) {
            assert!(pair[0].relevance_score >= pair[1].relevance_score);
        }
    }

    #[tokio::test]
    async fn test_prompt_carries_numbered_context_and_history() {
        let chat = MemoryChatRepository::new();
        let chunks = MemoryChunkRepository::new();
        let document_id = Uuid::new_v4();
        seed_chunks(&chunks, document_id, &["first chunk", "second chunk"]).await;

        let backend = MockInferenceBackend::new().with_fixed_response("The answer.");
        let service = service(chat.clone(), chunks, backend.clone());

        service
            .ask(document_id, "user-1", "question one", None)
            .await
            .unwrap();
        service
            .ask(document_id, "user-1", "question two", None)
            .await
            .unwrap();

        let calls = backend.calls();
        let last_prompt = &calls
            .iter()
            .filter(|c| c.operation == "generate")
            .next_back()
            .unwrap()
            .input;
        assert!(last_prompt.contains("[1] "));
        assert!(last_prompt.contains("[2] "));
        assert!(last_prompt.contains("user: question one"));
        assert!(last_prompt.contains("assistant: The answer."));
        assert!(last_prompt.contains("Question: question two"));
    }

    #[tokio::test]
    async fn test_empty_document_yields_no_citations() {
        let chat = MemoryChatRepository::new();
        let chunks = MemoryChunkRepository::new();
        let document_id = Uuid::new_v4();

        let service = service(chat, chunks, MockInferenceBackend::new());
        let reply = service
            .ask(document_id, "user-1", "anything here?", None)
            .await
            .unwrap();
        assert!(reply.citations.is_empty());
    }

    #[tokio::test]
    async fn test_tokens_forwarded_without_streamer() {
        let chat = MemoryChatRepository::new();
        let chunks = MemoryChunkRepository::new();
        let document_id = Uuid::new_v4();
        seed_chunks(&chunks, document_id, &["text"]).await;

        let backend = MockInferenceBackend::new().with_fixed_response("whole response");
        let service = service(chat, chunks, backend);

        let (tx, mut rx) = mpsc::channel(8);
        let reply = service
            .ask(document_id, "user-1", "q", Some(tx))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), "whole response");
        assert!(rx.recv().await.is_none());
        assert_eq!(reply.content, "whole response");
    }

    struct ScriptedStreamer {
        tokens: Vec<&'static str>,
    }

    #[async_trait]
    impl StreamingGeneration for ScriptedStreamer {
        async fn generate_stream(&self, _prompt: &str) -> Result<TokenStream> {
            let tokens: Vec<Result<String>> =
                self.tokens.iter().map(|t| Ok(t.to_string())).collect();
            Ok(Box::pin(futures::stream::iter(tokens)))
        }

        async fn generate_with_system_stream(
            &self,
            _system: &str,
            prompt: &str,
        ) -> Result<TokenStream> {
            self.generate_stream(prompt).await
        }
    }

    #[tokio::test]
    async fn test_streaming_accumulates_full_response() {
        let chat = MemoryChatRepository::new();
        let chunks = MemoryChunkRepository::new();
        let document_id = Uuid::new_v4();
        seed_chunks(&chunks, document_id, &["text"]).await;

        let service = service(chat.clone(), chunks, MockInferenceBackend::new())
            .with_streaming(Arc::new(ScriptedStreamer {
                tokens: vec!["Hel", "lo ", "world"],
            }));

        let (tx, mut rx) = mpsc::channel(8);
        let reply = service
            .ask(document_id, "user-1", "q", Some(tx))
            .await
            .unwrap();

        let mut streamed = String::new();
        while let Some(token) = rx.recv().await {
            streamed.push_str(&token);
        }
        assert_eq!(streamed, "Hello world");
        assert_eq!(reply.content, "Hello world");

        // The persisted assistant message matches the accumulated stream.
        let session = chat
            .get_or_create_session(document_id, "user-1")
            .await
            .unwrap();
        let messages = chat.recent_messages(session.id, 10).await.unwrap();
        assert_eq!(messages[1].content, "Hello world");
    }
}
