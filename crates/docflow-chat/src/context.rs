//! Citation context assembly for retrieval-augmented chat.
//!
//! Retrieved chunks become a numbered context block; the numbering is the
//! citation contract: position `n` in the block is citation `n` in the
//! assistant message, 1-indexed.

use docflow_core::{ChatMessage, ChunkHit, Citation};

/// System prompt instructing the model to cite by context number.
pub const SYSTEM_PROMPT: &str = "You are a document assistant. Answer the user's question using \
only the numbered context passages provided. Cite the passages you relied on by number, like [1] \
or [2]. If the context does not contain the answer, say so instead of guessing.";

/// Placeholder context when retrieval finds nothing.
pub const EMPTY_CONTEXT: &str = "(no relevant document content was found)";

/// Build the numbered context block and the citation list from ranked hits.
///
/// Hits are used in the order given; the repository contract already sorts
/// by similarity descending with chunk_index breaking ties.
pub fn build_context(hits: &[ChunkHit]) -> (String, Vec<Citation>) {
    if hits.is_empty() {
        return (EMPTY_CONTEXT.to_string(), Vec::new());
    }

    let mut context = String::new();
    let mut citations = Vec::with_capacity(hits.len());

    for (position, hit) in hits.iter().enumerate() {
        let number = position + 1;
        match hit.chunk.page_number {
            Some(page) => {
                context.push_str(&format!("[{}] {} [page {}]\n", number, hit.chunk.text, page));
            }
            None => {
                context.push_str(&format!("[{}] {}\n", number, hit.chunk.text));
            }
        }
        citations.push(Citation {
            source_text: hit.chunk.text.clone(),
            page_number: hit.chunk.page_number,
            relevance_score: hit.similarity,
            chunk_index: hit.chunk.chunk_index,
        });
    }

    (context, citations)
}

/// Render the full generation prompt: context, conversation history, then
/// the current question.
pub fn build_prompt(context: &str, history: &[ChatMessage], query: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str("Context:\n");
    prompt.push_str(context);
    prompt.push('\n');

    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        for message in history {
            prompt.push_str(message.role.as_str());
            prompt.push_str(": ");
            prompt.push_str(&message.content);
            prompt.push('\n');
        }
        prompt.push('\n');
    }

    prompt.push_str("Question: ");
    prompt.push_str(query);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use docflow_core::{Chunk, MessageRole};
    use serde_json::json;
    use uuid::Uuid;

    fn hit(text: &str, similarity: f32, chunk_index: i32, page: Option<i32>) -> ChunkHit {
        ChunkHit {
            chunk: Chunk {
                id: Uuid::new_v4(),
                document_id: Uuid::new_v4(),
                chunk_index,
                text: text.to_string(),
                embedding: Vec::new(),
                page_number: page,
                metadata: json!({}),
            },
            similarity,
        }
    }

    #[test]
    fn test_numbering_matches_citation_position() {
        let hits = vec![
            hit("first passage", 0.9, 3, Some(2)),
            hit("second passage", 0.7, 0, None),
        ];
        let (context, citations) = build_context(&hits);

        assert!(context.contains("[1] first passage [page 2]"));
        assert!(context.contains("[2] second passage"));
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].source_text, "first passage");
        assert_eq!(citations[0].relevance_score, 0.9);
        assert_eq!(citations[0].page_number, Some(2));
        assert_eq!(citations[1].chunk_index, 0);
    }

    #[test]
    fn test_empty_hits_yield_placeholder() {
        let (context, citations) = build_context(&[]);
        assert_eq!(context, EMPTY_CONTEXT);
        assert!(citations.is_empty());
    }

    #[test]
    fn test_prompt_includes_history_in_order() {
        let session_id = Uuid::new_v4();
        let history = vec![
            ChatMessage {
                id: Uuid::new_v4(),
                session_id,
                role: MessageRole::User,
                content: "What is the total?".to_string(),
                citations: Vec::new(),
                created_at: Utc::now(),
            },
            ChatMessage {
                id: Uuid::new_v4(),
                session_id,
                role: MessageRole::Assistant,
                content: "The total is $42 [1].".to_string(),
                citations: Vec::new(),
                created_at: Utc::now(),
            },
        ];

        let prompt = build_prompt("[1] invoice total: $42\n", &history, "Which page was that on?");
        let user_pos = prompt.find("user: What is the total?").unwrap();
        let assistant_pos = prompt.find("assistant: The total is $42 [1].").unwrap();
        assert!(user_pos < assistant_pos);
        assert!(prompt.ends_with("Question: Which page was that on?"));
    }

    #[test]
    fn test_prompt_without_history() {
        let prompt = build_prompt(EMPTY_CONTEXT, &[], "hello");
        assert!(!prompt.contains("Conversation so far"));
        assert!(prompt.starts_with("Context:\n"));
    }
}
