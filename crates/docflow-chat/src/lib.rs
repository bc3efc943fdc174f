//! # docflow-chat
//!
//! Citation-aware retrieval-augmented chat over processed documents.
//!
//! A chat turn embeds the user's query, retrieves the most similar chunks
//! from the document's index, and generates an answer grounded in a
//! numbered citation context. Responses can be streamed token-by-token
//! while the full message accumulates for persistence.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use docflow_chat::ChatService;
//!
//! let service = ChatService::new(chat_repo, chunk_repo, embedder, backend, events);
//! let reply = service.ask(document_id, "user-1", "What is the total?", None).await?;
//! for citation in &reply.citations {
//!     println!("[{}] p{:?}", citation.chunk_index, citation.page_number);
//! }
//! ```

pub mod context;
pub mod service;

// Re-export core types
pub use docflow_core::*;

pub use context::{build_context, build_prompt, SYSTEM_PROMPT};
pub use service::{ChatConfig, ChatService};
