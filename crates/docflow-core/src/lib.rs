//! # docflow-core
//!
//! Core types, traits, and abstractions for the docflow document-processing
//! system.
//!
//! This crate provides the foundational data structures and trait definitions
//! that other docflow crates depend on.

pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod mime;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{EventBus, ServerEvent};
pub use mime::{detect_content_type, is_processable};
pub use models::*;
pub use traits::*;
pub use uuid_utils::{extract_timestamp, is_v7, new_v7};
