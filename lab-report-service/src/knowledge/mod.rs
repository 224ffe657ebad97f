//! Domain-knowledge snippets injected into analysis prompts.

pub mod retrieval;
pub mod store;

pub use retrieval::{KnowledgeRetriever, format_for_prompt};
pub use store::{KnowledgeStore, NewChunk, default_chunks};
