pub mod client;
pub mod resolver;

pub use client::{ContentPart, GenerativeModel, ModelRequest, OpenRouterClient, classify_failure};
pub use resolver::{ModelReply, ModelResolver};
