//! LLM abstraction and the Anthropic Messages client.
//!
//! The dispatcher only needs one-shot completion: a system prompt plus the conversation so far.

mod anthropic;

use async_trait::async_trait;

use crate::session::ChatMessage;

pub use anthropic::AnthropicClient;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("llm api error: {0}")]
    Api(String),
}

/// A hosted model that turns a conversation into the next assistant message.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Return the raw text of the assistant's reply.
    async fn complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String, LlmError>;
}
