//! The model capability the agent drives.

use async_trait::async_trait;
use futures::stream::BoxStream;

use skillbot_tools::ToolDefinition;
use skillbot_types::{ConversationState, ModelReply, Turn};

use crate::error::ModelError;

/// Lazy, finite stream of text chunks. Dropping it stops generation.
pub type TextStream = BoxStream<'static, Result<String, ModelError>>;

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier, for logs.
    fn id(&self) -> &str;

    /// One reasoning step: a final answer or a single tool request.
    async fn respond(
        &self,
        state: &ConversationState,
        tools: &[ToolDefinition],
    ) -> Result<ModelReply, ModelError>;

    /// Plain text generation without tools, streamed chunk by chunk.
    async fn stream(&self, turns: Vec<Turn>) -> Result<TextStream, ModelError>;
}
