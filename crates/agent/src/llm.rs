use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::messages::ChatMessage;

/// One function call the model requested. `arguments` is the raw JSON text as
/// emitted by the provider; parsing happens at dispatch time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSchema>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CompletionResponse {
    Text(String),
    ToolCalls(Vec<ToolCallRequest>),
}

/// Provider-agnostic completion seam. The concrete provider client lives
/// outside this crate and is injected.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}

/// Stand-in client for deployments where no provider has been wired yet.
#[derive(Default)]
pub struct NoopCompletionClient;

#[async_trait]
impl CompletionClient for NoopCompletionClient {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse> {
        Ok(CompletionResponse::Text(
            "No completion provider is configured for this deployment.".to_owned(),
        ))
    }
}
