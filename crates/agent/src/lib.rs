//! Tool-call execution for the conversational model.
//!
//! This crate turns the function calls a completed LLM turn requested into
//! executed side effects and a coherent final answer:
//! 1. **Message model** (`messages`) - role-tagged history and the filtered
//!    view used for follow-up completions
//! 2. **Completion seam** (`llm`) - provider-agnostic completion client trait
//! 3. **Handler registry** (`tools`) - version-scoped name → async handler map
//!    with per-tool result classification
//! 4. **Dispatch** (`dispatcher`) - ordered single-flight execution, duplicate
//!    suppression, redundant-call protection, and the single follow-up
//!    completion that produces the turn's final answer

pub mod dispatcher;
pub mod llm;
pub mod messages;
pub mod tools;

pub use dispatcher::{DispatchError, ExecutedToolCall, ToolCallDispatcher, TurnOutcome};
pub use llm::{
    CompletionClient, CompletionRequest, CompletionResponse, NoopCompletionClient, ToolCallRequest,
    ToolSchema,
};
pub use messages::{follow_up_history, recent_window, ChatMessage, MessageRole};
pub use tools::{HandlerRegistry, ToolContext, ToolHandler, ToolProfile, ToolResultClass};
