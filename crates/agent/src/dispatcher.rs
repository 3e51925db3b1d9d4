use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::llm::{CompletionClient, CompletionRequest, CompletionResponse, ToolCallRequest};
use crate::messages::{follow_up_history, recent_window, ChatMessage};
use crate::tools::{HandlerRegistry, ToolContext, ToolResultClass};

/// How many recent messages are scanned for evidence of an active call.
const CALL_EVIDENCE_WINDOW: usize = 15;

/// Phrases that mark a call as already initiated or already connected to a
/// human. Matched case-insensitively against the recent message window.
const CALL_EVIDENCE_MARKERS: &[&str] = &[
    "placed a call",
    "call has been placed",
    "call is in progress",
    "call already in progress",
    "calling them now",
    "on the line with",
    "answered the phone",
    "speaking with the",
];

const ALREADY_ACTIVE_RESULT: &str =
    "A call for this conversation is already active. Do not place another call.";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("tool `{name}` received malformed arguments: {source}")]
    MalformedArguments {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("tool `{name}` handler failed: {message}")]
    Handler { name: String, message: String },
    #[error("follow-up completion failed: {message}")]
    FollowUp { message: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutedToolCall {
    pub name: String,
    pub class: ToolResultClass,
    pub result: String,
    /// True when the result was substituted by the redundant-call scan rather
    /// than produced by the handler.
    pub synthetic: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnOutcome {
    pub answer: String,
    pub tool_results: Vec<ExecutedToolCall>,
    pub follow_up_issued: bool,
}

/// Executes one turn's tool-call requests against the handler registry and
/// resolves the turn's final answer.
pub struct ToolCallDispatcher {
    client: Arc<dyn CompletionClient>,
}

impl ToolCallDispatcher {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    /// Run the requests of a completed turn, in the order received.
    ///
    /// A name already executed this turn is skipped. Call-initiating tools are
    /// short-circuited with a synthetic result when the recent history shows a
    /// call is already active. Every produced result is appended as a tool
    /// message; if any result exists, one follow-up completion over the
    /// assistant-stripped history yields the final answer.
    pub async fn execute_turn(
        &self,
        answer: &str,
        tool_calls: &[ToolCallRequest],
        history: &[ChatMessage],
        registry: &HandlerRegistry,
        ctx: &ToolContext,
    ) -> Result<TurnOutcome, DispatchError> {
        let mut executed_names: HashSet<String> = HashSet::new();
        let mut results: Vec<ExecutedToolCall> = Vec::new();

        for call in tool_calls {
            if !executed_names.insert(call.name.clone()) {
                debug!(
                    event_name = "dispatch.tool.duplicate_skipped",
                    channel = %ctx.channel,
                    tool = %call.name,
                    "tool already executed this turn; skipping"
                );
                continue;
            }

            let Some(handler) = registry.handler(&call.name) else {
                warn!(
                    event_name = "dispatch.tool.unknown_name",
                    channel = %ctx.channel,
                    registry_version = registry.version(),
                    tool = %call.name,
                    "model requested an unregistered tool; dropping with no result"
                );
                continue;
            };
            let profile =
                registry.profile(&call.name).unwrap_or_else(crate::tools::ToolProfile::data);

            if profile.initiates_call && call_already_evident(history) {
                info!(
                    event_name = "dispatch.tool.redundant_call_suppressed",
                    channel = %ctx.channel,
                    tool = %call.name,
                    "recent history shows an active call; substituting synthetic result"
                );
                results.push(ExecutedToolCall {
                    name: call.name.clone(),
                    class: profile.class,
                    result: ALREADY_ACTIVE_RESULT.to_owned(),
                    synthetic: true,
                });
                continue;
            }

            let args = parse_arguments(&call.name, &call.arguments)?;
            let result = handler.handle(ctx, args).await.map_err(|error| {
                DispatchError::Handler { name: call.name.clone(), message: error.to_string() }
            })?;

            debug!(
                event_name = "dispatch.tool.executed",
                channel = %ctx.channel,
                tool = %call.name,
                class = ?profile.class,
                "tool handler produced a result"
            );
            results.push(ExecutedToolCall {
                name: call.name.clone(),
                class: profile.class,
                result,
                synthetic: false,
            });
        }

        if results.is_empty() {
            return Ok(TurnOutcome {
                answer: answer.to_owned(),
                tool_results: results,
                follow_up_issued: false,
            });
        }

        let final_answer = self.follow_up(answer, history, &results, ctx).await?;
        Ok(TurnOutcome { answer: final_answer, tool_results: results, follow_up_issued: true })
    }

    /// One completion over system/user/tool messages plus the fresh tool
    /// results. Issued for affirmation results as well as data results; the
    /// re-prompt keeps the conversation coherent in both cases.
    async fn follow_up(
        &self,
        original_answer: &str,
        history: &[ChatMessage],
        results: &[ExecutedToolCall],
        ctx: &ToolContext,
    ) -> Result<String, DispatchError> {
        let mut messages = follow_up_history(history);
        for executed in results {
            messages.push(ChatMessage::tool(executed.result.clone()));
        }

        let response = self
            .client
            .complete(CompletionRequest { messages, tools: Vec::new() })
            .await
            .map_err(|error| DispatchError::FollowUp { message: error.to_string() })?;

        match response {
            CompletionResponse::Text(text) => Ok(text),
            CompletionResponse::ToolCalls(calls) => {
                warn!(
                    event_name = "dispatch.follow_up.unexpected_tool_calls",
                    channel = %ctx.channel,
                    requested = calls.len(),
                    "follow-up completion requested more tools; keeping original answer"
                );
                Ok(original_answer.to_owned())
            }
        }
    }
}

fn parse_arguments(name: &str, raw: &str) -> Result<Value, DispatchError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }

    serde_json::from_str(trimmed)
        .map_err(|source| DispatchError::MalformedArguments { name: name.to_owned(), source })
}

fn call_already_evident(history: &[ChatMessage]) -> bool {
    recent_window(history, CALL_EVIDENCE_WINDOW).iter().any(|message| {
        let content = message.content.to_lowercase();
        CALL_EVIDENCE_MARKERS.iter().any(|marker| content.contains(marker))
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::Mutex;

    use super::{DispatchError, ToolCallDispatcher, ALREADY_ACTIVE_RESULT};
    use crate::llm::{
        CompletionClient, CompletionRequest, CompletionResponse, ToolCallRequest,
    };
    use crate::messages::{ChatMessage, MessageRole};
    use crate::tools::{HandlerRegistry, ToolContext, ToolHandler, ToolProfile};

    struct RecordingHandler {
        reply: &'static str,
        invocations: Arc<Mutex<Vec<Value>>>,
    }

    #[async_trait]
    impl ToolHandler for RecordingHandler {
        async fn handle(&self, _ctx: &ToolContext, args: Value) -> anyhow::Result<String> {
            self.invocations.lock().await.push(args);
            Ok(self.reply.to_owned())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl ToolHandler for FailingHandler {
        async fn handle(&self, _ctx: &ToolContext, _args: Value) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("downstream unavailable"))
        }
    }

    struct ScriptedClient {
        response: CompletionResponse,
        requests: Arc<Mutex<Vec<CompletionRequest>>>,
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, request: CompletionRequest) -> anyhow::Result<CompletionResponse> {
            self.requests.lock().await.push(request);
            Ok(self.response.clone())
        }
    }

    fn ctx() -> ToolContext {
        ToolContext { app_id: "app".to_owned(), user_id: "u1".to_owned(), channel: "c1".to_owned() }
    }

    fn call(name: &str, arguments: &str) -> ToolCallRequest {
        ToolCallRequest { name: name.to_owned(), arguments: arguments.to_owned() }
    }

    fn dispatcher_with_text(
        answer: &str,
    ) -> (ToolCallDispatcher, Arc<Mutex<Vec<CompletionRequest>>>) {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let client = ScriptedClient {
            response: CompletionResponse::Text(answer.to_owned()),
            requests: requests.clone(),
        };
        (ToolCallDispatcher::new(Arc::new(client)), requests)
    }

    #[tokio::test]
    async fn duplicate_tool_names_execute_once() {
        let invocations = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new("v3");
        registry.register(
            "search_restaurants",
            ToolProfile::data(),
            RecordingHandler { reply: "3 places found", invocations: invocations.clone() },
        );
        let (dispatcher, _) = dispatcher_with_text("here is what I found");

        let outcome = dispatcher
            .execute_turn(
                "interim",
                &[call("search_restaurants", r#"{"q":"pizza"}"#), call("search_restaurants", r#"{"q":"pizza"}"#)],
                &[ChatMessage::user("find pizza nearby")],
                &registry,
                &ctx(),
            )
            .await
            .expect("turn should succeed");

        assert_eq!(invocations.lock().await.len(), 1);
        assert_eq!(outcome.tool_results.len(), 1);
        assert_eq!(outcome.answer, "here is what I found");
        assert!(outcome.follow_up_issued);
    }

    #[tokio::test]
    async fn requests_run_in_order_received() {
        let invocations = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new("v3");
        registry.register(
            "first_tool",
            ToolProfile::affirmation(),
            RecordingHandler { reply: "ok", invocations: invocations.clone() },
        );
        registry.register(
            "second_tool",
            ToolProfile::data(),
            RecordingHandler { reply: "data", invocations: invocations.clone() },
        );
        let (dispatcher, _) = dispatcher_with_text("done");

        let outcome = dispatcher
            .execute_turn(
                "interim",
                &[call("first_tool", r#"{"step":1}"#), call("second_tool", r#"{"step":2}"#)],
                &[],
                &registry,
                &ctx(),
            )
            .await
            .expect("turn should succeed");

        let recorded = invocations.lock().await;
        assert_eq!(recorded.as_slice(), &[json!({"step": 1}), json!({"step": 2})]);
        assert_eq!(outcome.tool_results[0].name, "first_tool");
        assert_eq!(outcome.tool_results[1].name, "second_tool");
    }

    #[tokio::test]
    async fn unknown_tool_is_dropped_without_result() {
        let registry = HandlerRegistry::new("v3");
        let (dispatcher, requests) = dispatcher_with_text("unused");

        let outcome = dispatcher
            .execute_turn("the original answer", &[call("not_registered", "{}")], &[], &registry, &ctx())
            .await
            .expect("unknown tools do not fail the turn");

        assert!(outcome.tool_results.is_empty());
        assert!(!outcome.follow_up_issued);
        assert_eq!(outcome.answer, "the original answer");
        assert!(requests.lock().await.is_empty(), "no follow-up without results");
    }

    #[tokio::test]
    async fn malformed_arguments_are_raised() {
        let mut registry = HandlerRegistry::new("v3");
        registry.register(
            "place_order",
            ToolProfile::call_initiating(),
            RecordingHandler { reply: "unused", invocations: Arc::new(Mutex::new(Vec::new())) },
        );
        let (dispatcher, _) = dispatcher_with_text("unused");

        let error = dispatcher
            .execute_turn("interim", &[call("place_order", "{not json")], &[], &registry, &ctx())
            .await
            .expect_err("malformed arguments must raise");

        assert!(matches!(error, DispatchError::MalformedArguments { ref name, .. } if name == "place_order"));
    }

    #[tokio::test]
    async fn handler_failure_is_raised_with_tool_name() {
        let mut registry = HandlerRegistry::new("v3");
        registry.register("flaky_tool", ToolProfile::data(), FailingHandler);
        let (dispatcher, _) = dispatcher_with_text("unused");

        let error = dispatcher
            .execute_turn("interim", &[call("flaky_tool", "{}")], &[], &registry, &ctx())
            .await
            .expect_err("handler failure must raise");

        assert!(matches!(error, DispatchError::Handler { ref name, .. } if name == "flaky_tool"));
    }

    #[tokio::test]
    async fn active_call_evidence_substitutes_synthetic_result() {
        let invocations = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new("v3");
        registry.register(
            "place_order",
            ToolProfile::call_initiating(),
            RecordingHandler { reply: "unused", invocations: invocations.clone() },
        );
        let (dispatcher, _) = dispatcher_with_text("I'll keep you posted");

        let history = vec![
            ChatMessage::user("order a large pepperoni"),
            ChatMessage::tool("I've placed a call to +15551234567 on your behalf."),
            ChatMessage::user("did it go through?"),
        ];
        let outcome = dispatcher
            .execute_turn("interim", &[call("place_order", "{}")], &history, &registry, &ctx())
            .await
            .expect("turn should succeed");

        assert!(invocations.lock().await.is_empty(), "handler must not run again");
        assert_eq!(outcome.tool_results.len(), 1);
        assert!(outcome.tool_results[0].synthetic);
        assert_eq!(outcome.tool_results[0].result, ALREADY_ACTIVE_RESULT);
    }

    #[tokio::test]
    async fn old_call_evidence_outside_window_does_not_suppress() {
        let invocations = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new("v3");
        registry.register(
            "place_order",
            ToolProfile::call_initiating(),
            RecordingHandler { reply: "dispatched", invocations: invocations.clone() },
        );
        let (dispatcher, _) = dispatcher_with_text("on it");

        let mut history = vec![ChatMessage::tool("I've placed a call to +15551234567.")];
        history.extend((0..16).map(|index| ChatMessage::user(format!("unrelated chatter {index}"))));

        dispatcher
            .execute_turn("interim", &[call("place_order", "{}")], &history, &registry, &ctx())
            .await
            .expect("turn should succeed");

        assert_eq!(invocations.lock().await.len(), 1, "stale evidence must not suppress");
    }

    #[tokio::test]
    async fn follow_up_sees_only_system_user_and_tool_messages() {
        let mut registry = HandlerRegistry::new("v3");
        registry.register(
            "confirm_address",
            ToolProfile::affirmation(),
            RecordingHandler { reply: "address saved", invocations: Arc::new(Mutex::new(Vec::new())) },
        );
        let (dispatcher, requests) = dispatcher_with_text("all set");

        let history = vec![
            ChatMessage::system("you arrange calls"),
            ChatMessage::user("save my address"),
            ChatMessage::assistant("calling confirm_address(...)"),
        ];
        let outcome = dispatcher
            .execute_turn("interim", &[call("confirm_address", "{}")], &history, &registry, &ctx())
            .await
            .expect("turn should succeed");

        let requests = requests.lock().await;
        assert_eq!(requests.len(), 1, "exactly one follow-up completion");
        assert!(requests[0]
            .messages
            .iter()
            .all(|message| message.role != MessageRole::Assistant));
        assert_eq!(
            requests[0].messages.last().map(|message| message.content.as_str()),
            Some("address saved"),
            "fresh tool result must be appended"
        );
        assert_eq!(outcome.answer, "all set");
        assert!(outcome.follow_up_issued, "affirmation results also re-prompt");
    }

    #[tokio::test]
    async fn follow_up_tool_calls_fall_back_to_original_answer() {
        let mut registry = HandlerRegistry::new("v3");
        registry.register(
            "search_restaurants",
            ToolProfile::data(),
            RecordingHandler { reply: "found 2", invocations: Arc::new(Mutex::new(Vec::new())) },
        );
        let requests = Arc::new(Mutex::new(Vec::new()));
        let client = ScriptedClient {
            response: CompletionResponse::ToolCalls(vec![call("search_restaurants", "{}")]),
            requests: requests.clone(),
        };
        let dispatcher = ToolCallDispatcher::new(Arc::new(client));

        let outcome = dispatcher
            .execute_turn(
                "the interim answer",
                &[call("search_restaurants", "{}")],
                &[],
                &registry,
                &ctx(),
            )
            .await
            .expect("turn should succeed");

        assert_eq!(outcome.answer, "the interim answer");
        assert_eq!(requests.lock().await.len(), 1, "only one follow-up is ever issued");
    }

    #[tokio::test]
    async fn empty_arguments_parse_as_empty_object() {
        let invocations = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new("v3");
        registry.register(
            "get_call_status",
            ToolProfile::data(),
            RecordingHandler { reply: "RUNNING", invocations: invocations.clone() },
        );
        let (dispatcher, _) = dispatcher_with_text("status relayed");

        dispatcher
            .execute_turn("interim", &[call("get_call_status", "  ")], &[], &registry, &ctx())
            .await
            .expect("turn should succeed");

        assert_eq!(invocations.lock().await.as_slice(), &[json!({})]);
    }
}
