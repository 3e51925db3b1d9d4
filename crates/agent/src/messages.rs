use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Tool, content: content.into() }
    }
}

/// The history a follow-up completion sees: system, user, and tool messages
/// only. Prior assistant turns are stripped so the model is not confused by
/// its own interim tool-call syntax.
pub fn follow_up_history(history: &[ChatMessage]) -> Vec<ChatMessage> {
    history
        .iter()
        .filter(|message| message.role != MessageRole::Assistant)
        .cloned()
        .collect()
}

/// The most recent `window` messages, oldest first.
pub fn recent_window(history: &[ChatMessage], window: usize) -> &[ChatMessage] {
    let start = history.len().saturating_sub(window);
    &history[start..]
}

#[cfg(test)]
mod tests {
    use super::{follow_up_history, recent_window, ChatMessage, MessageRole};

    #[test]
    fn follow_up_history_strips_assistant_turns() {
        let history = vec![
            ChatMessage::system("you arrange calls"),
            ChatMessage::user("order me a pizza"),
            ChatMessage::assistant("calling place_order(...)"),
            ChatMessage::tool("order tool acknowledged"),
        ];

        let filtered = follow_up_history(&history);

        assert_eq!(filtered.len(), 3);
        assert!(filtered.iter().all(|message| message.role != MessageRole::Assistant));
        assert_eq!(filtered[2].content, "order tool acknowledged");
    }

    #[test]
    fn recent_window_returns_newest_messages() {
        let history: Vec<ChatMessage> =
            (0..20).map(|index| ChatMessage::user(format!("message {index}"))).collect();

        let window = recent_window(&history, 15);
        assert_eq!(window.len(), 15);
        assert_eq!(window[0].content, "message 5");
        assert_eq!(window[14].content, "message 19");
    }

    #[test]
    fn recent_window_handles_short_histories() {
        let history = vec![ChatMessage::user("only one")];
        assert_eq!(recent_window(&history, 15).len(), 1);
    }
}
