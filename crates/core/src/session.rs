use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How many pushed updates a conversation context entry retains.
pub const CONTEXT_UPDATE_WINDOW: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specialization {
    Inquiry,
    Order,
    Reservation,
}

impl Specialization {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Inquiry => "inquiry",
            Self::Order => "order",
            Self::Reservation => "reservation",
        }
    }
}

/// One provisioned remote agent. Created on successful provisioning and never
/// mutated afterwards; a fresh dispatch produces a fresh session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSession {
    pub agent_id: String,
    pub specialization: Specialization,
    pub channel: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// Status bookkeeping for one dispatched agent, unique per (channel, agent).
///
/// `refresh_interval` is the slot for an automatic refresh timer. It is
/// intentionally never armed: all status refresh is pull-based, and the slot
/// stays `None` for the lifetime of the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollingSession {
    pub channel: String,
    pub agent_id: String,
    pub poll_count: u32,
    pub last_status: Option<String>,
    pub consecutive_unchanged: u32,
    pub refresh_interval: Option<std::time::Duration>,
}

impl PollingSession {
    pub fn new(channel: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            agent_id: agent_id.into(),
            poll_count: 0,
            last_status: None,
            consecutive_unchanged: 0,
            refresh_interval: None,
        }
    }

    pub fn session_key(channel: &str, agent_id: &str) -> String {
        format!("{channel}:{agent_id}")
    }

    /// Record the outcome of one pull, tracking how many consecutive pulls
    /// came back unchanged.
    pub fn record_poll(&mut self, status: &str) {
        self.poll_count += 1;
        if self.last_status.as_deref() == Some(status) {
            self.consecutive_unchanged += 1;
        } else {
            self.consecutive_unchanged = 0;
            self.last_status = Some(status.to_owned());
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextUpdateKind {
    Update,
    Completed,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextUpdate {
    pub at: DateTime<Utc>,
    pub status: String,
    pub kind: ContextUpdateKind,
}

/// Pushed-status cache for one agent on one channel. Holds the last
/// [`CONTEXT_UPDATE_WINDOW`] updates, oldest dropped first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContextEntry {
    pub channel: String,
    pub agent_id: String,
    pub specialization: Specialization,
    pub latest_status: String,
    pub updates: Vec<ContextUpdate>,
}

impl ConversationContextEntry {
    pub fn new(
        channel: impl Into<String>,
        agent_id: impl Into<String>,
        specialization: Specialization,
    ) -> Self {
        Self {
            channel: channel.into(),
            agent_id: agent_id.into(),
            specialization,
            latest_status: String::new(),
            updates: Vec::new(),
        }
    }

    pub fn push_update(&mut self, update: ContextUpdate) {
        self.latest_status = update.status.clone();
        self.updates.push(update);
        if self.updates.len() > CONTEXT_UPDATE_WINDOW {
            let overflow = self.updates.len() - CONTEXT_UPDATE_WINDOW;
            self.updates.drain(..overflow);
        }
    }

    pub fn latest_kind(&self) -> Option<ContextUpdateKind> {
        self.updates.last().map(|update| update.kind)
    }

    /// A terminal push (completed or failed) means monitoring should stop.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.latest_kind(),
            Some(ContextUpdateKind::Completed) | Some(ContextUpdateKind::Failed)
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{
        ContextUpdate, ContextUpdateKind, ConversationContextEntry, PollingSession, Specialization,
        CONTEXT_UPDATE_WINDOW,
    };

    fn update(status: &str, kind: ContextUpdateKind) -> ContextUpdate {
        ContextUpdate { at: Utc::now(), status: status.to_owned(), kind }
    }

    #[test]
    fn context_entry_drops_oldest_updates_beyond_window() {
        let mut entry = ConversationContextEntry::new("c1", "agent-1", Specialization::Order);
        for index in 0..8 {
            entry.push_update(update(&format!("step {index}"), ContextUpdateKind::Update));
        }

        assert_eq!(entry.updates.len(), CONTEXT_UPDATE_WINDOW);
        assert_eq!(entry.updates[0].status, "step 3");
        assert_eq!(entry.latest_status, "step 7");
    }

    #[test]
    fn terminal_kinds_mark_entry_terminal() {
        let mut entry = ConversationContextEntry::new("c1", "agent-1", Specialization::Reservation);
        entry.push_update(update("speaking with host", ContextUpdateKind::Update));
        assert!(!entry.is_terminal());

        entry.push_update(update("table booked for 4", ContextUpdateKind::Completed));
        assert!(entry.is_terminal());
        assert_eq!(entry.latest_kind(), Some(ContextUpdateKind::Completed));
    }

    #[test]
    fn polling_session_tracks_consecutive_unchanged_pulls() {
        let mut session = PollingSession::new("c1", "agent-1");
        session.record_poll("ringing");
        session.record_poll("ringing");
        session.record_poll("connected");

        assert_eq!(session.poll_count, 3);
        assert_eq!(session.consecutive_unchanged, 0);
        assert_eq!(session.last_status.as_deref(), Some("connected"));

        session.record_poll("connected");
        assert_eq!(session.consecutive_unchanged, 1);
    }

    #[test]
    fn refresh_timer_slot_stays_unarmed() {
        let session = PollingSession::new("c1", "agent-1");
        assert!(session.refresh_interval.is_none());
        assert_eq!(PollingSession::session_key("c1", "agent-1"), "c1:agent-1");
    }
}
