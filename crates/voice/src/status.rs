use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use dialout_core::{
    AgentSession, ContextUpdate, ContextUpdateKind, ConversationContextEntry, DispatchGuardStore,
    KeyValueStore, PollingSession, SignificanceDetector, Specialization,
};

use crate::provisioning::{ConversationHistory, ProvisioningApi};

/// How many trailing conversation turns a status summary quotes.
const SUMMARY_TURNS: usize = 3;

/// Pull-based status answers and push-based context bookkeeping for
/// dispatched agents.
pub struct StatusTracker {
    sessions: Arc<dyn KeyValueStore<AgentSession>>,
    polling: Arc<dyn KeyValueStore<PollingSession>>,
    contexts: Arc<dyn KeyValueStore<ConversationContextEntry>>,
    guards: DispatchGuardStore,
    provisioning: Arc<dyn ProvisioningApi>,
    significance: Arc<dyn SignificanceDetector>,
}

impl StatusTracker {
    pub fn new(
        sessions: Arc<dyn KeyValueStore<AgentSession>>,
        polling: Arc<dyn KeyValueStore<PollingSession>>,
        contexts: Arc<dyn KeyValueStore<ConversationContextEntry>>,
        guards: DispatchGuardStore,
        provisioning: Arc<dyn ProvisioningApi>,
        significance: Arc<dyn SignificanceDetector>,
    ) -> Self {
        Self { sessions, polling, contexts, guards, provisioning, significance }
    }

    /// Register bookkeeping for a freshly dispatched agent.
    pub fn register(&self, session: &AgentSession) {
        let key = PollingSession::session_key(&session.channel, &session.agent_id);
        self.sessions.set(&key, session.clone());
        self.polling.set(&key, PollingSession::new(&session.channel, &session.agent_id));
    }

    /// Answer a status question for a channel.
    ///
    /// A cached context entry is served preferentially. Otherwise the session
    /// is located (explicit agent id, else the most recent session for the
    /// user on the channel) and remote history is fetched; with no session at
    /// all, no remote call is made. Fetch problems degrade to descriptive
    /// strings.
    pub async fn latest_status(
        &self,
        user_id: &str,
        channel: &str,
        agent_id: Option<&str>,
    ) -> String {
        if let Some(entry) = self.cached_entry(channel, agent_id) {
            return format_context(&entry);
        }

        let Some(session) = self.locate_session(user_id, channel, agent_id) else {
            return "There's no active calling agent for this conversation, so there is no \
                    status to report."
                .to_owned();
        };

        match self.provisioning.history(&session.agent_id).await {
            Ok(history) => {
                self.record_pull(&session, &history);
                format_history(&session, &history)
            }
            Err(error) => {
                warn!(
                    event_name = "status.fetch.failed",
                    channel = %channel,
                    agent_id = %session.agent_id,
                    error = %error,
                    "status fetch degraded to failure message"
                );
                format!(
                    "I couldn't fetch the call status right now ({error}). The call may still \
                     be in progress; please ask again in a moment."
                )
            }
        }
    }

    /// Absorb a pushed status update. Returns whether the update was
    /// significant relative to the previous one; when a push channel exists
    /// this gates automatic re-engagement of the model.
    pub fn record_update(
        &self,
        channel: &str,
        agent_id: &str,
        kind: ContextUpdateKind,
        status: &str,
    ) -> bool {
        let key = PollingSession::session_key(channel, agent_id);
        let mut entry = self.contexts.get(&key).unwrap_or_else(|| {
            let specialization = self
                .sessions
                .get(&key)
                .map(|session| session.specialization)
                .unwrap_or(Specialization::Inquiry);
            ConversationContextEntry::new(channel, agent_id, specialization)
        });

        let previous = (!entry.updates.is_empty()).then(|| entry.latest_status.clone());
        let significant = self.significance.is_significant(status, previous.as_deref());

        entry.push_update(ContextUpdate { at: Utc::now(), status: status.to_owned(), kind });
        self.contexts.set(&key, entry);

        info!(
            event_name = "status.update.recorded",
            channel = %channel,
            agent_id = %agent_id,
            kind = ?kind,
            significant,
            "pushed status update recorded"
        );
        significant
    }

    /// Stop tracking a call: delete the polling and context bookkeeping and
    /// release the channel's dispatch guard so a new dispatch becomes
    /// possible. Only local tracking stops; a bridged call is not cancelled.
    pub fn stop(&self, channel: &str, agent_id: Option<&str>, reason: Option<&str>) -> String {
        let located = match agent_id {
            Some(agent_id) => {
                let key = PollingSession::session_key(channel, agent_id);
                self.polling.get(&key)
            }
            None => self
                .polling
                .list()
                .into_iter()
                .map(|(_, session)| session)
                .find(|session| session.channel == channel),
        };

        self.guards.release(channel);

        let Some(mut session) = located else {
            return "There's no call being tracked for this conversation; the dispatch slot is \
                    clear."
                .to_owned();
        };

        session.refresh_interval = None;
        let key = PollingSession::session_key(channel, &session.agent_id);
        self.polling.remove(&key);
        self.contexts.remove(&key);
        self.sessions.remove(&key);

        info!(
            event_name = "status.stop",
            channel = %channel,
            agent_id = %session.agent_id,
            reason = reason.unwrap_or("unspecified"),
            "call tracking stopped; guard released"
        );

        let reason_suffix = match reason {
            Some(reason) => format!(" ({reason})"),
            None => String::new(),
        };
        format!(
            "Stopped monitoring the call with agent {}{reason_suffix}. A new call can be \
             dispatched on this conversation.",
            session.agent_id
        )
    }

    fn cached_entry(
        &self,
        channel: &str,
        agent_id: Option<&str>,
    ) -> Option<ConversationContextEntry> {
        match agent_id {
            Some(agent_id) => {
                self.contexts.get(&PollingSession::session_key(channel, agent_id))
            }
            None => self
                .contexts
                .list()
                .into_iter()
                .map(|(_, entry)| entry)
                .filter(|entry| entry.channel == channel)
                .max_by_key(|entry| entry.updates.last().map(|update| update.at)),
        }
    }

    fn locate_session(
        &self,
        user_id: &str,
        channel: &str,
        agent_id: Option<&str>,
    ) -> Option<AgentSession> {
        match agent_id {
            Some(agent_id) => self.sessions.get(&PollingSession::session_key(channel, agent_id)),
            None => self
                .sessions
                .list()
                .into_iter()
                .map(|(_, session)| session)
                .filter(|session| session.user_id == user_id && session.channel == channel)
                .max_by_key(|session| session.created_at),
        }
    }

    fn record_pull(&self, session: &AgentSession, history: &ConversationHistory) {
        let key = PollingSession::session_key(&session.channel, &session.agent_id);
        let mut polling = self
            .polling
            .get(&key)
            .unwrap_or_else(|| PollingSession::new(&session.channel, &session.agent_id));
        polling.record_poll(&history.status);
        self.polling.set(&key, polling);
    }
}

fn format_context(entry: &ConversationContextEntry) -> String {
    let mut summary = format!(
        "Latest update from the {} call: {}",
        entry.specialization.label(),
        entry.latest_status
    );

    match entry.latest_kind() {
        Some(ContextUpdateKind::Completed) => {
            summary.push_str(
                "\nThe call has completed. Only relay prices or times that were explicitly \
                 confirmed on the call, and stop monitoring this call.",
            );
        }
        Some(ContextUpdateKind::Failed) => {
            summary.push_str(
                "\nThe call did not complete successfully. Do not report prices or times that \
                 were never confirmed, and stop monitoring this call.",
            );
        }
        _ => {}
    }

    summary
}

fn format_history(session: &AgentSession, history: &ConversationHistory) -> String {
    let mut summary = if history.is_running() {
        format!(
            "The {} call is still in progress (status: {}).",
            session.specialization.label(),
            history.status
        )
    } else {
        format!(
            "The {} call has ended (status: {}).",
            session.specialization.label(),
            history.status
        )
    };

    let tail_start = history.contents.len().saturating_sub(SUMMARY_TURNS);
    let tail = &history.contents[tail_start..];
    if !tail.is_empty() {
        summary.push_str("\nMost recent exchange:");
        for turn in tail {
            summary.push_str(&format!("\n- {}: {}", turn.role, turn.content));
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::Mutex;

    use dialout_core::{
        AgentSession, ContextUpdateKind, DispatchGuardStore, InMemoryStore, PhraseDeltaDetector,
        Specialization,
    };

    use super::StatusTracker;
    use crate::provisioning::{
        ConversationHistory, HistoryTurn, JoinRequest, ProvisionedAgent, ProvisioningApi,
        ProvisioningError,
    };

    struct ScriptedApi {
        histories: Mutex<VecDeque<Result<ConversationHistory, ProvisioningError>>>,
        history_calls: Mutex<usize>,
    }

    impl ScriptedApi {
        fn with_histories(
            histories: Vec<Result<ConversationHistory, ProvisioningError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                histories: Mutex::new(histories.into()),
                history_calls: Mutex::new(0),
            })
        }

        async fn history_calls(&self) -> usize {
            *self.history_calls.lock().await
        }
    }

    #[async_trait]
    impl ProvisioningApi for ScriptedApi {
        async fn join(&self, _request: &JoinRequest) -> Result<ProvisionedAgent, ProvisioningError> {
            Ok(ProvisionedAgent { agent_id: "agent-test".to_owned() })
        }

        async fn history(
            &self,
            _agent_id: &str,
        ) -> Result<ConversationHistory, ProvisioningError> {
            *self.history_calls.lock().await += 1;
            self.histories.lock().await.pop_front().unwrap_or_else(|| {
                Err(ProvisioningError::Transport("script exhausted".to_owned()))
            })
        }
    }

    fn tracker_with(api: Arc<ScriptedApi>) -> (StatusTracker, DispatchGuardStore) {
        let guards = DispatchGuardStore::in_memory();
        let tracker = StatusTracker::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryStore::new()),
            guards.clone(),
            api,
            Arc::new(PhraseDeltaDetector::default()),
        );
        (tracker, guards)
    }

    fn session(channel: &str, agent_id: &str) -> AgentSession {
        AgentSession {
            agent_id: agent_id.to_owned(),
            specialization: Specialization::Order,
            channel: channel.to_owned(),
            user_id: "u1".to_owned(),
            created_at: Utc::now(),
        }
    }

    fn running_history() -> ConversationHistory {
        ConversationHistory {
            status: "RUNNING".to_owned(),
            contents: vec![
                HistoryTurn { role: "agent".to_owned(), content: "placing the order".to_owned() },
                HistoryTurn { role: "staff".to_owned(), content: "one moment please".to_owned() },
            ],
            start_ts: 1_730_000_000,
        }
    }

    #[tokio::test]
    async fn no_session_means_no_remote_call() {
        let api = ScriptedApi::with_histories(vec![Ok(running_history())]);
        let (tracker, _) = tracker_with(api.clone());

        let reply = tracker.latest_status("u1", "c1", None).await;

        assert!(reply.contains("no active calling agent"));
        assert_eq!(api.history_calls().await, 0);
    }

    #[tokio::test]
    async fn running_call_is_summarized_from_fetched_history() {
        let api = ScriptedApi::with_histories(vec![Ok(running_history())]);
        let (tracker, _) = tracker_with(api.clone());
        tracker.register(&session("c1", "agent-1"));

        let reply = tracker.latest_status("u1", "c1", None).await;

        assert!(reply.contains("still in progress"));
        assert!(reply.contains("status: RUNNING"));
        assert!(reply.contains("staff: one moment please"));
        assert_eq!(api.history_calls().await, 1);
    }

    #[tokio::test]
    async fn fetch_failure_degrades_to_descriptive_string() {
        let api = ScriptedApi::with_histories(vec![Err(ProvisioningError::Status {
            status: 503,
            body: "unavailable".to_owned(),
        })]);
        let (tracker, _) = tracker_with(api);
        tracker.register(&session("c1", "agent-1"));

        let reply = tracker.latest_status("u1", "c1", None).await;

        assert!(reply.contains("couldn't fetch the call status"));
        assert!(reply.contains("503"));
    }

    #[tokio::test]
    async fn cached_context_is_preferred_over_a_live_fetch() {
        let api = ScriptedApi::with_histories(vec![Ok(running_history())]);
        let (tracker, _) = tracker_with(api.clone());
        tracker.register(&session("c1", "agent-1"));
        tracker.record_update(
            "c1",
            "agent-1",
            ContextUpdateKind::Completed,
            "order confirmed, pickup in 20 minutes",
        );

        let reply = tracker.latest_status("u1", "c1", None).await;

        assert!(reply.contains("order confirmed, pickup in 20 minutes"));
        assert!(reply.contains("stop monitoring"));
        assert!(reply.contains("explicitly"));
        assert_eq!(api.history_calls().await, 0, "cached entry must prevent the remote fetch");
    }

    #[tokio::test]
    async fn failed_updates_carry_do_not_fabricate_guidance() {
        let api = ScriptedApi::with_histories(vec![]);
        let (tracker, _) = tracker_with(api);
        tracker.register(&session("c1", "agent-1"));
        tracker.record_update("c1", "agent-1", ContextUpdateKind::Failed, "no answer after 6 rings");

        let reply = tracker.latest_status("u1", "c1", Some("agent-1")).await;

        assert!(reply.contains("did not complete successfully"));
        assert!(reply.contains("never confirmed"));
    }

    #[tokio::test]
    async fn significance_gates_are_reported_per_update() {
        let api = ScriptedApi::with_histories(vec![]);
        let (tracker, _) = tracker_with(api);
        tracker.register(&session("c1", "agent-1"));

        let first =
            tracker.record_update("c1", "agent-1", ContextUpdateKind::Update, "dialing now");
        let repeat =
            tracker.record_update("c1", "agent-1", ContextUpdateKind::Update, "dialing still");
        let confirm = tracker.record_update(
            "c1",
            "agent-1",
            ContextUpdateKind::Update,
            "order confirmed by staff",
        );

        assert!(first, "first update is always significant");
        assert!(!repeat, "near-identical update is not significant");
        assert!(confirm, "newly confirmed status is significant");
    }

    #[tokio::test]
    async fn stop_clears_bookkeeping_and_releases_guard() {
        let api = ScriptedApi::with_histories(vec![]);
        let (tracker, guards) = tracker_with(api.clone());
        assert!(guards.try_acquire("c1"));
        tracker.register(&session("c1", "agent-1"));
        tracker.record_update("c1", "agent-1", ContextUpdateKind::Update, "dialing");

        let reply = tracker.stop("c1", None, Some("user asked to stop"));

        assert!(reply.contains("agent-1"));
        assert!(reply.contains("user asked to stop"));
        assert!(!guards.is_held("c1"), "stop must release the dispatch guard");

        let after = tracker.latest_status("u1", "c1", None).await;
        assert!(after.contains("no active calling agent"), "bookkeeping must be deleted");
        assert_eq!(api.history_calls().await, 0);
    }

    #[tokio::test]
    async fn stop_without_tracked_call_still_clears_the_slot() {
        let api = ScriptedApi::with_histories(vec![]);
        let (tracker, guards) = tracker_with(api);
        assert!(guards.try_acquire("c1"));

        let reply = tracker.stop("c1", None, None);

        assert!(reply.contains("no call being tracked"));
        assert!(!guards.is_held("c1"));
    }
}
