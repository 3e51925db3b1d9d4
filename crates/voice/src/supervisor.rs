use std::future::Future;
use std::sync::Arc;

use tracing::warn;

use dialout_core::{DispatchGuardStore, InMemoryStore, KeyValueStore, OrchestrationError};

use crate::manager::DispatchOutcome;

/// Terminal state of the most recent supervised dispatch attempt per channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Completed,
    Failed { reason: String },
}

/// Supervision for the provisioning + call-placement continuation.
///
/// The attempt runs as a spawned task so that an error, panic, or abort in the
/// continuation can never strand the channel's dispatch guard: every
/// non-success path records a `Failed` state and releases the guard. The
/// recorded state stays queryable after the attempt finishes.
#[derive(Clone)]
pub struct DispatchSupervisor {
    states: Arc<dyn KeyValueStore<TaskState>>,
    guards: DispatchGuardStore,
}

impl DispatchSupervisor {
    pub fn new(states: Arc<dyn KeyValueStore<TaskState>>, guards: DispatchGuardStore) -> Self {
        Self { states, guards }
    }

    pub fn in_memory(guards: DispatchGuardStore) -> Self {
        Self::new(Arc::new(InMemoryStore::new()), guards)
    }

    pub fn state(&self, channel: &str) -> Option<TaskState> {
        self.states.get(channel)
    }

    /// Run `work` for `channel` and record its terminal state.
    ///
    /// Expected failures come back as `Ok(outcome)` with the guard already
    /// released by the continuation itself; this layer covers the unexpected
    /// paths (errors, panics, runtime aborts).
    pub async fn supervise<F>(&self, channel: &str, work: F) -> DispatchOutcome
    where
        F: Future<Output = Result<DispatchOutcome, OrchestrationError>> + Send + 'static,
    {
        self.states.set(channel, TaskState::Running);

        match tokio::spawn(work).await {
            Ok(Ok(outcome)) => {
                match outcome.failure_detail() {
                    Some(detail) => {
                        self.states.set(channel, TaskState::Failed { reason: detail });
                    }
                    None => {
                        self.states.set(channel, TaskState::Completed);
                    }
                }
                outcome
            }
            Ok(Err(error)) => {
                warn!(
                    event_name = "dispatch.supervisor.task_failed",
                    channel = %channel,
                    error = %error,
                    "dispatch continuation failed; releasing guard"
                );
                self.states.set(channel, TaskState::Failed { reason: error.to_string() });
                self.guards.release(channel);
                DispatchOutcome::Aborted { detail: error.conversational() }
            }
            Err(join_error) => {
                warn!(
                    event_name = "dispatch.supervisor.task_aborted",
                    channel = %channel,
                    error = %join_error,
                    "dispatch continuation aborted; releasing guard"
                );
                self.states
                    .set(channel, TaskState::Failed { reason: join_error.to_string() });
                self.guards.release(channel);
                DispatchOutcome::Aborted {
                    detail: "the dispatch task stopped unexpectedly".to_owned(),
                }
            }
        }
    }
}
