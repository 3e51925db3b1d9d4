use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{InMemoryStore, KeyValueStore};

/// How the outbound leg of a dispatched call is routed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallAction {
    /// Dial the resolved business number directly.
    #[default]
    CallBusiness,
    /// Dial the requesting user's callback number first and bridge.
    CallUserFirst,
}

impl CallAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::CallBusiness => "call_business",
            Self::CallUserFirst => "call_user_first",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallActionPreference {
    pub channel: String,
    pub action: CallAction,
    pub recorded_at: DateTime<Utc>,
}

/// Per-channel routing preference with a one-hour inactivity expiry.
///
/// `get` on a missing channel returns the default action; on an expired
/// channel it also evicts the stale record.
#[derive(Clone)]
pub struct CallActionPolicy {
    preferences: Arc<dyn KeyValueStore<CallActionPreference>>,
    ttl: Duration,
}

pub const PREFERENCE_TTL_SECS: i64 = 3_600;

impl CallActionPolicy {
    pub fn new(preferences: Arc<dyn KeyValueStore<CallActionPreference>>) -> Self {
        Self { preferences, ttl: Duration::seconds(PREFERENCE_TTL_SECS) }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    pub fn set(&self, channel: &str, action: CallAction) {
        self.preferences.set(
            channel,
            CallActionPreference { channel: channel.to_owned(), action, recorded_at: Utc::now() },
        );
    }

    pub fn get(&self, channel: &str) -> CallAction {
        let Some(preference) = self.preferences.get(channel) else {
            return CallAction::default();
        };

        if Utc::now().signed_duration_since(preference.recorded_at) > self.ttl {
            self.preferences.remove(channel);
            return CallAction::default();
        }

        preference.action
    }
}
