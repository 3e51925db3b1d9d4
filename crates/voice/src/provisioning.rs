use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use dialout_core::config::ProvisioningConfig;

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("provisioning request failed: {0}")]
    Transport(String),
    #[error("provisioning endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provisioning response could not be decoded: {0}")]
    Decode(String),
    #[error("provisioning request timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Clone, Debug, Serialize)]
pub struct JoinRequest {
    pub session_id: String,
    pub session_token: String,
    pub script: String,
    pub opening_line: String,
    pub voice: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ProvisionedAgent {
    pub agent_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationHistory {
    pub status: String,
    pub contents: Vec<HistoryTurn>,
    pub start_ts: i64,
}

impl ConversationHistory {
    pub fn is_running(&self) -> bool {
        self.status.eq_ignore_ascii_case("running")
    }
}

/// Remote conversational-agent API: `join` provisions an agent, `history`
/// reads the agent's conversation so far.
#[async_trait]
pub trait ProvisioningApi: Send + Sync {
    async fn join(&self, request: &JoinRequest) -> Result<ProvisionedAgent, ProvisioningError>;
    async fn history(&self, agent_id: &str) -> Result<ConversationHistory, ProvisioningError>;
}

pub struct HttpProvisioningApi {
    client: Client,
    base_url: String,
    join_timeout: Duration,
    history_timeout: Duration,
}

impl HttpProvisioningApi {
    pub fn new(base_url: impl Into<String>, join_timeout: Duration, history_timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            join_timeout,
            history_timeout,
        }
    }

    pub fn from_config(config: &ProvisioningConfig) -> Self {
        Self::new(
            config.base_url.clone(),
            Duration::from_secs(config.join_timeout_secs),
            Duration::from_secs(config.history_timeout_secs),
        )
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }
}

fn transport_error(error: reqwest::Error, timeout: Duration) -> ProvisioningError {
    if error.is_timeout() {
        ProvisioningError::Timeout(timeout)
    } else {
        ProvisioningError::Transport(error.to_string())
    }
}

#[async_trait]
impl ProvisioningApi for HttpProvisioningApi {
    async fn join(&self, request: &JoinRequest) -> Result<ProvisionedAgent, ProvisioningError> {
        let response = self
            .client
            .post(self.endpoint("join"))
            .timeout(self.join_timeout)
            .json(request)
            .send()
            .await
            .map_err(|error| transport_error(error, self.join_timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProvisioningError::Status { status: status.as_u16(), body });
        }

        response.json().await.map_err(|error| ProvisioningError::Decode(error.to_string()))
    }

    async fn history(&self, agent_id: &str) -> Result<ConversationHistory, ProvisioningError> {
        let response = self
            .client
            .get(self.endpoint(&format!("conversations/{agent_id}/history")))
            .timeout(self.history_timeout)
            .send()
            .await
            .map_err(|error| transport_error(error, self.history_timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProvisioningError::Status { status: status.as_u16(), body });
        }

        response.json().await.map_err(|error| ProvisioningError::Decode(error.to_string()))
    }
}
