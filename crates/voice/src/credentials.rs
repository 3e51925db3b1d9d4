use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// Lifetime of a session-scoped credential.
pub const SESSION_TOKEN_TTL_SECS: i64 = 3_600;

#[derive(Clone, Debug)]
pub struct SessionToken {
    pub secret: SecretString,
    pub expires_at: DateTime<Utc>,
}

impl SessionToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into().into(),
            expires_at: Utc::now() + Duration::seconds(SESSION_TOKEN_TTL_SECS),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("session token issuance failed: {0}")]
    Issuance(String),
}

/// Produces a time-bounded credential scoped to one dispatch session. The
/// generation mechanics live outside this system; this is the injection seam.
#[async_trait]
pub trait SessionTokenIssuer: Send + Sync {
    async fn issue(&self, session_id: &str) -> Result<SessionToken, TokenError>;
}

/// Deterministic issuer for local development and tests.
pub struct StaticTokenIssuer {
    prefix: String,
}

impl StaticTokenIssuer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

#[async_trait]
impl SessionTokenIssuer for StaticTokenIssuer {
    async fn issue(&self, session_id: &str) -> Result<SessionToken, TokenError> {
        Ok(SessionToken::new(format!("{}-{session_id}", self.prefix)))
    }
}
