use async_trait::async_trait;

/// Structured failure classification at the telephony boundary.
///
/// The taxonomy is deliberately small; anything the provider reports that does
/// not classify cleanly maps to `Unknown` rather than inventing finer codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallFailureReason {
    InvalidDestination,
    ProviderRejected,
    Timeout,
    Unknown,
}

impl CallFailureReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidDestination => "invalid_destination",
            Self::ProviderRejected => "provider_rejected",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallOutcome {
    pub ok: bool,
    pub reason: Option<CallFailureReason>,
    pub detail: String,
}

impl CallOutcome {
    pub fn success(detail: impl Into<String>) -> Self {
        Self { ok: true, reason: None, detail: detail.into() }
    }

    pub fn failure(reason: CallFailureReason, detail: impl Into<String>) -> Self {
        Self { ok: false, reason: Some(reason), detail: detail.into() }
    }

    /// Classify a legacy provider result string. The provider contract marks
    /// failures only by the substrings `Failed`, `Error`, or `Invalid` in the
    /// returned text; everything else is success.
    pub fn from_provider_text(text: &str) -> Self {
        if text.contains("Invalid") {
            Self::failure(CallFailureReason::InvalidDestination, text)
        } else if text.contains("Failed") {
            Self::failure(CallFailureReason::ProviderRejected, text)
        } else if text.contains("Error") {
            Self::failure(CallFailureReason::Unknown, text)
        } else {
            Self::success(text)
        }
    }
}

/// Outbound call placement. Implementations never raise; transport problems
/// come back as failure outcomes so every caller path stays conversational.
#[async_trait]
pub trait TelephonyBridge: Send + Sync {
    async fn place(&self, app_id: &str, session_id: &str, destination: &str) -> CallOutcome;
}

/// Stand-in bridge for deployments where no carrier has been wired yet.
/// Reports an honest failure instead of pretending a call happened.
#[derive(Default)]
pub struct NoopTelephonyBridge;

#[async_trait]
impl TelephonyBridge for NoopTelephonyBridge {
    async fn place(&self, _app_id: &str, _session_id: &str, _destination: &str) -> CallOutcome {
        CallOutcome::failure(
            CallFailureReason::ProviderRejected,
            "no telephony bridge is configured for this deployment",
        )
    }
}
