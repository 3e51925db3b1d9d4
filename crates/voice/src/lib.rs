//! Ephemeral voice-agent orchestration: provisioning, outbound call
//! placement, and asynchronous status reconciliation.
//!
//! The lifecycle manager (`manager`) provisions a remote conversational agent
//! and bridges an outbound call under the per-channel dispatch guard; the
//! supervisor (`supervisor`) keeps the attempt's terminal state queryable and
//! guarantees the guard is released on any failure; the status tracker
//! (`status`) answers pull-based status questions and absorbs pushed updates.

pub mod credentials;
pub mod manager;
pub mod provisioning;
pub mod script;
pub mod status;
pub mod supervisor;
pub mod telephony;

pub use credentials::{SessionToken, SessionTokenIssuer, StaticTokenIssuer, TokenError};
pub use manager::{
    AgentLifecycleManager, CustomerFields, DeliveryMode, DispatchOutcome, DispatchRequest,
    PHONE_AUTO_RESOLVE,
};
pub use provisioning::{
    ConversationHistory, HistoryTurn, HttpProvisioningApi, JoinRequest, ProvisionedAgent,
    ProvisioningApi, ProvisioningError,
};
pub use script::{CallScript, ScriptError, ScriptGenerator};
pub use status::StatusTracker;
pub use supervisor::{DispatchSupervisor, TaskState};
pub use telephony::{CallFailureReason, CallOutcome, NoopTelephonyBridge, TelephonyBridge};
