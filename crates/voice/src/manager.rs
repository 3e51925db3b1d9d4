use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use dialout_core::config::AppConfig;
use dialout_core::errors::{DomainError, OrchestrationError};
use dialout_core::lifecycle::{transition, DispatchEvent, DispatchPhase};
use dialout_core::{
    is_plausible_international, AgentSession, CallAction, CallActionPolicy, DispatchGuardStore,
    PhoneDirectory, Specialization,
};

use crate::credentials::SessionTokenIssuer;
use crate::provisioning::{JoinRequest, ProvisioningApi};
use crate::script::ScriptGenerator;
use crate::status::StatusTracker;
use crate::supervisor::DispatchSupervisor;
use crate::telephony::{CallFailureReason, TelephonyBridge};

/// Phone-number sentinel asking the manager to resolve via the directory.
pub const PHONE_AUTO_RESOLVE: &str = "auto";

/// Customer names that are clearly not a real name.
const PLACEHOLDER_NAMES: &[&str] = &[
    "customer",
    "customer name",
    "user",
    "name",
    "unknown",
    "test",
    "n/a",
    "na",
    "john doe",
    "jane doe",
    "placeholder",
    "anonymous",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryMode {
    Pickup,
    Delivery,
}

impl DeliveryMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pickup => "pickup",
            Self::Delivery => "delivery",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomerFields {
    pub customer_name: String,
    pub items: Vec<String>,
    pub delivery_mode: DeliveryMode,
    pub address: Option<String>,
    pub party_size: Option<u32>,
    pub time_preference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchRequest {
    pub specialization: Specialization,
    /// Destination number, or [`PHONE_AUTO_RESOLVE`] to resolve by name.
    pub phone_number: String,
    /// Business name; used for directory resolution and the call script.
    pub target_name: String,
    pub fields: CustomerFields,
    pub channel: String,
    pub user_id: String,
    /// The requester's own number, used when routing prefers calling them first.
    pub callback_number: Option<String>,
}

/// Result of one dispatch attempt. Every variant renders to a string the
/// conversational model can relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dispatched { agent_id: String, specialization: Specialization, phone: String },
    MissingConfiguration { missing: Vec<&'static str> },
    InvalidRequest { guidance: String },
    PhoneUnresolved { target_name: String },
    AlreadyActive { channel: String },
    ProvisioningFailed { detail: String },
    CallFailed { agent_id: String, phone: String, reason: CallFailureReason, detail: String },
    Aborted { detail: String },
}

impl DispatchOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched { .. })
    }

    /// The failure description recorded by the supervisor, when this outcome
    /// is a failure of the post-guard continuation.
    pub fn failure_detail(&self) -> Option<String> {
        match self {
            Self::ProvisioningFailed { detail } | Self::Aborted { detail } => Some(detail.clone()),
            Self::CallFailed { reason, detail, .. } => {
                Some(format!("{}: {detail}", reason.code()))
            }
            _ => None,
        }
    }

    pub fn reply(&self) -> String {
        match self {
            Self::Dispatched { specialization, phone, .. } => format!(
                "I've dispatched an ephemeral {} agent and placed a call to {phone}. \
                 The call runs on its own; ask me for status any time.",
                specialization.label()
            ),
            Self::MissingConfiguration { missing } => format!(
                "I can't place calls yet because the service is missing configuration: {}.",
                missing.join(", ")
            ),
            Self::InvalidRequest { guidance } => guidance.clone(),
            Self::PhoneUnresolved { target_name } => format!(
                "I don't have a phone number for {target_name}. \
                 Please search for the business first so I can pick its number up from the results."
            ),
            Self::AlreadyActive { .. } => {
                "A call for this conversation is already active. I won't start another one until \
                 it finishes or you ask me to stop it."
                    .to_owned()
            }
            Self::ProvisioningFailed { detail } => format!(
                "I couldn't set up the calling agent ({detail}). Nothing was dispatched; it is \
                 safe to try again."
            ),
            Self::CallFailed { agent_id, phone, reason, detail } => format!(
                "Agent {agent_id} is ready, but the call to {phone} could not be placed \
                 ({}: {detail}). You can ask me to retry, or dial {phone} yourself.",
                reason.code()
            ),
            Self::Aborted { detail } => format!(
                "Something went wrong while arranging the call ({detail}). Nothing is in \
                 progress; it is safe to try again."
            ),
        }
    }
}

/// Provisions an ephemeral conversational agent and bridges an outbound call,
/// under the per-channel dispatch guard.
pub struct AgentLifecycleManager {
    app_id: String,
    config: AppConfig,
    directory: PhoneDirectory,
    guards: DispatchGuardStore,
    policy: CallActionPolicy,
    provisioning: Arc<dyn ProvisioningApi>,
    telephony: Arc<dyn TelephonyBridge>,
    token_issuer: Arc<dyn SessionTokenIssuer>,
    scripts: Arc<ScriptGenerator>,
    supervisor: DispatchSupervisor,
    tracker: Arc<StatusTracker>,
}

impl AgentLifecycleManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        app_id: impl Into<String>,
        config: AppConfig,
        directory: PhoneDirectory,
        guards: DispatchGuardStore,
        policy: CallActionPolicy,
        provisioning: Arc<dyn ProvisioningApi>,
        telephony: Arc<dyn TelephonyBridge>,
        token_issuer: Arc<dyn SessionTokenIssuer>,
        scripts: Arc<ScriptGenerator>,
        supervisor: DispatchSupervisor,
        tracker: Arc<StatusTracker>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            config,
            directory,
            guards,
            policy,
            provisioning,
            telephony,
            token_issuer,
            scripts,
            supervisor,
            tracker,
        }
    }

    /// Dispatch an agent for one conversation.
    ///
    /// Prerequisites and caller fields are validated with zero side effects;
    /// the guard is then taken before the first await, and the provisioning +
    /// call-placement continuation runs under the supervisor. The return is
    /// immediate once the call is placed; call duration is decoupled.
    pub async fn dispatch_agent(&self, request: DispatchRequest) -> DispatchOutcome {
        let missing = self.config.missing_dispatch_credentials();
        if !missing.is_empty() {
            warn!(
                event_name = "dispatch.prerequisites.missing",
                channel = %request.channel,
                missing = ?missing,
                "dispatch rejected; configuration incomplete"
            );
            return DispatchOutcome::MissingConfiguration { missing };
        }

        if let Some(guidance) = validate_request(&request) {
            return DispatchOutcome::InvalidRequest { guidance };
        }

        let Some(phone) = self.resolve_phone(&request) else {
            return DispatchOutcome::PhoneUnresolved { target_name: request.target_name.clone() };
        };

        if !self.guards.try_acquire(&request.channel) {
            info!(
                event_name = "dispatch.guard.rejected",
                channel = %request.channel,
                "dispatch already active for channel"
            );
            return DispatchOutcome::AlreadyActive { channel: request.channel.clone() };
        }

        let action = self.policy.get(&request.channel);
        let destination = self.routing_destination(action, &phone, &request);

        let continuation = self.dispatch_continuation(request.clone(), destination);
        self.supervisor.supervise(&request.channel, continuation).await
    }

    pub fn supervisor(&self) -> &DispatchSupervisor {
        &self.supervisor
    }

    fn resolve_phone(&self, request: &DispatchRequest) -> Option<String> {
        let supplied = request.phone_number.trim();
        if supplied != PHONE_AUTO_RESOLVE && is_plausible_international(supplied) {
            return Some(supplied.to_owned());
        }
        self.directory.resolve(&request.user_id, &request.target_name)
    }

    fn routing_destination(
        &self,
        action: CallAction,
        business_phone: &str,
        request: &DispatchRequest,
    ) -> String {
        match action {
            CallAction::CallBusiness => business_phone.to_owned(),
            CallAction::CallUserFirst => request
                .callback_number
                .as_deref()
                .filter(|number| is_plausible_international(number))
                .map(str::to_owned)
                .unwrap_or_else(|| business_phone.to_owned()),
        }
    }

    /// The guarded section: everything from token issuance to call placement.
    /// All expected failures release the guard themselves and come back as
    /// conversational outcomes; unexpected errors bubble to the supervisor.
    fn dispatch_continuation(
        &self,
        request: DispatchRequest,
        destination: String,
    ) -> impl std::future::Future<Output = Result<DispatchOutcome, OrchestrationError>> + Send + 'static
    {
        let app_id = self.app_id.clone();
        let voice = self.config.speech.voice.clone();
        let guards = self.guards.clone();
        let provisioning = Arc::clone(&self.provisioning);
        let telephony = Arc::clone(&self.telephony);
        let token_issuer = Arc::clone(&self.token_issuer);
        let scripts = Arc::clone(&self.scripts);
        let tracker = Arc::clone(&self.tracker);

        async move {
            let mut phase = transition(DispatchPhase::Idle, DispatchEvent::GuardAcquired)
                .map_err(DomainError::from)?;

            let session_id = Uuid::new_v4().to_string();

            let token = match token_issuer.issue(&session_id).await {
                Ok(token) => token,
                Err(error) => {
                    guards.release(&request.channel);
                    warn!(
                        event_name = "dispatch.token.issuance_failed",
                        channel = %request.channel,
                        error = %error,
                        "session token issuance failed"
                    );
                    return Ok(DispatchOutcome::ProvisioningFailed { detail: error.to_string() });
                }
            };

            let script = match scripts.generate(
                request.specialization,
                &request.target_name,
                &request.fields,
            ) {
                Ok(script) => script,
                Err(error) => {
                    guards.release(&request.channel);
                    return Ok(DispatchOutcome::ProvisioningFailed { detail: error.to_string() });
                }
            };

            let join = JoinRequest {
                session_id: session_id.clone(),
                session_token: token.expose().to_owned(),
                script: script.script,
                opening_line: script.opening_line,
                voice,
            };
            let agent = match provisioning.join(&join).await {
                Ok(agent) => agent,
                Err(error) => {
                    phase = transition(phase, DispatchEvent::ProvisioningFailed)
                        .map_err(DomainError::from)?;
                    guards.release(&request.channel);
                    warn!(
                        event_name = "dispatch.agent.provision_failed",
                        channel = %request.channel,
                        phase = ?phase,
                        error = %error,
                        "agent provisioning failed; guard released"
                    );
                    return Ok(DispatchOutcome::ProvisioningFailed { detail: error.to_string() });
                }
            };
            phase = transition(phase, DispatchEvent::AgentProvisioned).map_err(DomainError::from)?;
            info!(
                event_name = "dispatch.agent.provisioned",
                channel = %request.channel,
                agent_id = %agent.agent_id,
                specialization = request.specialization.label(),
                "remote agent provisioned"
            );

            phase = transition(phase, DispatchEvent::CallPlaced).map_err(DomainError::from)?;
            let outcome = telephony.place(&app_id, &session_id, &destination).await;
            if !outcome.ok {
                phase =
                    transition(phase, DispatchEvent::CallRejected).map_err(DomainError::from)?;
                guards.release(&request.channel);
                let reason = outcome.reason.unwrap_or(CallFailureReason::Unknown);
                warn!(
                    event_name = "dispatch.call.failed",
                    channel = %request.channel,
                    agent_id = %agent.agent_id,
                    phase = ?phase,
                    reason = reason.code(),
                    detail = %outcome.detail,
                    "call placement failed; guard released for retry"
                );
                return Ok(DispatchOutcome::CallFailed {
                    agent_id: agent.agent_id,
                    phone: destination,
                    reason,
                    detail: outcome.detail,
                });
            }

            phase = transition(phase, DispatchEvent::CallBridged).map_err(DomainError::from)?;
            let session = AgentSession {
                agent_id: agent.agent_id.clone(),
                specialization: request.specialization,
                channel: request.channel.clone(),
                user_id: request.user_id.clone(),
                created_at: Utc::now(),
            };
            tracker.register(&session);
            info!(
                event_name = "dispatch.call.active",
                channel = %request.channel,
                agent_id = %agent.agent_id,
                destination = %destination,
                phase = ?phase,
                "outbound call placed; dispatch returning"
            );

            Ok(DispatchOutcome::Dispatched {
                agent_id: agent.agent_id,
                specialization: request.specialization,
                phone: destination,
            })
        }
    }
}

fn validate_request(request: &DispatchRequest) -> Option<String> {
    let name = request.fields.customer_name.trim();
    let name_lower = name.to_lowercase();
    if name.len() < 2 || PLACEHOLDER_NAMES.contains(&name_lower.as_str()) {
        return Some(
            "I need the customer's actual name before calling (at least two characters, not a \
             placeholder). What name should I use?"
                .to_owned(),
        );
    }

    match request.specialization {
        Specialization::Order => {
            if request.fields.items.iter().all(|item| item.trim().is_empty()) {
                return Some(
                    "An order needs at least one item. What should I order?".to_owned(),
                );
            }
            if request.fields.delivery_mode == DeliveryMode::Delivery
                && request.fields.address.as_deref().map(str::trim).unwrap_or("").is_empty()
            {
                return Some(
                    "A delivery order needs a delivery address. Where should it be delivered?"
                        .to_owned(),
                );
            }
        }
        Specialization::Reservation => {
            if request.fields.party_size.unwrap_or(0) == 0 {
                return Some(
                    "A reservation needs the party size. How many people should I book for?"
                        .to_owned(),
                );
            }
            if request.fields.time_preference.as_deref().map(str::trim).unwrap_or("").is_empty() {
                return Some(
                    "A reservation needs a time preference. When would you like the table?"
                        .to_owned(),
                );
            }
        }
        Specialization::Inquiry => {
            if request.fields.notes.as_deref().map(str::trim).unwrap_or("").is_empty() {
                return Some(
                    "An inquiry needs the question you want asked. What should I find out?"
                        .to_owned(),
                );
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use dialout_core::Specialization;

    use super::{validate_request, CustomerFields, DeliveryMode, DispatchRequest};

    fn order_request(name: &str) -> DispatchRequest {
        DispatchRequest {
            specialization: Specialization::Order,
            phone_number: "+15551234567".to_owned(),
            target_name: "Tony's Pizza".to_owned(),
            fields: CustomerFields {
                customer_name: name.to_owned(),
                items: vec!["large pepperoni".to_owned()],
                delivery_mode: DeliveryMode::Pickup,
                address: None,
                party_size: None,
                time_preference: None,
                notes: None,
            },
            channel: "c1".to_owned(),
            user_id: "u1".to_owned(),
            callback_number: None,
        }
    }

    #[test]
    fn placeholder_and_short_names_are_rejected_with_guidance() {
        for bad_name in ["", "x", "Customer", "JOHN DOE", " n/a "] {
            let guidance = validate_request(&order_request(bad_name))
                .unwrap_or_else(|| panic!("name `{bad_name}` should be rejected"));
            assert!(guidance.contains("name"));
        }

        assert!(validate_request(&order_request("Dana Smith")).is_none());
    }

    #[test]
    fn delivery_orders_require_an_address() {
        let mut request = order_request("Dana Smith");
        request.fields.delivery_mode = DeliveryMode::Delivery;

        let guidance = validate_request(&request).expect("missing address should be rejected");
        assert!(guidance.contains("address"));

        request.fields.address = Some("12 Elm St".to_owned());
        assert!(validate_request(&request).is_none());
    }

    #[test]
    fn orders_require_items() {
        let mut request = order_request("Dana Smith");
        request.fields.items = vec!["  ".to_owned()];

        let guidance = validate_request(&request).expect("empty items should be rejected");
        assert!(guidance.contains("item"));
    }

    #[test]
    fn reservations_require_party_size_and_time() {
        let mut request = order_request("Dana Smith");
        request.specialization = Specialization::Reservation;

        let guidance = validate_request(&request).expect("missing party size should be rejected");
        assert!(guidance.contains("party size"));

        request.fields.party_size = Some(4);
        let guidance = validate_request(&request).expect("missing time should be rejected");
        assert!(guidance.contains("time"));

        request.fields.time_preference = Some("7pm".to_owned());
        assert!(validate_request(&request).is_none());
    }

    #[test]
    fn inquiries_require_a_question() {
        let mut request = order_request("Dana Smith");
        request.specialization = Specialization::Inquiry;

        let guidance = validate_request(&request).expect("missing question should be rejected");
        assert!(guidance.contains("question"));

        request.fields.notes = Some("do you have outdoor seating?".to_owned());
        assert!(validate_request(&request).is_none());
    }
}
