//! Tool handlers bridging the model-facing dispatcher to the voice
//! orchestration components, plus the default registry wiring.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use dialout_agent::{HandlerRegistry, ToolContext, ToolHandler, ToolProfile};
use dialout_core::{BusinessSearchResult, CallAction, CallActionPolicy, PhoneDirectory, Specialization};
use dialout_voice::{
    AgentLifecycleManager, CustomerFields, DeliveryMode, DispatchRequest, StatusTracker,
    PHONE_AUTO_RESOLVE,
};

/// Restaurant/business lookup backend. External to this system; only
/// `{id, name, phone}` cross into the phone directory.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<BusinessSearchResult>>;
}

fn default_phone() -> String {
    PHONE_AUTO_RESOLVE.to_owned()
}

#[derive(Debug, Deserialize)]
struct PlaceCallArgs {
    #[serde(default)]
    target_name: String,
    #[serde(default = "default_phone")]
    phone_number: String,
    #[serde(default)]
    customer_name: String,
    #[serde(default)]
    items: Vec<String>,
    #[serde(default)]
    delivery_mode: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    party_size: Option<u32>,
    #[serde(default)]
    time_preference: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    callback_number: Option<String>,
}

impl PlaceCallArgs {
    fn into_request(self, specialization: Specialization, ctx: &ToolContext) -> DispatchRequest {
        let delivery_mode = match self.delivery_mode.as_deref() {
            Some(mode) if mode.eq_ignore_ascii_case("delivery") => DeliveryMode::Delivery,
            _ => DeliveryMode::Pickup,
        };

        DispatchRequest {
            specialization,
            phone_number: self.phone_number,
            target_name: self.target_name,
            fields: CustomerFields {
                customer_name: self.customer_name,
                items: self.items,
                delivery_mode,
                address: self.address,
                party_size: self.party_size,
                time_preference: self.time_preference,
                notes: self.notes,
            },
            channel: ctx.channel.clone(),
            user_id: ctx.user_id.clone(),
            callback_number: self.callback_number,
        }
    }
}

/// Dispatches a voice agent for one specialization.
pub struct PlaceCallHandler {
    manager: Arc<AgentLifecycleManager>,
    specialization: Specialization,
}

impl PlaceCallHandler {
    pub fn new(manager: Arc<AgentLifecycleManager>, specialization: Specialization) -> Self {
        Self { manager, specialization }
    }
}

#[async_trait]
impl ToolHandler for PlaceCallHandler {
    async fn handle(&self, ctx: &ToolContext, args: Value) -> Result<String> {
        let args: PlaceCallArgs = serde_json::from_value(args)?;
        let request = args.into_request(self.specialization, ctx);
        let outcome = self.manager.dispatch_agent(request).await;
        Ok(outcome.reply())
    }
}

#[derive(Debug, Deserialize)]
struct CallStatusArgs {
    #[serde(default)]
    agent_id: Option<String>,
}

pub struct CallStatusHandler {
    tracker: Arc<StatusTracker>,
}

impl CallStatusHandler {
    pub fn new(tracker: Arc<StatusTracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl ToolHandler for CallStatusHandler {
    async fn handle(&self, ctx: &ToolContext, args: Value) -> Result<String> {
        let args: CallStatusArgs = serde_json::from_value(args)?;
        Ok(self
            .tracker
            .latest_status(&ctx.user_id, &ctx.channel, args.agent_id.as_deref())
            .await)
    }
}

#[derive(Debug, Deserialize)]
struct StopCallArgs {
    #[serde(default)]
    agent_id: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

pub struct StopCallHandler {
    tracker: Arc<StatusTracker>,
}

impl StopCallHandler {
    pub fn new(tracker: Arc<StatusTracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl ToolHandler for StopCallHandler {
    async fn handle(&self, ctx: &ToolContext, args: Value) -> Result<String> {
        let args: StopCallArgs = serde_json::from_value(args)?;
        Ok(self.tracker.stop(&ctx.channel, args.agent_id.as_deref(), args.reason.as_deref()))
    }
}

#[derive(Debug, Deserialize)]
struct CallActionArgs {
    #[serde(default)]
    action: String,
}

pub struct CallActionHandler {
    policy: CallActionPolicy,
}

impl CallActionHandler {
    pub fn new(policy: CallActionPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl ToolHandler for CallActionHandler {
    async fn handle(&self, ctx: &ToolContext, args: Value) -> Result<String> {
        let args: CallActionArgs = serde_json::from_value(args)?;
        let action = match args.action.trim().to_ascii_lowercase().as_str() {
            "call_user_first" | "call me first" => CallAction::CallUserFirst,
            _ => CallAction::CallBusiness,
        };
        self.policy.set(&ctx.channel, action);
        Ok(format!(
            "Got it. Calls for this conversation will use the `{}` routing for the next hour.",
            action.label()
        ))
    }
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    #[serde(default)]
    query: String,
}

/// Runs the external search and feeds `{id, name, phone}` into the phone
/// directory so later dispatches can resolve numbers by name.
pub struct SearchHandler<S> {
    provider: S,
    directory: PhoneDirectory,
}

impl<S> SearchHandler<S>
where
    S: SearchProvider,
{
    pub fn new(provider: S, directory: PhoneDirectory) -> Self {
        Self { provider, directory }
    }
}

#[async_trait]
impl<S> ToolHandler for SearchHandler<S>
where
    S: SearchProvider + 'static,
{
    async fn handle(&self, ctx: &ToolContext, args: Value) -> Result<String> {
        let args: SearchArgs = serde_json::from_value(args)?;
        let results = self.provider.search(&args.query).await?;
        self.directory.record_results(&ctx.user_id, &results);

        if results.is_empty() {
            return Ok(format!("No businesses found for \"{}\".", args.query));
        }

        let listing = results
            .iter()
            .map(|result| format!("- {} ({})", result.name, result.phone))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(format!("Found {} businesses:\n{listing}", results.len()))
    }
}

/// Registry wiring for the current prompt version.
pub fn default_registry<S>(
    version: &str,
    manager: Arc<AgentLifecycleManager>,
    tracker: Arc<StatusTracker>,
    policy: CallActionPolicy,
    directory: PhoneDirectory,
    search: S,
) -> HandlerRegistry
where
    S: SearchProvider + 'static,
{
    let mut registry = HandlerRegistry::new(version);
    registry.register(
        "place_order",
        ToolProfile::call_initiating(),
        PlaceCallHandler::new(manager.clone(), Specialization::Order),
    );
    registry.register(
        "make_reservation",
        ToolProfile::call_initiating(),
        PlaceCallHandler::new(manager.clone(), Specialization::Reservation),
    );
    registry.register(
        "make_inquiry_call",
        ToolProfile::call_initiating(),
        PlaceCallHandler::new(manager, Specialization::Inquiry),
    );
    registry.register("search_restaurants", ToolProfile::data(), SearchHandler::new(search, directory));
    registry.register("get_call_status", ToolProfile::data(), CallStatusHandler::new(tracker.clone()));
    registry.register("stop_call", ToolProfile::affirmation(), StopCallHandler::new(tracker));
    registry.register("set_call_action", ToolProfile::affirmation(), CallActionHandler::new(policy));
    registry
}
