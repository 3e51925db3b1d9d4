use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Conversation scope a tool executes under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolContext {
    pub app_id: String,
    pub user_id: String,
    pub channel: String,
}

/// Whether a tool's result is a short confirmation or substantive content for
/// the model to reason over. Both classes are fed back and re-prompted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolResultClass {
    Affirmation,
    Data,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ToolProfile {
    pub class: ToolResultClass,
    /// Call-initiating tools get the redundant-call suppression scan before
    /// their handler runs.
    pub initiates_call: bool,
}

impl ToolProfile {
    pub fn affirmation() -> Self {
        Self { class: ToolResultClass::Affirmation, initiates_call: false }
    }

    pub fn data() -> Self {
        Self { class: ToolResultClass::Data, initiates_call: false }
    }

    pub fn call_initiating() -> Self {
        Self { class: ToolResultClass::Affirmation, initiates_call: true }
    }
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, ctx: &ToolContext, args: Value) -> Result<String>;
}

/// Name → handler map for one prompt version. The registry for the active
/// version is injected into the dispatcher per turn.
pub struct HandlerRegistry {
    version: String,
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    profiles: HashMap<String, ToolProfile>,
}

impl HandlerRegistry {
    pub fn new(version: impl Into<String>) -> Self {
        Self { version: version.into(), handlers: HashMap::new(), profiles: HashMap::new() }
    }

    pub fn register<H>(&mut self, name: impl Into<String>, profile: ToolProfile, handler: H)
    where
        H: ToolHandler + 'static,
    {
        let name = name.into();
        self.profiles.insert(name.clone(), profile);
        self.handlers.insert(name, Arc::new(handler));
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn handler(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn profile(&self, name: &str) -> Option<ToolProfile> {
        self.profiles.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
