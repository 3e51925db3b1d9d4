use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use dialout_agent::{HandlerRegistry, NoopCompletionClient, ToolCallDispatcher};
use dialout_core::config::{AppConfig, ConfigError, LoadOptions};
use dialout_core::{
    CallActionPolicy, DispatchGuardStore, InMemoryStore, PhoneDirectory, PhraseDeltaDetector,
};
use dialout_voice::{
    AgentLifecycleManager, DispatchSupervisor, HttpProvisioningApi, NoopTelephonyBridge,
    ScriptError, ScriptGenerator, StaticTokenIssuer, StatusTracker,
};

use crate::handlers::{default_registry, SearchProvider};

/// Prompt version whose tool names the default registry serves.
const REGISTRY_VERSION: &str = "v3";

const APP_ID: &str = "dialout";

pub struct Application {
    pub config: AppConfig,
    pub manager: Arc<AgentLifecycleManager>,
    pub tracker: Arc<StatusTracker>,
    pub registry: HandlerRegistry,
    pub dispatcher: ToolCallDispatcher,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("call script templates failed to load: {0}")]
    Scripts(#[from] ScriptError),
}

/// Search backend stand-in until a real provider is wired.
struct NoopSearchProvider;

#[async_trait::async_trait]
impl SearchProvider for NoopSearchProvider {
    async fn search(
        &self,
        _query: &str,
    ) -> anyhow::Result<Vec<dialout_core::BusinessSearchResult>> {
        Ok(Vec::new())
    }
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        channel = "bootstrap",
        "starting application bootstrap"
    );

    let guards = DispatchGuardStore::in_memory();
    let directory = PhoneDirectory::in_memory();
    let policy = CallActionPolicy::in_memory();
    let provisioning = Arc::new(HttpProvisioningApi::from_config(&config.provisioning));

    let tracker = Arc::new(StatusTracker::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(InMemoryStore::new()),
        Arc::new(InMemoryStore::new()),
        guards.clone(),
        provisioning.clone(),
        Arc::new(PhraseDeltaDetector::default()),
    ));

    let manager = Arc::new(AgentLifecycleManager::new(
        APP_ID,
        config.clone(),
        directory.clone(),
        guards.clone(),
        policy.clone(),
        provisioning,
        Arc::new(NoopTelephonyBridge),
        Arc::new(StaticTokenIssuer::new(APP_ID)),
        Arc::new(ScriptGenerator::new()?),
        DispatchSupervisor::in_memory(guards),
        tracker.clone(),
    ));

    let registry = default_registry(
        REGISTRY_VERSION,
        manager.clone(),
        tracker.clone(),
        policy,
        directory,
        NoopSearchProvider,
    );
    let dispatcher = ToolCallDispatcher::new(Arc::new(NoopCompletionClient));

    info!(
        event_name = "system.bootstrap.ready",
        channel = "bootstrap",
        registry_version = REGISTRY_VERSION,
        registered_tools = registry.len(),
        missing_credentials = config.missing_dispatch_credentials().len(),
        "application components wired"
    );

    Ok(Application { config, manager, tracker, registry, dispatcher })
}
