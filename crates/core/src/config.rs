use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::directory::is_plausible_international;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub telephony: TelephonyConfig,
    pub agent_llm: AgentLlmConfig,
    pub speech: SpeechConfig,
    pub provisioning: ProvisioningConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct TelephonyConfig {
    pub account_id: Option<String>,
    pub api_key: Option<SecretString>,
    pub caller_number: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AgentLlmConfig {
    pub api_key: Option<SecretString>,
    pub model: String,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SpeechConfig {
    pub vendor: SpeechVendor,
    pub elevenlabs_api_key: Option<SecretString>,
    pub azure_api_key: Option<SecretString>,
    pub azure_region: Option<String>,
    pub voice: String,
}

#[derive(Clone, Debug)]
pub struct ProvisioningConfig {
    pub base_url: String,
    pub join_timeout_secs: u64,
    pub history_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechVendor {
    Elevenlabs,
    Azure,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub telephony_account_id: Option<String>,
    pub telephony_api_key: Option<String>,
    pub telephony_caller_number: Option<String>,
    pub agent_llm_api_key: Option<String>,
    pub speech_vendor_api_key: Option<String>,
    pub provisioning_base_url: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            telephony: TelephonyConfig { account_id: None, api_key: None, caller_number: None },
            agent_llm: AgentLlmConfig {
                api_key: None,
                model: "gpt-4o-mini".to_string(),
                base_url: None,
                timeout_secs: 30,
            },
            speech: SpeechConfig {
                vendor: SpeechVendor::Elevenlabs,
                elevenlabs_api_key: None,
                azure_api_key: None,
                azure_region: None,
                voice: "alloy".to_string(),
            },
            provisioning: ProvisioningConfig {
                base_url: "http://localhost:8700".to_string(),
                join_timeout_secs: 30,
                history_timeout_secs: 10,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for SpeechVendor {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "elevenlabs" => Ok(Self::Elevenlabs),
            "azure" => Ok(Self::Azure),
            other => Err(ConfigError::Validation(format!(
                "unsupported speech vendor `{other}` (expected elevenlabs|azure)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("dialout.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Every credential the dispatch path needs but does not have, named the
    /// way a config file names it. The lifecycle manager reports this list
    /// verbatim before taking any side effect.
    pub fn missing_dispatch_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();

        if is_missing(&self.telephony.account_id) {
            missing.push("telephony.account_id");
        }
        if is_missing_secret(&self.telephony.api_key) {
            missing.push("telephony.api_key");
        }
        if is_missing(&self.telephony.caller_number) {
            missing.push("telephony.caller_number");
        }
        if is_missing_secret(&self.agent_llm.api_key) {
            missing.push("agent_llm.api_key");
        }

        match self.speech.vendor {
            SpeechVendor::Elevenlabs => {
                if is_missing_secret(&self.speech.elevenlabs_api_key) {
                    missing.push("speech.elevenlabs_api_key");
                }
            }
            SpeechVendor::Azure => {
                if is_missing_secret(&self.speech.azure_api_key) {
                    missing.push("speech.azure_api_key");
                }
                if is_missing(&self.speech.azure_region) {
                    missing.push("speech.azure_region");
                }
            }
        }

        missing
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(telephony) = patch.telephony {
            if let Some(account_id) = telephony.account_id {
                self.telephony.account_id = Some(account_id);
            }
            if let Some(telephony_api_key_value) = telephony.api_key {
                self.telephony.api_key = Some(secret_value(telephony_api_key_value));
            }
            if let Some(caller_number) = telephony.caller_number {
                self.telephony.caller_number = Some(caller_number);
            }
        }

        if let Some(agent_llm) = patch.agent_llm {
            if let Some(agent_api_key_value) = agent_llm.api_key {
                self.agent_llm.api_key = Some(secret_value(agent_api_key_value));
            }
            if let Some(model) = agent_llm.model {
                self.agent_llm.model = model;
            }
            if let Some(base_url) = agent_llm.base_url {
                self.agent_llm.base_url = Some(base_url);
            }
            if let Some(timeout_secs) = agent_llm.timeout_secs {
                self.agent_llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(speech) = patch.speech {
            if let Some(vendor) = speech.vendor {
                self.speech.vendor = vendor;
            }
            if let Some(elevenlabs_api_key_value) = speech.elevenlabs_api_key {
                self.speech.elevenlabs_api_key = Some(secret_value(elevenlabs_api_key_value));
            }
            if let Some(azure_api_key_value) = speech.azure_api_key {
                self.speech.azure_api_key = Some(secret_value(azure_api_key_value));
            }
            if let Some(azure_region) = speech.azure_region {
                self.speech.azure_region = Some(azure_region);
            }
            if let Some(voice) = speech.voice {
                self.speech.voice = voice;
            }
        }

        if let Some(provisioning) = patch.provisioning {
            if let Some(base_url) = provisioning.base_url {
                self.provisioning.base_url = base_url;
            }
            if let Some(join_timeout_secs) = provisioning.join_timeout_secs {
                self.provisioning.join_timeout_secs = join_timeout_secs;
            }
            if let Some(history_timeout_secs) = provisioning.history_timeout_secs {
                self.provisioning.history_timeout_secs = history_timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("DIALOUT_TELEPHONY_ACCOUNT_ID") {
            self.telephony.account_id = Some(value);
        }
        if let Some(value) = read_env("DIALOUT_TELEPHONY_API_KEY") {
            self.telephony.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("DIALOUT_TELEPHONY_CALLER_NUMBER") {
            self.telephony.caller_number = Some(value);
        }

        if let Some(value) = read_env("DIALOUT_AGENT_LLM_API_KEY") {
            self.agent_llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("DIALOUT_AGENT_LLM_MODEL") {
            self.agent_llm.model = value;
        }
        if let Some(value) = read_env("DIALOUT_AGENT_LLM_BASE_URL") {
            self.agent_llm.base_url = Some(value);
        }
        if let Some(value) = read_env("DIALOUT_AGENT_LLM_TIMEOUT_SECS") {
            self.agent_llm.timeout_secs = parse_u64("DIALOUT_AGENT_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DIALOUT_SPEECH_VENDOR") {
            self.speech.vendor = value.parse()?;
        }
        if let Some(value) = read_env("DIALOUT_SPEECH_ELEVENLABS_API_KEY") {
            self.speech.elevenlabs_api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("DIALOUT_SPEECH_AZURE_API_KEY") {
            self.speech.azure_api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("DIALOUT_SPEECH_AZURE_REGION") {
            self.speech.azure_region = Some(value);
        }
        if let Some(value) = read_env("DIALOUT_SPEECH_VOICE") {
            self.speech.voice = value;
        }

        if let Some(value) = read_env("DIALOUT_PROVISIONING_BASE_URL") {
            self.provisioning.base_url = value;
        }
        if let Some(value) = read_env("DIALOUT_PROVISIONING_JOIN_TIMEOUT_SECS") {
            self.provisioning.join_timeout_secs =
                parse_u64("DIALOUT_PROVISIONING_JOIN_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("DIALOUT_PROVISIONING_HISTORY_TIMEOUT_SECS") {
            self.provisioning.history_timeout_secs =
                parse_u64("DIALOUT_PROVISIONING_HISTORY_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DIALOUT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("DIALOUT_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("DIALOUT_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("DIALOUT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("DIALOUT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("DIALOUT_LOGGING_LEVEL").or_else(|| read_env("DIALOUT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("DIALOUT_LOGGING_FORMAT").or_else(|| read_env("DIALOUT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(account_id) = overrides.telephony_account_id {
            self.telephony.account_id = Some(account_id);
        }
        if let Some(telephony_api_key) = overrides.telephony_api_key {
            self.telephony.api_key = Some(secret_value(telephony_api_key));
        }
        if let Some(caller_number) = overrides.telephony_caller_number {
            self.telephony.caller_number = Some(caller_number);
        }
        if let Some(agent_llm_api_key) = overrides.agent_llm_api_key {
            self.agent_llm.api_key = Some(secret_value(agent_llm_api_key));
        }
        if let Some(speech_vendor_api_key) = overrides.speech_vendor_api_key {
            match self.speech.vendor {
                SpeechVendor::Elevenlabs => {
                    self.speech.elevenlabs_api_key = Some(secret_value(speech_vendor_api_key));
                }
                SpeechVendor::Azure => {
                    self.speech.azure_api_key = Some(secret_value(speech_vendor_api_key));
                }
            }
        }
        if let Some(provisioning_base_url) = overrides.provisioning_base_url {
            self.provisioning.base_url = provisioning_base_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_telephony(&self.telephony)?;
        validate_agent_llm(&self.agent_llm)?;
        validate_provisioning(&self.provisioning)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn is_missing(value: &Option<String>) -> bool {
    value.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true)
}

fn is_missing_secret(value: &Option<SecretString>) -> bool {
    value.as_ref().map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true)
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("dialout.toml"), PathBuf::from("config/dialout.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_telephony(telephony: &TelephonyConfig) -> Result<(), ConfigError> {
    if let Some(caller_number) = &telephony.caller_number {
        if !is_plausible_international(caller_number) {
            return Err(ConfigError::Validation(format!(
                "telephony.caller_number `{caller_number}` must be an international number (`+` followed by 8-15 digits)"
            )));
        }
    }

    Ok(())
}

fn validate_agent_llm(agent_llm: &AgentLlmConfig) -> Result<(), ConfigError> {
    if agent_llm.timeout_secs == 0 || agent_llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "agent_llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if agent_llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("agent_llm.model must not be empty".to_string()));
    }

    Ok(())
}

fn validate_provisioning(provisioning: &ProvisioningConfig) -> Result<(), ConfigError> {
    let base_url = provisioning.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "provisioning.base_url must start with http:// or https://".to_string(),
        ));
    }

    if provisioning.join_timeout_secs == 0 || provisioning.join_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "provisioning.join_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if provisioning.history_timeout_secs == 0 || provisioning.history_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "provisioning.history_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    telephony: Option<TelephonyPatch>,
    agent_llm: Option<AgentLlmPatch>,
    speech: Option<SpeechPatch>,
    provisioning: Option<ProvisioningPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct TelephonyPatch {
    account_id: Option<String>,
    api_key: Option<String>,
    caller_number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentLlmPatch {
    api_key: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SpeechPatch {
    vendor: Option<SpeechVendor>,
    elevenlabs_api_key: Option<String>,
    azure_api_key: Option<String>,
    azure_region: Option<String>,
    voice: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProvisioningPatch {
    base_url: Option<String>,
    join_timeout_secs: Option<u64>,
    history_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
