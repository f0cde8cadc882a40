use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "confguide.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub app_env: AppEnv,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub assistant: AssistantConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub timeout_secs: u64,
    pub max_agent_turns: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub chat_file: String,
    pub user_file: String,
}

impl StorageConfig {
    pub fn chat_path(&self) -> PathBuf {
        self.data_dir.join(&self.chat_file)
    }

    pub fn user_path(&self) -> PathBuf {
        self.data_dir.join(&self.user_file)
    }
}

#[derive(Clone, Debug)]
pub struct AssistantConfig {
    pub name: String,
    pub instructions_path: PathBuf,
    pub agenda_path: PathBuf,
    pub workflow_name: String,
    pub default_group_id: String,
    pub guardrail_enabled: bool,
    /// Number of most recent user turns replayed to the agent. `None` replays everything.
    pub history_window_turns: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppEnv {
    Development,
    Production,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Ollama,
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
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub server_port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub guardrail_enabled: Option<bool>,
    pub history_window_turns: Option<usize>,
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
            app_env: AppEnv::Development,
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                api_key: None,
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4.1".to_string(),
                temperature: 1.0,
                max_tokens: 2048,
                top_p: 1.0,
                timeout_secs: 60,
                max_agent_turns: 10,
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 8000,
                allowed_origins: vec!["*".to_string()],
                graceful_shutdown_secs: 15,
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("."),
                chat_file: "chats.json".to_string(),
                user_file: "user.json".to_string(),
            },
            assistant: AssistantConfig {
                name: "VivaTech 2025 Assistant".to_string(),
                instructions_path: PathBuf::from("instructions.txt"),
                agenda_path: PathBuf::from("data/vivatech_agenda.md"),
                workflow_name: "VivaTechConversation".to_string(),
                default_group_id: "default".to_string(),
                guardrail_enabled: true,
                history_window_turns: None,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for AppEnv {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ConfigError::Validation(format!(
                "unsupported app_env `{other}` (expected development|production)"
            ))),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
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

impl LlmConfig {
    pub fn api_key_configured(&self) -> bool {
        self.api_key.as_ref().map(|key| !key.expose_secret().trim().is_empty()).unwrap_or(false)
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(app_env) = patch.app_env {
            self.app_env = app_env;
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(top_p) = llm.top_p {
                self.llm.top_p = top_p;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_agent_turns) = llm.max_agent_turns {
                self.llm.max_agent_turns = max_agent_turns;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(allowed_origins) = server.allowed_origins {
                self.server.allowed_origins = allowed_origins;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(storage) = patch.storage {
            if let Some(data_dir) = storage.data_dir {
                self.storage.data_dir = data_dir;
            }
            if let Some(chat_file) = storage.chat_file {
                self.storage.chat_file = chat_file;
            }
            if let Some(user_file) = storage.user_file {
                self.storage.user_file = user_file;
            }
        }

        if let Some(assistant) = patch.assistant {
            if let Some(name) = assistant.name {
                self.assistant.name = name;
            }
            if let Some(instructions_path) = assistant.instructions_path {
                self.assistant.instructions_path = instructions_path;
            }
            if let Some(agenda_path) = assistant.agenda_path {
                self.assistant.agenda_path = agenda_path;
            }
            if let Some(workflow_name) = assistant.workflow_name {
                self.assistant.workflow_name = workflow_name;
            }
            if let Some(default_group_id) = assistant.default_group_id {
                self.assistant.default_group_id = default_group_id;
            }
            if let Some(guardrail_enabled) = assistant.guardrail_enabled {
                self.assistant.guardrail_enabled = guardrail_enabled;
            }
            if let Some(history_window_turns) = assistant.history_window_turns {
                self.assistant.history_window_turns = Some(history_window_turns);
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
        if let Some(value) = read_env("CONFGUIDE_APP_ENV") {
            self.app_env = value.parse()?;
        }

        if let Some(value) = read_env("CONFGUIDE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        let api_key = read_env("CONFGUIDE_LLM_API_KEY").or_else(|| read_env("OPENAI_API_KEY"));
        if let Some(value) = api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("CONFGUIDE_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("CONFGUIDE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("CONFGUIDE_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f32("CONFGUIDE_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("CONFGUIDE_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("CONFGUIDE_LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("CONFGUIDE_LLM_TOP_P") {
            self.llm.top_p = parse_f32("CONFGUIDE_LLM_TOP_P", &value)?;
        }
        if let Some(value) = read_env("CONFGUIDE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("CONFGUIDE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CONFGUIDE_LLM_MAX_AGENT_TURNS") {
            self.llm.max_agent_turns = parse_u32("CONFGUIDE_LLM_MAX_AGENT_TURNS", &value)?;
        }

        if let Some(value) = read_env("CONFGUIDE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CONFGUIDE_SERVER_PORT") {
            self.server.port = parse_u16("CONFGUIDE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CONFGUIDE_SERVER_ALLOWED_ORIGINS") {
            self.server.allowed_origins = value
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = read_env("CONFGUIDE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CONFGUIDE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("CONFGUIDE_STORAGE_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("CONFGUIDE_STORAGE_CHAT_FILE") {
            self.storage.chat_file = value;
        }
        if let Some(value) = read_env("CONFGUIDE_STORAGE_USER_FILE") {
            self.storage.user_file = value;
        }

        if let Some(value) = read_env("CONFGUIDE_ASSISTANT_NAME") {
            self.assistant.name = value;
        }
        if let Some(value) = read_env("CONFGUIDE_ASSISTANT_INSTRUCTIONS_PATH") {
            self.assistant.instructions_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("CONFGUIDE_ASSISTANT_AGENDA_PATH") {
            self.assistant.agenda_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("CONFGUIDE_ASSISTANT_GUARDRAIL_ENABLED") {
            self.assistant.guardrail_enabled =
                parse_bool("CONFGUIDE_ASSISTANT_GUARDRAIL_ENABLED", &value)?;
        }
        if let Some(value) = read_env("CONFGUIDE_ASSISTANT_HISTORY_WINDOW_TURNS") {
            self.assistant.history_window_turns =
                Some(parse_usize("CONFGUIDE_ASSISTANT_HISTORY_WINDOW_TURNS", &value)?);
        }

        let log_level =
            read_env("CONFGUIDE_LOGGING_LEVEL").or_else(|| read_env("CONFGUIDE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CONFGUIDE_LOGGING_FORMAT").or_else(|| read_env("CONFGUIDE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(data_dir) = overrides.data_dir {
            self.storage.data_dir = data_dir;
        }
        if let Some(guardrail_enabled) = overrides.guardrail_enabled {
            self.assistant.guardrail_enabled = guardrail_enabled;
        }
        if let Some(history_window_turns) = overrides.history_window_turns {
            self.assistant.history_window_turns = Some(history_window_turns);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_storage(&self.storage)?;
        validate_assistant(&self.assistant)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Returns the config file `AppConfig::load` would read, if any.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(CONFIG_FILE_NAME), PathBuf::from("config").join(CONFIG_FILE_NAME)]
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

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if llm.max_agent_turns == 0 {
        return Err(ConfigError::Validation(
            "llm.max_agent_turns must be greater than zero".to_string(),
        ));
    }

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&llm.top_p) {
        return Err(ConfigError::Validation("llm.top_p must be in range 0.0..=1.0".to_string()));
    }

    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }

    let base_url = llm.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    // A missing OpenAI key is reported through /health rather than refusing to boot,
    // so the chat history endpoints stay usable.
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    if server.allowed_origins.is_empty() {
        return Err(ConfigError::Validation(
            "server.allowed_origins must list at least one origin (use `*` to allow any)"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    if storage.chat_file.trim().is_empty() || storage.user_file.trim().is_empty() {
        return Err(ConfigError::Validation(
            "storage.chat_file and storage.user_file must not be empty".to_string(),
        ));
    }

    if storage.chat_file == storage.user_file {
        return Err(ConfigError::Validation(
            "storage.chat_file and storage.user_file must point at different files".to_string(),
        ));
    }

    Ok(())
}

fn validate_assistant(assistant: &AssistantConfig) -> Result<(), ConfigError> {
    if assistant.name.trim().is_empty() {
        return Err(ConfigError::Validation("assistant.name must not be empty".to_string()));
    }

    if assistant.default_group_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "assistant.default_group_id must not be empty".to_string(),
        ));
    }

    if assistant.history_window_turns == Some(0) {
        return Err(ConfigError::Validation(
            "assistant.history_window_turns must be greater than zero when set".to_string(),
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

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    app_env: Option<AppEnv>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    storage: Option<StoragePatch>,
    assistant: Option<AssistantPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    top_p: Option<f32>,
    timeout_secs: Option<u64>,
    max_agent_turns: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    allowed_origins: Option<Vec<String>>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    data_dir: Option<PathBuf>,
    chat_file: Option<String>,
    user_file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AssistantPatch {
    name: Option<String>,
    instructions_path: Option<PathBuf>,
    agenda_path: Option<PathBuf>,
    workflow_name: Option<String>,
    default_group_id: Option<String>,
    guardrail_enabled: Option<bool>,
    history_window_turns: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const MANAGED_VARS: &[&str] = &[
        "OPENAI_API_KEY",
        "CONFGUIDE_LLM_API_KEY",
        "CONFGUIDE_LLM_PROVIDER",
        "CONFGUIDE_LOG_LEVEL",
        "CONFGUIDE_LOG_FORMAT",
        "CONFGUIDE_SERVER_PORT",
        "CONFGUIDE_SERVER_ALLOWED_ORIGINS",
        "CONFGUIDE_ASSISTANT_HISTORY_WINDOW_TURNS",
        "TEST_CONFGUIDE_API_KEY",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_match_the_conference_deployment() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.server.port == 8000, "default port should be 8000")?;
        ensure(config.llm.model == "gpt-4.1", "default model should be gpt-4.1")?;
        ensure(config.assistant.default_group_id == "default", "default group id")?;
        ensure(config.assistant.history_window_turns.is_none(), "replay is unbounded by default")?;
        ensure(config.storage.chat_path() == PathBuf::from("./chats.json"), "chat path")?;
        ensure(!config.llm.api_key_configured(), "no api key by default")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        env::set_var("TEST_CONFGUIDE_API_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("confguide.toml");
            fs::write(
                &path,
                r#"
[llm]
api_key = "${TEST_CONFGUIDE_API_KEY}"
model = "gpt-4.1-mini"

[assistant]
history_window_turns = 6
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "api key should be interpolated from environment",
            )?;
            ensure(config.llm.model == "gpt-4.1-mini", "model should come from file")?;
            ensure(config.assistant.history_window_turns == Some(6), "window from file")
        })();

        clear_vars(&["TEST_CONFGUIDE_API_KEY"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        env::set_var("CONFGUIDE_SERVER_PORT", "9100");
        env::set_var("CONFGUIDE_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("confguide.toml");
            fs::write(
                &path,
                r#"
[server]
port = 9000
allowed_origins = ["http://localhost:5173"]

[logging]
level = "warn"
format = "pretty"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.server.port == 9100, "env port should win over file")?;
            ensure(
                config.server.allowed_origins == vec!["http://localhost:5173".to_string()],
                "origins should come from file",
            )?;
            ensure(config.logging.level == "debug", "override log level should win")?;
            ensure(matches!(config.logging.format, LogFormat::Json), "env format should win")
        })();

        clear_vars(&["CONFGUIDE_SERVER_PORT", "CONFGUIDE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn openai_key_falls_back_to_standard_variable() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        env::set_var("OPENAI_API_KEY", "sk-standard");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.llm.api_key_configured(), "OPENAI_API_KEY should configure the key")?;
            ensure(config.llm.provider == LlmProvider::OpenAi, "provider stays openai")
        })();

        clear_vars(&["OPENAI_API_KEY"]);
        result
    }

    #[test]
    fn invalid_env_override_is_reported_with_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        env::set_var("CONFGUIDE_ASSISTANT_HISTORY_WINDOW_TURNS", "lots");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected override failure but load succeeded".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::InvalidEnvOverride { ref key, .. }
                        if key == "CONFGUIDE_ASSISTANT_HISTORY_WINDOW_TURNS"
                ),
                "invalid override should name the variable",
            )
        })();

        clear_vars(&["CONFGUIDE_ASSISTANT_HISTORY_WINDOW_TURNS"]);
        result
    }

    #[test]
    fn zero_history_window_fails_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        let error = match AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                history_window_turns: Some(0),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected validation failure".to_string()),
            Err(error) => error,
        };

        ensure(
            matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("history_window_turns")
            ),
            "validation failure should mention history_window_turns",
        )
    }

    #[test]
    fn missing_required_file_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = AppConfig::load(LoadOptions {
            config_path: Some(PathBuf::from("/definitely/not/here/confguide.toml")),
            require_file: true,
            ..LoadOptions::default()
        });

        ensure(
            matches!(result, Err(ConfigError::MissingConfigFile(_))),
            "missing required file should be an explicit error",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        env::set_var("CONFGUIDE_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")
        })();

        clear_vars(&["CONFGUIDE_LLM_API_KEY"]);
        result
    }
}
