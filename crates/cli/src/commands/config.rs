use std::env;
use std::fs;
use std::path::Path;

use confguide_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Field {
    fn new(key: &'static str, value: impl Into<String>, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.into(), env_keys }
    }
}

pub fn run() -> String {
    render(LoadOptions::default())
}

pub fn render(options: LoadOptions) -> String {
    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_key(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    let history_window = config
        .assistant
        .history_window_turns
        .map(|turns| turns.to_string())
        .unwrap_or_else(|| "<unbounded>".to_string());

    vec![
        Field::new("app_env", format!("{:?}", config.app_env), &["CONFGUIDE_APP_ENV"]),
        Field::new(
            "llm.provider",
            format!("{:?}", config.llm.provider),
            &["CONFGUIDE_LLM_PROVIDER"],
        ),
        Field::new("llm.api_key", api_key, &["CONFGUIDE_LLM_API_KEY", "OPENAI_API_KEY"]),
        Field::new("llm.base_url", config.llm.base_url.clone(), &["CONFGUIDE_LLM_BASE_URL"]),
        Field::new("llm.model", config.llm.model.clone(), &["CONFGUIDE_LLM_MODEL"]),
        Field::new(
            "llm.temperature",
            config.llm.temperature.to_string(),
            &["CONFGUIDE_LLM_TEMPERATURE"],
        ),
        Field::new(
            "llm.max_tokens",
            config.llm.max_tokens.to_string(),
            &["CONFGUIDE_LLM_MAX_TOKENS"],
        ),
        Field::new("llm.top_p", config.llm.top_p.to_string(), &["CONFGUIDE_LLM_TOP_P"]),
        Field::new(
            "llm.timeout_secs",
            config.llm.timeout_secs.to_string(),
            &["CONFGUIDE_LLM_TIMEOUT_SECS"],
        ),
        Field::new(
            "llm.max_agent_turns",
            config.llm.max_agent_turns.to_string(),
            &["CONFGUIDE_LLM_MAX_AGENT_TURNS"],
        ),
        Field::new(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["CONFGUIDE_SERVER_BIND_ADDRESS"],
        ),
        Field::new("server.port", config.server.port.to_string(), &["CONFGUIDE_SERVER_PORT"]),
        Field::new(
            "server.allowed_origins",
            config.server.allowed_origins.join(","),
            &["CONFGUIDE_SERVER_ALLOWED_ORIGINS"],
        ),
        Field::new(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["CONFGUIDE_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        Field::new(
            "storage.data_dir",
            config.storage.data_dir.display().to_string(),
            &["CONFGUIDE_STORAGE_DATA_DIR"],
        ),
        Field::new(
            "storage.chat_file",
            config.storage.chat_file.clone(),
            &["CONFGUIDE_STORAGE_CHAT_FILE"],
        ),
        Field::new(
            "storage.user_file",
            config.storage.user_file.clone(),
            &["CONFGUIDE_STORAGE_USER_FILE"],
        ),
        Field::new("assistant.name", config.assistant.name.clone(), &["CONFGUIDE_ASSISTANT_NAME"]),
        Field::new(
            "assistant.instructions_path",
            config.assistant.instructions_path.display().to_string(),
            &["CONFGUIDE_ASSISTANT_INSTRUCTIONS_PATH"],
        ),
        Field::new(
            "assistant.agenda_path",
            config.assistant.agenda_path.display().to_string(),
            &["CONFGUIDE_ASSISTANT_AGENDA_PATH"],
        ),
        Field::new("assistant.workflow_name", config.assistant.workflow_name.clone(), &[]),
        Field::new("assistant.default_group_id", config.assistant.default_group_id.clone(), &[]),
        Field::new(
            "assistant.guardrail_enabled",
            config.assistant.guardrail_enabled.to_string(),
            &["CONFGUIDE_ASSISTANT_GUARDRAIL_ENABLED"],
        ),
        Field::new(
            "assistant.history_window_turns",
            history_window,
            &["CONFGUIDE_ASSISTANT_HISTORY_WINDOW_TURNS"],
        ),
        Field::new(
            "logging.level",
            config.logging.level.clone(),
            &["CONFGUIDE_LOGGING_LEVEL", "CONFGUIDE_LOG_LEVEL"],
        ),
        Field::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["CONFGUIDE_LOGGING_FORMAT", "CONFGUIDE_LOG_FORMAT"],
        ),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the key family prefix (`sk-`) and hides the rest.
fn redact_key(key: &str) -> String {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
