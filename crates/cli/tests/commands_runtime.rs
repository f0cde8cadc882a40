use std::env;
use std::fs;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use confguide_agent::agents::Agent;
use confguide_agent::{AgentInput, AgentRunner, ConversationService, InputItem, RunError, RunResult};
use confguide_cli::commands::{chat, config, doctor, CommandResult};
use confguide_core::config::{AppConfig, LoadOptions};
use serde_json::{json, Value};

#[test]
fn config_redacts_api_key_and_names_env_source() {
    with_env(&[("CONFGUIDE_LLM_API_KEY", "sk-proj-topsecret")], || {
        let output = config::run();

        assert!(output.starts_with("effective config"));
        assert!(output
            .contains("- llm.api_key = sk-*** (source: env (CONFGUIDE_LLM_API_KEY))"));
        assert!(!output.contains("topsecret"));
        assert!(output.contains("- server.port = 8000 (source: default)"));
    });
}

#[test]
fn config_falls_back_to_openai_api_key_variable() {
    with_env(&[("OPENAI_API_KEY", "sk-legacy")], || {
        let output = config::run();
        assert!(output.contains("- llm.api_key = sk-*** (source: env (OPENAI_API_KEY))"));
    });
}

#[test]
fn config_attributes_values_read_from_file() {
    with_env(&[], || {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("confguide.toml");
        fs::write(&path, "[llm]\nmodel = \"gpt-4o-mini\"\n\n[assistant]\nname = \"Booth Bot\"\n")
            .expect("write config");

        let output = config::render(LoadOptions {
            config_path: Some(path.clone()),
            require_file: true,
            ..LoadOptions::default()
        });

        let file_source = format!("(source: file ({}))", path.display());
        assert!(output.contains(&format!("- llm.model = gpt-4o-mini {file_source}")));
        assert!(output.contains(&format!("- assistant.name = Booth Bot {file_source}")));
        assert!(output.contains("- llm.api_key = <unset> (source: default)"));
    });
}

#[test]
fn config_reports_validation_failure() {
    with_env(&[("CONFGUIDE_ASSISTANT_HISTORY_WINDOW_TURNS", "0")], || {
        let output = config::run();
        assert!(output.starts_with("config validation failed"));
        assert!(output.contains("history_window_turns"));
    });
}

#[test]
fn doctor_passes_when_files_and_key_are_present() {
    let dir = tempfile::tempdir().expect("tempdir");
    let instructions = dir.path().join("instructions.txt");
    let agenda = dir.path().join("agenda.md");
    fs::write(&instructions, "You help VivaTech attendees.").expect("write instructions");
    fs::write(&agenda, "# Day 1\n- 09:00 Opening keynote\n").expect("write agenda");
    let data_dir = dir.path().display().to_string();
    let instructions = instructions.display().to_string();
    let agenda = agenda.display().to_string();

    with_env(
        &[
            ("CONFGUIDE_LLM_API_KEY", "sk-test"),
            ("CONFGUIDE_STORAGE_DATA_DIR", &data_dir),
            ("CONFGUIDE_ASSISTANT_INSTRUCTIONS_PATH", &instructions),
            ("CONFGUIDE_ASSISTANT_AGENDA_PATH", &agenda),
        ],
        || {
            let result = doctor::run(true);
            assert_eq!(result.exit_code, 0, "expected all checks to pass: {}", result.output);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["overall_status"], "pass");
            let statuses = check_statuses(&payload);
            assert_eq!(
                statuses,
                vec![
                    ("config_validation".to_string(), "pass".to_string()),
                    ("llm_credentials".to_string(), "pass".to_string()),
                    ("instructions_file".to_string(), "pass".to_string()),
                    ("agenda_file".to_string(), "pass".to_string()),
                    ("storage_directory".to_string(), "pass".to_string()),
                ]
            );
        },
    );
}

#[test]
fn doctor_fails_on_missing_agenda_and_warns_on_missing_instructions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = dir.path().display().to_string();
    let instructions = dir.path().join("missing-instructions.txt").display().to_string();
    let agenda = dir.path().join("missing-agenda.md").display().to_string();

    with_env(
        &[
            ("CONFGUIDE_LLM_API_KEY", "sk-test"),
            ("CONFGUIDE_STORAGE_DATA_DIR", &data_dir),
            ("CONFGUIDE_ASSISTANT_INSTRUCTIONS_PATH", &instructions),
            ("CONFGUIDE_ASSISTANT_AGENDA_PATH", &agenda),
        ],
        || {
            let result = doctor::run(true);
            assert_eq!(result.exit_code, 1);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["overall_status"], "fail");
            let statuses = check_statuses(&payload);
            assert!(statuses.contains(&("instructions_file".to_string(), "warn".to_string())));
            assert!(statuses.contains(&("agenda_file".to_string(), "fail".to_string())));
        },
    );
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[("CONFGUIDE_SERVER_PORT", "0")], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 1);

        let lines: Vec<&str> = result.output.lines().collect();
        assert_eq!(lines[0], "doctor: one or more readiness checks failed");
        assert!(lines[1].starts_with("- [fail] config_validation:"));
        assert_eq!(lines.iter().filter(|line| line.starts_with("- [skip]")).count(), 4);
    });
}

#[test]
fn doctor_flags_missing_api_key() {
    with_env(&[], || {
        let result = doctor::run(true);
        let payload = parse_payload(&result.output);
        let statuses = check_statuses(&payload);
        assert!(statuses.contains(&("llm_credentials".to_string(), "fail".to_string())));
        assert_eq!(result.exit_code, 1);
    });
}

#[test]
fn status_line_carries_chat_details() {
    let finished = CommandResult::finished(
        "chat",
        "conversation `booth-42` ended after 2 turn(s)",
        Some(json!({ "group_id": "booth-42", "turns": 2 })),
    );
    assert_eq!(finished.exit_code, 0);
    let payload = parse_payload(&finished.output);
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["details"]["turns"], 2);
    assert!(payload.get("error_class").is_none());

    let failed = CommandResult::failure("chat", "config_validation", "bad port", 2);
    assert_eq!(failed.exit_code, 2);
    let payload = parse_payload(&failed.output);
    assert_eq!(payload["status"], "error");
    assert_eq!(payload["error_class"], "config_validation");
    assert!(payload.get("details").is_none());
}

#[test]
fn exit_words_end_the_chat() {
    for prompt in ["quit", "EXIT", " bye ", "", "   "] {
        assert!(chat::is_exit(prompt), "`{prompt}` should end the chat");
    }
    assert!(!chat::is_exit("exit strategies for startups"));
}

#[tokio::test]
async fn chat_answers_until_an_exit_word() {
    let service = service_with(ScriptedRunner::default());
    let input: &[u8] = b"Which keynotes are on day one?\nAnd on day two?\nbye\nnever sent\n";
    let mut output = Vec::new();

    let turns =
        chat::converse(&service, "booth-42", input, &mut output).await.expect("conversation");
    let transcript = String::from_utf8(output).expect("utf8");

    assert_eq!(turns, 2);
    assert!(transcript.contains("VivaTech 2025 Assistant: echo: Which keynotes are on day one?"));
    assert!(transcript.contains("VivaTech 2025 Assistant: echo: And on day two?"));
    assert!(transcript.ends_with("Goodbye!\n"));
    assert!(!transcript.contains("never sent"));
    assert_eq!(service.active_conversations(), vec!["booth-42".to_string()]);
    assert_eq!(service.conversation_history("booth-42").len(), 4);
}

#[tokio::test]
async fn chat_stops_at_end_of_input() {
    let service = service_with(ScriptedRunner::default());
    let input: &[u8] = b"hello";
    let mut output = Vec::new();

    let turns = chat::converse(&service, "default", input, &mut output).await.expect("chat");
    assert_eq!(turns, 1);
}

#[tokio::test]
async fn chat_surfaces_execution_errors() {
    let service = service_with(ScriptedRunner { failing: true });
    let input: &[u8] = b"What time is lunch?\nstill here?\n";
    let mut output = Vec::new();

    let error = chat::converse(&service, "default", input, &mut output)
        .await
        .expect_err("runner failure should end the chat");
    let transcript = String::from_utf8(output).expect("utf8");

    assert!(error.to_string().contains("Failed to create response"));
    assert!(transcript.contains("Error: "));
    assert!(!transcript.contains("Goodbye!"));
}

#[derive(Default)]
struct ScriptedRunner {
    failing: bool,
}

#[async_trait]
impl AgentRunner for ScriptedRunner {
    async fn run(&self, agent: &Agent, input: AgentInput) -> Result<RunResult, RunError> {
        if self.failing {
            return Err(RunError::Model {
                agent: agent.name.clone(),
                source: anyhow::anyhow!("model unavailable"),
            });
        }

        let prompt = match &input {
            AgentInput::Text(text) => text.clone(),
            AgentInput::Items(items) => items
                .iter()
                .rev()
                .find_map(|item| match item {
                    InputItem::Message { content, .. } => Some(content.clone()),
                    _ => None,
                })
                .unwrap_or_default(),
        };
        let reply = format!("echo: {prompt}");
        Ok(RunResult {
            input: input.into_items(),
            new_items: vec![InputItem::assistant(reply.clone())],
            final_output: reply,
            last_agent: agent.name.clone(),
            response_id: None,
        })
    }
}

fn service_with(runner: ScriptedRunner) -> ConversationService {
    let mut assistant = AppConfig::default().assistant;
    assistant.guardrail_enabled = false;
    ConversationService::new(Arc::new(runner), &assistant, "Be brief.".to_string(), None)
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn check_statuses(payload: &Value) -> Vec<(String, String)> {
    payload["checks"]
        .as_array()
        .expect("checks array")
        .iter()
        .map(|check| {
            (
                check["name"].as_str().unwrap_or_default().to_string(),
                check["status"].as_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "OPENAI_API_KEY",
        "CONFGUIDE_APP_ENV",
        "CONFGUIDE_LLM_PROVIDER",
        "CONFGUIDE_LLM_API_KEY",
        "CONFGUIDE_LLM_BASE_URL",
        "CONFGUIDE_LLM_MODEL",
        "CONFGUIDE_LLM_TIMEOUT_SECS",
        "CONFGUIDE_SERVER_BIND_ADDRESS",
        "CONFGUIDE_SERVER_PORT",
        "CONFGUIDE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "CONFGUIDE_STORAGE_DATA_DIR",
        "CONFGUIDE_ASSISTANT_NAME",
        "CONFGUIDE_ASSISTANT_INSTRUCTIONS_PATH",
        "CONFGUIDE_ASSISTANT_AGENDA_PATH",
        "CONFGUIDE_ASSISTANT_HISTORY_WINDOW_TURNS",
        "CONFGUIDE_LOGGING_LEVEL",
        "CONFGUIDE_LOGGING_FORMAT",
        "CONFGUIDE_LOG_LEVEL",
        "CONFGUIDE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
