pub mod chat;
pub mod config;
pub mod doctor;

use serde::Serialize;
use serde_json::Value;

/// What a subcommand prints and the process exit code it asks for.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

/// One-line JSON status for commands whose main output went elsewhere (e.g. `chat`).
#[derive(Debug, Serialize)]
struct StatusLine<'a> {
    command: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_class: Option<&'a str>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl CommandResult {
    /// Success carrying structured details, such as the turns a chat session answered.
    pub fn finished(command: &str, message: impl Into<String>, details: Option<Value>) -> Self {
        let line = StatusLine {
            command,
            status: "ok",
            error_class: None,
            message: message.into(),
            details,
        };
        Self { exit_code: 0, output: render(&line) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let line = StatusLine {
            command,
            status: "error",
            error_class: Some(error_class),
            message: message.into(),
            details: None,
        };
        Self { exit_code, output: render(&line) }
    }
}

fn render(line: &StatusLine<'_>) -> String {
    serde_json::to_string(line).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"{}\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            line.command,
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
