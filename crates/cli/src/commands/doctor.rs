use std::fs;
use std::path::Path;

use confguide_core::config::{AppConfig, LlmProvider, LoadOptions};
use serde::Serialize;

use crate::commands::CommandResult;

const CONFIG_DEPENDENT_CHECKS: [&str; 4] =
    ["llm_credentials", "instructions_file", "agenda_file", "storage_directory"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    run_with(LoadOptions::default(), json_output)
}

pub fn run_with(options: LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Fail { 1 } else { 0 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            ));
            checks.push(check_llm_credentials(&config));
            checks.push(check_instructions_file(&config.assistant.instructions_path));
            checks.push(check_agenda_file(&config.assistant.agenda_path));
            checks.push(check_storage_directory(&config.storage.data_dir));
        }
        Err(error) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Fail,
                error.to_string(),
            ));
            checks.extend(CONFIG_DEPENDENT_CHECKS.into_iter().map(|name| {
                DoctorCheck::new(
                    name,
                    CheckStatus::Skipped,
                    "skipped because configuration did not load",
                )
            }));
        }
    }

    let failed = checks
        .iter()
        .any(|check| matches!(check.status, CheckStatus::Fail | CheckStatus::Skipped));
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm_credentials(config: &AppConfig) -> DoctorCheck {
    if config.llm.api_key_configured() {
        return DoctorCheck::new(
            "llm_credentials",
            CheckStatus::Pass,
            format!("api key configured for model `{}`", config.llm.model),
        );
    }

    if config.llm.provider == LlmProvider::Ollama {
        return DoctorCheck::new(
            "llm_credentials",
            CheckStatus::Pass,
            format!("local provider at `{}` needs no api key", config.llm.base_url),
        );
    }

    DoctorCheck::new(
        "llm_credentials",
        CheckStatus::Fail,
        "no api key configured (set CONFGUIDE_LLM_API_KEY or OPENAI_API_KEY)",
    )
}

// The service falls back to built-in instructions, so a missing file only warns.
fn check_instructions_file(path: &Path) -> DoctorCheck {
    match fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => DoctorCheck::new(
            "instructions_file",
            CheckStatus::Pass,
            format!("loaded {} bytes from `{}`", text.trim().len(), path.display()),
        ),
        Ok(_) => DoctorCheck::new(
            "instructions_file",
            CheckStatus::Warn,
            format!("`{}` is empty; built-in instructions will be used", path.display()),
        ),
        Err(error) => DoctorCheck::new(
            "instructions_file",
            CheckStatus::Warn,
            format!(
                "cannot read `{}` ({error}); built-in instructions will be used",
                path.display()
            ),
        ),
    }
}

fn check_agenda_file(path: &Path) -> DoctorCheck {
    match fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => DoctorCheck::new(
            "agenda_file",
            CheckStatus::Pass,
            format!("agenda available at `{}`", path.display()),
        ),
        Ok(_) => DoctorCheck::new(
            "agenda_file",
            CheckStatus::Fail,
            format!("`{}` is empty", path.display()),
        ),
        Err(error) => DoctorCheck::new(
            "agenda_file",
            CheckStatus::Fail,
            format!("cannot read `{}`: {error}", path.display()),
        ),
    }
}

fn check_storage_directory(path: &Path) -> DoctorCheck {
    match fs::metadata(path) {
        Ok(metadata) if !metadata.is_dir() => DoctorCheck::new(
            "storage_directory",
            CheckStatus::Fail,
            format!("`{}` is not a directory", path.display()),
        ),
        Ok(metadata) if metadata.permissions().readonly() => DoctorCheck::new(
            "storage_directory",
            CheckStatus::Fail,
            format!("`{}` is read-only", path.display()),
        ),
        Ok(_) => DoctorCheck::new(
            "storage_directory",
            CheckStatus::Pass,
            format!("`{}` is writable", path.display()),
        ),
        Err(error) => DoctorCheck::new(
            "storage_directory",
            CheckStatus::Fail,
            format!("cannot access `{}`: {error}", path.display()),
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
