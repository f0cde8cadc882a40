pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "confguide",
    about = "Conference guide operator CLI",
    long_about = "Chat with the conference assistant from a terminal, inspect effective configuration, and check runtime readiness.",
    after_help = "Examples:\n  confguide chat --group booth-42\n  confguide doctor --json\n  confguide config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive conversation (type quit, exit or bye to leave)")]
    Chat {
        #[arg(long, help = "Conversation group id; defaults to assistant.default_group_id")]
        group: Option<String>,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, LLM credentials, instructions, agenda and storage")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Chat { group } => commands::chat::run(group),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
