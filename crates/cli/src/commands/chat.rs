use confguide_agent::ConversationService;
use confguide_core::config::{AppConfig, LoadOptions, LogFormat};
use confguide_storage::{JsonUserStore, ProfileRepository};
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{info, warn, Level};

use crate::commands::CommandResult;

const EXIT_WORDS: [&str; 3] = ["quit", "exit", "bye"];

pub fn run(group: Option<String>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("chat", "config_validation", error.to_string(), 2);
        }
    };
    init_logging(&config);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    runtime.block_on(async move {
        let user_brief = load_user_brief(&config).await;
        let service = match ConversationService::from_config(&config, user_brief.as_deref()).await
        {
            Ok(service) => service,
            Err(error) => {
                return CommandResult::failure("chat", "startup", error.to_string(), 3);
            }
        };

        let group_id = group.unwrap_or_else(|| config.assistant.default_group_id.clone());
        let stdin = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();

        match converse(&service, &group_id, stdin, &mut stdout).await {
            Ok(turns) => CommandResult::finished(
                "chat",
                format!("conversation `{group_id}` ended after {turns} turn(s)"),
                Some(json!({ "group_id": group_id, "turns": turns })),
            ),
            Err(error) => CommandResult::failure("chat", "conversation", error.to_string(), 4),
        }
    })
}

/// Reads prompts line by line and answers each one until an exit word, a blank line
/// or end of input. Returns the number of answered prompts.
pub async fn converse<R, W>(
    service: &ConversationService,
    group_id: &str,
    input: R,
    output: &mut W,
) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let assistant = service.assistant_name().to_string();
    output
        .write_all(
            format!(
                "Chatting with {assistant} in group `{group_id}` (type 'quit', 'exit', or 'bye' to end)\n"
            )
            .as_bytes(),
        )
        .await?;

    let mut lines = input.lines();
    let mut turns = 0;
    loop {
        output.write_all(format!("You ({group_id}): ").as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let prompt = line.trim();
        if is_exit(prompt) {
            break;
        }

        match service.create_response(prompt, group_id).await {
            Ok(reply) => {
                output.write_all(format!("{assistant}: {}\n", reply.message).as_bytes()).await?;
                turns += 1;
            }
            Err(error) => {
                output.write_all(format!("Error: {error}\n").as_bytes()).await?;
                output.flush().await?;
                return Err(error.into());
            }
        }
    }

    output.write_all(b"Goodbye!\n").await?;
    output.flush().await?;
    info!(
        event_name = "cli.chat.finished",
        group_id = %group_id,
        turns,
        "interactive conversation finished"
    );
    Ok(turns)
}

pub fn is_exit(prompt: &str) -> bool {
    let prompt = prompt.trim();
    prompt.is_empty() || EXIT_WORDS.iter().any(|word| prompt.eq_ignore_ascii_case(word))
}

async fn load_user_brief(config: &AppConfig) -> Option<String> {
    match JsonUserStore::new(config.storage.user_path()).get_profile().await {
        Ok(profile) => profile.and_then(|profile| profile.assistant_brief()),
        Err(error) => {
            warn!(
                event_name = "cli.chat.profile_unavailable",
                error = %error,
                "user profile could not be loaded, continuing without it"
            );
            None
        }
    }
}

// Stdout carries the conversation, so logs go to stderr.
fn init_logging(config: &AppConfig) {
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::WARN);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
