use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use confguide_core::config::{AppConfig, AssistantConfig};
use confguide_core::domain::chat::Turn;
use confguide_core::errors::ApplicationError;
use tracing::{info, warn};

use crate::agents::conference_guide;
use crate::conversation::{ConversationError, ConversationManager, ReplayWindow};
use crate::guardrails::InputGuardrail;
use crate::llm::OpenAiCompatibleClient;
use crate::runner::{AgentRunner, LlmAgentRunner};
use crate::runtime::AgentRuntime;
use crate::tools::{FullScheduleTool, ToolRegistry};

pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful assistant for the VivaTech 2025 \
     conference. Help attendees find sessions, plan their schedule, summarize talks and decide \
     whom to meet. Keep answers short and practical.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationReply {
    /// The conversation id the reply belongs to.
    pub response_id: String,
    pub message: String,
    pub rejected: bool,
}

/// The assistant as the HTTP layer sees it: one router agent with loaded instructions
/// behind a [`ConversationManager`].
pub struct ConversationService {
    manager: ConversationManager,
}

impl ConversationService {
    pub fn new(
        runner: Arc<dyn AgentRunner>,
        config: &AssistantConfig,
        instructions: String,
        user_brief: Option<&str>,
    ) -> Self {
        let instructions = compose_instructions(&instructions, user_brief);
        let router =
            conference_guide().with_name(config.name.clone()).with_instructions(instructions);
        let guardrail = config.guardrail_enabled.then(InputGuardrail::default);
        let runtime = AgentRuntime::new(runner, router, guardrail);
        let manager = ConversationManager::new(runtime, config.workflow_name.clone())
            .with_default_group(config.default_group_id.clone())
            .with_window(ReplayWindow::from_turns(config.history_window_turns));

        info!(
            event_name = "conversation_service.initialized",
            assistant = %config.name,
            workflow = %config.workflow_name,
            guardrail_enabled = config.guardrail_enabled,
            personalized = user_brief.is_some(),
            "conversation service initialized"
        );
        Self { manager }
    }

    /// Wires the OpenAI-compatible runner, the agenda tool and the instructions file.
    pub async fn from_config(
        config: &AppConfig,
        user_brief: Option<&str>,
    ) -> anyhow::Result<Self> {
        let client = OpenAiCompatibleClient::from_config(&config.llm)?;
        let mut tools = ToolRegistry::default();
        tools.register(FullScheduleTool::new(&config.assistant.agenda_path));
        let runner = LlmAgentRunner::new(Arc::new(client), Arc::new(tools))
            .with_max_turns(config.llm.max_agent_turns);
        let instructions = load_instructions(&config.assistant.instructions_path).await;

        Ok(Self::new(Arc::new(runner), &config.assistant, instructions, user_brief))
    }

    pub fn assistant_name(&self) -> &str {
        &self.manager.runtime().router().name
    }

    pub fn instructions(&self) -> &str {
        &self.manager.runtime().router().instructions
    }

    pub async fn create_response(
        &self,
        message: &str,
        conversation_id: &str,
    ) -> Result<ConversationReply, ApplicationError> {
        let started = Instant::now();
        let outcome = self.manager.execute(message, Some(conversation_id)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(text) => {
                info!(
                    event_name = "conversation_service.response",
                    conversation_id = %conversation_id,
                    elapsed_ms,
                    "response created"
                );
                Ok(ConversationReply {
                    response_id: conversation_id.to_string(),
                    message: text,
                    rejected: false,
                })
            }
            Err(ConversationError::Rejected { user_message, verdict, .. }) => {
                info!(
                    event_name = "conversation_service.rejected",
                    conversation_id = %conversation_id,
                    reasoning = %verdict.reasoning,
                    elapsed_ms,
                    "request rejected by guardrail"
                );
                Ok(ConversationReply {
                    response_id: conversation_id.to_string(),
                    message: user_message,
                    rejected: true,
                })
            }
            Err(error @ ConversationError::Execution { .. }) => {
                warn!(
                    event_name = "conversation_service.failed",
                    conversation_id = %conversation_id,
                    elapsed_ms,
                    error = %error,
                    "response failed"
                );
                Err(ApplicationError::Execution {
                    group_id: conversation_id.to_string(),
                    message: format!("Failed to create response: {error}"),
                })
            }
        }
    }

    pub fn conversation_history(&self, conversation_id: &str) -> Vec<Turn> {
        self.manager.get_history(Some(conversation_id))
    }

    pub async fn clear_conversation(&self, conversation_id: &str) {
        self.manager.clear_history(Some(conversation_id)).await;
    }

    pub fn active_conversations(&self) -> Vec<String> {
        self.manager.get_active_groups()
    }
}

/// Reads the instructions file, falling back to [`DEFAULT_INSTRUCTIONS`] when it is
/// missing, unreadable or blank.
pub async fn load_instructions(path: &Path) -> String {
    match tokio::fs::read_to_string(path).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            warn!(
                event_name = "conversation_service.instructions_empty",
                path = %path.display(),
                "instructions file is empty, using defaults"
            );
            DEFAULT_INSTRUCTIONS.to_string()
        }
        Err(error) => {
            warn!(
                event_name = "conversation_service.instructions_missing",
                path = %path.display(),
                error = %error,
                "instructions file unavailable, using defaults"
            );
            DEFAULT_INSTRUCTIONS.to_string()
        }
    }
}

pub fn compose_instructions(base: &str, user_brief: Option<&str>) -> String {
    match user_brief.map(str::trim).filter(|brief| !brief.is_empty()) {
        Some(brief) => format!("{base}\n\nUser info:\n{brief}"),
        None => base.to_string(),
    }
}
