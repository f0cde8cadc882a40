//! Agent execution: the transcript item model, the runner seam and the LLM-backed runner.

use std::sync::Arc;

use async_trait::async_trait;
use confguide_core::domain::chat::Role;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::agents::Agent;
use crate::guardrails::GuardrailVerdict;
use crate::llm::{CompletionRequest, LlmClient, LlmMessage, LlmToolCall, ToolSpec};
use crate::tools::{render_output, ToolRegistry};

/// Tool output for every handoff after the first one in a single model reply.
pub const EXTRA_HANDOFF_NOTICE: &str =
    "Multiple handoffs requested; only the first one is followed.";

pub const DEFAULT_MAX_TURNS: u32 = 10;

/// One entry of a replayable transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputItem {
    Message { role: Role, content: String },
    ToolCall { call_id: String, name: String, arguments: String },
    ToolOutput { call_id: String, output: String },
}

impl InputItem {
    pub fn user(content: impl Into<String>) -> Self {
        Self::Message { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Message { role: Role::Assistant, content: content.into() }
    }

    pub fn is_user_message(&self) -> bool {
        matches!(self, Self::Message { role: Role::User, .. })
    }
}

/// What a run is started with: a bare prompt or a full transcript.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgentInput {
    Text(String),
    Items(Vec<InputItem>),
}

impl AgentInput {
    pub fn to_items(&self) -> Vec<InputItem> {
        match self {
            Self::Text(text) => vec![InputItem::user(text.clone())],
            Self::Items(items) => items.clone(),
        }
    }

    pub fn into_items(self) -> Vec<InputItem> {
        match self {
            Self::Text(text) => vec![InputItem::user(text)],
            Self::Items(items) => items,
        }
    }
}

impl From<&str> for AgentInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<InputItem>> for AgentInput {
    fn from(value: Vec<InputItem>) -> Self {
        Self::Items(value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunResult {
    /// Items the run was started with.
    pub input: Vec<InputItem>,
    /// Items the run produced: tool calls, tool outputs, assistant messages.
    pub new_items: Vec<InputItem>,
    pub final_output: String,
    pub last_agent: String,
    pub response_id: Option<String>,
}

impl RunResult {
    /// The whole transcript, ready to be extended with the next user turn.
    pub fn to_input_list(&self) -> Vec<InputItem> {
        self.input.iter().chain(self.new_items.iter()).cloned().collect()
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("model call failed for agent `{agent}`: {source}")]
    Model {
        agent: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("agent `{agent}` exceeded {max_turns} turns without a final answer")]
    MaxTurnsExceeded { agent: String, max_turns: u32 },
    #[error("agent `{agent}` called unknown tool `{tool}`")]
    UnknownTool { agent: String, tool: String },
    #[error("agent `{agent}` returned unusable structured output: {message}")]
    InvalidStructuredOutput { agent: String, message: String },
}

/// Executes an agent over an input to completion.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, agent: &Agent, input: AgentInput) -> Result<RunResult, RunError>;

    /// Runs a structured-output classifier agent and parses its verdict.
    async fn classify(
        &self,
        agent: &Agent,
        input: AgentInput,
    ) -> Result<GuardrailVerdict, RunError> {
        let result = self.run(agent, input).await?;
        GuardrailVerdict::parse(&result.final_output).map_err(|message| {
            RunError::InvalidStructuredOutput { agent: agent.name.clone(), message }
        })
    }
}

/// Drives agents through an [`LlmClient`]: tools are executed locally and handoffs are
/// exposed to the model as `transfer_to_<agent>` tools.
pub struct LlmAgentRunner {
    client: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    max_turns: u32,
}

impl LlmAgentRunner {
    pub fn new(client: Arc<dyn LlmClient>, tools: Arc<ToolRegistry>) -> Self {
        Self { client, tools, max_turns: DEFAULT_MAX_TURNS }
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    fn request_for(&self, agent: &Agent, transcript: &[InputItem]) -> CompletionRequest {
        let mut instructions = agent.instructions.clone();
        if let Some(schema) = &agent.output_schema {
            instructions.push_str(&format!(
                "\n\nRespond only with a JSON object matching this schema: {schema}"
            ));
        }

        let mut messages = vec![LlmMessage::system(instructions)];
        messages.extend(to_messages(transcript));

        let mut tools = Vec::new();
        for name in &agent.tools {
            match self.tools.spec(name) {
                Some(spec) => tools.push(spec),
                None => warn!(
                    event_name = "agent.tool.unregistered",
                    agent = %agent.name,
                    tool = %name,
                    "agent references a tool that is not registered"
                ),
            }
        }
        tools.extend(agent.handoffs.iter().map(|target| handoff_spec(target)));

        CompletionRequest { messages, tools, json_output: agent.output_schema.is_some() }
    }

    async fn call_tool(&self, agent: &Agent, call: &LlmToolCall) -> Result<String, RunError> {
        let name = call.function.name.as_str();
        let tool = agent
            .tools
            .iter()
            .any(|allowed| allowed == name)
            .then(|| self.tools.get(name))
            .flatten()
            .ok_or_else(|| RunError::UnknownTool {
                agent: agent.name.clone(),
                tool: name.to_string(),
            })?;

        let arguments = if call.function.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str(&call.function.arguments) {
                Ok(arguments) => arguments,
                Err(error) => {
                    warn!(
                        event_name = "agent.tool.invalid_arguments",
                        agent = %agent.name,
                        tool = %name,
                        error = %error,
                        "model sent tool arguments that are not valid JSON"
                    );
                    return Ok(format!("The tool arguments were not valid JSON: {error}"));
                }
            }
        };

        // Tool failures go back to the model instead of aborting the run.
        match tool.execute(arguments).await {
            Ok(output) => Ok(render_output(&output)),
            Err(error) => {
                warn!(
                    event_name = "agent.tool.failed",
                    agent = %agent.name,
                    tool = %name,
                    error = %error,
                    "tool execution failed"
                );
                Ok(format!("An error occurred while running the tool: {error}"))
            }
        }
    }
}

#[async_trait]
impl AgentRunner for LlmAgentRunner {
    async fn run(&self, agent: &Agent, input: AgentInput) -> Result<RunResult, RunError> {
        let input = input.into_items();
        let mut new_items = Vec::new();
        let mut current = agent.clone();

        for turn in 1..=self.max_turns {
            let transcript = input.iter().chain(new_items.iter()).cloned().collect::<Vec<_>>();
            let completion = self
                .client
                .complete(self.request_for(&current, &transcript))
                .await
                .map_err(|source| RunError::Model { agent: current.name.clone(), source })?;

            debug!(
                event_name = "agent.turn.completed",
                agent = %current.name,
                turn,
                tool_calls = completion.tool_calls.len(),
                "model turn completed"
            );

            if completion.tool_calls.is_empty() {
                let final_output = completion.content.unwrap_or_default();
                new_items.push(InputItem::assistant(final_output.clone()));
                return Ok(RunResult {
                    input,
                    new_items,
                    final_output,
                    last_agent: current.name,
                    response_id: completion.response_id,
                });
            }

            if let Some(content) = completion.content.filter(|text| !text.trim().is_empty()) {
                new_items.push(InputItem::assistant(content));
            }
            for call in &completion.tool_calls {
                new_items.push(InputItem::ToolCall {
                    call_id: call.id.clone(),
                    name: call.function.name.clone(),
                    arguments: call.function.arguments.clone(),
                });
            }

            let mut next_agent: Option<Agent> = None;
            for call in &completion.tool_calls {
                let output = match current.find_handoff(&call.function.name) {
                    Some(_) if next_agent.is_some() => EXTRA_HANDOFF_NOTICE.to_string(),
                    Some(target) => {
                        next_agent = Some(target.as_ref().clone());
                        json!({ "assistant": target.name }).to_string()
                    }
                    None => self.call_tool(&current, call).await?,
                };
                new_items.push(InputItem::ToolOutput { call_id: call.id.clone(), output });
            }

            if let Some(target) = next_agent {
                info!(
                    event_name = "agent.handoff",
                    from = %current.name,
                    to = %target.name,
                    "agent handed off"
                );
                current = target;
            }
        }

        Err(RunError::MaxTurnsExceeded { agent: current.name, max_turns: self.max_turns })
    }
}

fn handoff_spec(target: &Agent) -> ToolSpec {
    let mut description = format!("Handoff to the {} agent to handle the request.", target.name);
    if let Some(extra) = &target.handoff_description {
        description.push(' ');
        description.push_str(extra);
    }
    ToolSpec {
        name: target.handoff_tool_name(),
        description,
        parameters: json!({ "type": "object", "properties": {}, "additionalProperties": false }),
    }
}

/// Converts transcript items to chat messages. Tool calls join the assistant message that
/// directly precedes them.
fn to_messages(items: &[InputItem]) -> Vec<LlmMessage> {
    let mut messages: Vec<LlmMessage> = Vec::with_capacity(items.len());
    for item in items {
        match item {
            InputItem::Message { role, content } => {
                messages.push(LlmMessage::text(role.as_str(), content.clone()));
            }
            InputItem::ToolCall { call_id, name, arguments } => {
                let call = LlmToolCall::function(call_id.clone(), name.clone(), arguments.clone());
                match messages.last_mut() {
                    Some(last) if last.role == Role::Assistant.as_str() => {
                        last.tool_calls.push(call)
                    }
                    _ => messages.push(LlmMessage {
                        role: Role::Assistant.as_str().to_string(),
                        content: None,
                        tool_calls: vec![call],
                        tool_call_id: None,
                    }),
                }
            }
            InputItem::ToolOutput { call_id, output } => {
                messages.push(LlmMessage::tool_result(call_id.clone(), output.clone()));
            }
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use serde_json::Value;

    use super::{
        to_messages, AgentInput, AgentRunner, InputItem, LlmAgentRunner, RunError, RunResult,
        EXTRA_HANDOFF_NOTICE,
    };
    use crate::agents::{conference_guide, guardrail_agent, Agent, SCHEDULING_AGENT};
    use crate::llm::{Completion, CompletionRequest, LlmClient, LlmToolCall};
    use crate::tools::{Tool, ToolRegistry, FULL_SCHEDULE_TOOL};

    #[derive(Default)]
    struct ScriptedClient {
        replies: Mutex<VecDeque<Completion>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Completion>) -> Arc<Self> {
            Arc::new(Self { replies: Mutex::new(replies.into()), requests: Mutex::default() })
        }

        fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().expect("requests lock").clone()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
            self.requests.lock().expect("requests lock").push(request);
            self.replies.lock().expect("replies lock").pop_front().ok_or_else(|| anyhow!("script exhausted"))
        }
    }

    struct StaticAgenda;

    #[async_trait]
    impl Tool for StaticAgenda {
        fn name(&self) -> &'static str {
            FULL_SCHEDULE_TOOL
        }

        fn description(&self) -> &'static str {
            "agenda"
        }

        async fn execute(&self, _input: Value) -> Result<Value> {
            Ok(Value::String("09:00 Keynote on Stage 1".to_string()))
        }
    }

    fn text(content: &str) -> Completion {
        Completion { response_id: Some("resp".to_string()), content: Some(content.to_string()), tool_calls: vec![] }
    }

    fn calls(names: &[&str]) -> Completion {
        Completion {
            response_id: None,
            content: None,
            tool_calls: names
                .iter()
                .enumerate()
                .map(|(index, name)| LlmToolCall::function(format!("call_{index}"), *name, "{}"))
                .collect(),
        }
    }

    fn runner(client: Arc<ScriptedClient>) -> LlmAgentRunner {
        let mut tools = ToolRegistry::default();
        tools.register(StaticAgenda);
        LlmAgentRunner::new(client, Arc::new(tools))
    }

    #[tokio::test]
    async fn plain_answer_finishes_in_one_turn() {
        let client = ScriptedClient::new(vec![text("Welcome to the conference!")]);
        let result =
            runner(client.clone()).run(&conference_guide(), "hello".into()).await.expect("run");

        assert_eq!(result.final_output, "Welcome to the conference!");
        assert_eq!(result.last_agent, "Conference Guide");
        assert_eq!(
            result.to_input_list(),
            vec![InputItem::user("hello"), InputItem::assistant("Welcome to the conference!")]
        );

        let request = &client.requests()[0];
        assert_eq!(request.messages[0].role, "system");
        let tool_names = request.tools.iter().map(|tool| tool.name.as_str()).collect::<Vec<_>>();
        assert_eq!(
            tool_names,
            vec![
                "transfer_to_scheduling_agent",
                "transfer_to_summarization_agent",
                "transfer_to_networking_agent"
            ]
        );
    }

    #[tokio::test]
    async fn handoff_then_tool_then_answer() {
        let client = ScriptedClient::new(vec![
            calls(&["transfer_to_scheduling_agent"]),
            calls(&[FULL_SCHEDULE_TOOL]),
            text("Start with the 09:00 keynote."),
        ]);

        let result = runner(client.clone())
            .run(&conference_guide(), "plan my morning".into())
            .await
            .expect("run");

        assert_eq!(result.last_agent, SCHEDULING_AGENT);
        assert_eq!(result.final_output, "Start with the 09:00 keynote.");
        assert!(result.new_items.contains(&InputItem::ToolOutput {
            call_id: "call_0".to_string(),
            output: "09:00 Keynote on Stage 1".to_string(),
        }));

        let requests = client.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[1].tools.iter().any(|tool| tool.name == FULL_SCHEDULE_TOOL));
        assert!(requests[1].messages[0].content.as_deref().unwrap_or_default().contains("agenda"));
        // The tool call and its output are replayed on the following turn.
        let last = &requests[2].messages;
        assert_eq!(last[last.len() - 1].role, "tool");
        assert_eq!(last[last.len() - 2].tool_calls[0].function.name, FULL_SCHEDULE_TOOL);
    }

    #[tokio::test]
    async fn only_the_first_handoff_in_a_reply_is_followed() {
        let client = ScriptedClient::new(vec![
            calls(&["transfer_to_scheduling_agent", "transfer_to_networking_agent"]),
            text("Here is your schedule."),
        ]);

        let result = runner(client.clone())
            .run(&conference_guide(), "who should I meet after the keynote?".into())
            .await
            .expect("run");

        assert_eq!(result.last_agent, SCHEDULING_AGENT);
        assert!(result.new_items.contains(&InputItem::ToolOutput {
            call_id: "call_0".to_string(),
            output: r#"{"assistant":"Scheduling Agent"}"#.to_string(),
        }));
        assert!(result.new_items.contains(&InputItem::ToolOutput {
            call_id: "call_1".to_string(),
            output: EXTRA_HANDOFF_NOTICE.to_string(),
        }));

        // The second turn runs as the scheduling agent, not the networking one.
        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].tools.iter().any(|tool| tool.name == FULL_SCHEDULE_TOOL));
    }

    #[tokio::test]
    async fn malformed_tool_arguments_are_reported_to_the_model() {
        let agent = Agent::new("Planner", "plan").with_tool(FULL_SCHEDULE_TOOL);
        let client = ScriptedClient::new(vec![
            Completion {
                response_id: None,
                content: None,
                tool_calls: vec![LlmToolCall::function("call_0", FULL_SCHEDULE_TOOL, "{not json")],
            },
            text("Sorry, let me try that again."),
        ]);

        let result = runner(client.clone()).run(&agent, "schedule?".into()).await.expect("run");

        let output = result
            .new_items
            .iter()
            .find_map(|item| match item {
                InputItem::ToolOutput { call_id, output } if call_id == "call_0" => {
                    Some(output.clone())
                }
                _ => None,
            })
            .expect("tool output for call_0");
        assert!(output.starts_with("The tool arguments were not valid JSON"));
        assert_ne!(output, "09:00 Keynote on Stage 1");
        assert_eq!(result.final_output, "Sorry, let me try that again.");

        let replayed = &client.requests()[1].messages;
        assert_eq!(replayed[replayed.len() - 1].role, "tool");
    }

    #[tokio::test]
    async fn tools_outside_the_agent_are_rejected() {
        let client = ScriptedClient::new(vec![calls(&[FULL_SCHEDULE_TOOL])]);
        let error = runner(client).run(&conference_guide(), "x".into()).await.expect_err("unknown");
        assert!(matches!(error, RunError::UnknownTool { ref tool, .. } if tool == FULL_SCHEDULE_TOOL));
    }

    #[tokio::test]
    async fn endless_tool_loop_hits_turn_limit() {
        let agent = Agent::new("Looper", "loop").with_tool(FULL_SCHEDULE_TOOL);
        let client = ScriptedClient::new((0..3).map(|_| calls(&[FULL_SCHEDULE_TOOL])).collect());

        let error =
            runner(client).with_max_turns(3).run(&agent, "x".into()).await.expect_err("limit");
        assert!(matches!(error, RunError::MaxTurnsExceeded { max_turns: 3, .. }));
    }

    #[tokio::test]
    async fn model_failure_is_reported_with_agent() {
        let client = ScriptedClient::new(vec![]);
        let error = runner(client).run(&conference_guide(), "x".into()).await.expect_err("model");
        assert!(error.to_string().contains("Conference Guide"));
    }

    #[tokio::test]
    async fn classify_parses_structured_verdict() {
        let client = ScriptedClient::new(vec![
            text(r#"{"is_in_domain": false, "reasoning": "weather question"}"#),
            text("not json"),
        ]);
        let runner = runner(client.clone());

        let verdict = runner
            .classify(&guardrail_agent(), AgentInput::Text("weather?".to_string()))
            .await
            .expect("verdict");
        assert!(!verdict.is_in_domain);
        assert!(client.requests()[0].json_output);

        let error =
            runner.classify(&guardrail_agent(), "again".into()).await.expect_err("bad output");
        assert!(matches!(error, RunError::InvalidStructuredOutput { .. }));
    }

    #[test]
    fn transcript_groups_tool_calls_into_assistant_messages() {
        let messages = to_messages(&[
            InputItem::user("hi"),
            InputItem::assistant("checking"),
            InputItem::ToolCall {
                call_id: "a".to_string(),
                name: "t".to_string(),
                arguments: "{}".to_string(),
            },
            InputItem::ToolCall {
                call_id: "b".to_string(),
                name: "t".to_string(),
                arguments: "{}".to_string(),
            },
            InputItem::ToolOutput { call_id: "a".to_string(), output: "1".to_string() },
        ]);

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].content.as_deref(), Some("checking"));
        assert_eq!(messages[1].tool_calls.len(), 2);
        assert_eq!(messages[2].tool_call_id.as_deref(), Some("a"));
    }

    #[test]
    fn input_list_is_input_followed_by_new_items() {
        let result = RunResult {
            input: vec![InputItem::user("a")],
            new_items: vec![InputItem::assistant("b")],
            final_output: "b".to_string(),
            last_agent: "x".to_string(),
            response_id: None,
        };
        assert_eq!(result.to_input_list(), vec![InputItem::user("a"), InputItem::assistant("b")]);
        assert_eq!(AgentInput::from("q").into_items(), vec![InputItem::user("q")]);
    }
}
