use serde::{Deserialize, Serialize};
use tracing::info;

use crate::agents::{guardrail_agent, Agent};
use crate::runner::{AgentInput, AgentRunner, RunError};

pub const REJECTION_MESSAGE: &str =
    "I'm sorry, I can only help with VivaTech Conference related questions.";

/// Structured output of the guardrail classifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailVerdict {
    #[serde(alias = "is_viva_tech_conference")]
    pub is_in_domain: bool,
    #[serde(default)]
    pub reasoning: String,
}

impl GuardrailVerdict {
    pub fn allow(reasoning: impl Into<String>) -> Self {
        Self { is_in_domain: true, reasoning: reasoning.into() }
    }

    pub fn reject(reasoning: impl Into<String>) -> Self {
        Self { is_in_domain: false, reasoning: reasoning.into() }
    }

    /// Parses classifier output, tolerating a surrounding markdown code fence.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix("```json")
            .or_else(|| trimmed.strip_prefix("```"))
            .and_then(|rest| rest.strip_suffix("```"))
            .unwrap_or(trimmed)
            .trim();
        serde_json::from_str(body).map_err(|error| format!("{error}: `{raw}`"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow { verdict: GuardrailVerdict },
    Reject { reason_code: &'static str, user_message: String, verdict: GuardrailVerdict },
}

/// Pre-dispatch check that keeps the assistant on the conference topic.
#[derive(Clone, Debug)]
pub struct InputGuardrail {
    agent: Agent,
    rejection_message: String,
}

impl Default for InputGuardrail {
    fn default() -> Self {
        Self::new(guardrail_agent(), REJECTION_MESSAGE)
    }
}

impl InputGuardrail {
    pub fn new(agent: Agent, rejection_message: impl Into<String>) -> Self {
        Self { agent, rejection_message: rejection_message.into() }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub async fn evaluate(
        &self,
        runner: &dyn AgentRunner,
        input: &AgentInput,
    ) -> Result<GuardrailDecision, RunError> {
        let verdict = runner.classify(&self.agent, input.clone()).await?;
        if verdict.is_in_domain {
            return Ok(GuardrailDecision::Allow { verdict });
        }

        info!(
            event_name = "guardrail.rejected",
            reasoning = %verdict.reasoning,
            "input guardrail rejected request"
        );
        Ok(GuardrailDecision::Reject {
            reason_code: "out_of_domain",
            user_message: self.rejection_message.clone(),
            verdict,
        })
    }
}
