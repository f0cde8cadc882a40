use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::agents::Agent;
use crate::guardrails::{GuardrailDecision, GuardrailVerdict, InputGuardrail};
use crate::runner::{AgentInput, AgentRunner, RunError, RunResult};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("input guardrail tripwire triggered: {}", .verdict.reasoning)]
    TripwireTriggered { verdict: GuardrailVerdict, user_message: String },
    #[error(transparent)]
    Run(#[from] RunError),
}

/// Guardrail-then-dispatch: every input is classified first and only on-topic input
/// reaches the router agent.
pub struct AgentRuntime {
    runner: Arc<dyn AgentRunner>,
    router: Agent,
    guardrail: Option<InputGuardrail>,
}

impl AgentRuntime {
    pub fn new(runner: Arc<dyn AgentRunner>, router: Agent, guardrail: Option<InputGuardrail>) -> Self {
        Self { runner, router, guardrail }
    }

    pub fn router(&self) -> &Agent {
        &self.router
    }

    pub fn guardrail_enabled(&self) -> bool {
        self.guardrail.is_some()
    }

    pub async fn dispatch(&self, input: AgentInput) -> Result<RunResult, DispatchError> {
        if let Some(guardrail) = &self.guardrail {
            match guardrail.evaluate(self.runner.as_ref(), &input).await? {
                GuardrailDecision::Allow { verdict } => {
                    debug!(
                        event_name = "guardrail.allowed",
                        reasoning = %verdict.reasoning,
                        "input guardrail allowed request"
                    );
                }
                GuardrailDecision::Reject { user_message, verdict, .. } => {
                    return Err(DispatchError::TripwireTriggered { verdict, user_message });
                }
            }
        }

        Ok(self.runner.run(&self.router, input).await?)
    }
}
