//! Per-group conversation state with full transcript replay.
//!
//! Each group keeps its turn history and the last run result. The first turn of a group
//! submits the bare prompt; every later turn submits the previous run's transcript plus
//! the new user message. Turns for the same group are serialized by a per-group async
//! mutex held for the whole turn, so replay input and history never interleave.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use confguide_core::domain::chat::Turn;
use thiserror::Error;
use tracing::{debug, info, Instrument};

use crate::guardrails::GuardrailVerdict;
use crate::runner::{AgentInput, InputItem, RunError, RunResult};
use crate::runtime::{AgentRuntime, DispatchError};

pub const DEFAULT_GROUP_ID: &str = "default";

/// How much of the previous transcript is replayed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReplayWindow {
    #[default]
    Unbounded,
    /// Keep only the items from the last `n` user turns onward.
    LastTurns(usize),
}

impl ReplayWindow {
    pub fn from_turns(turns: Option<usize>) -> Self {
        match turns {
            Some(turns) => Self::LastTurns(turns),
            None => Self::Unbounded,
        }
    }

    fn apply(self, items: Vec<InputItem>) -> Vec<InputItem> {
        let Self::LastTurns(turns) = self else {
            return items;
        };
        let user_positions = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.is_user_message())
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        if user_positions.len() <= turns {
            return items;
        }
        if turns == 0 {
            return Vec::new();
        }
        let start = user_positions[user_positions.len() - turns];
        items.into_iter().skip(start).collect()
    }
}

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("request for group {group_id} was rejected by the input guardrail")]
    Rejected { group_id: String, verdict: GuardrailVerdict, user_message: String },
    #[error("Error executing prompt for group {group_id}: {source}")]
    Execution {
        group_id: String,
        #[source]
        source: RunError,
    },
}

#[derive(Default)]
struct GroupState {
    history: Vec<Turn>,
    last_result: Option<RunResult>,
    initialized: bool,
}

#[derive(Default)]
struct GroupSlot {
    turn: tokio::sync::Mutex<()>,
    state: Mutex<GroupState>,
}

pub struct ConversationManager {
    runtime: AgentRuntime,
    workflow_name: String,
    default_group_id: String,
    window: ReplayWindow,
    groups: Mutex<HashMap<String, Arc<GroupSlot>>>,
}

impl ConversationManager {
    pub fn new(runtime: AgentRuntime, workflow_name: impl Into<String>) -> Self {
        Self {
            runtime,
            workflow_name: workflow_name.into(),
            default_group_id: DEFAULT_GROUP_ID.to_string(),
            window: ReplayWindow::Unbounded,
            groups: Mutex::default(),
        }
    }

    pub fn with_default_group(mut self, group_id: impl Into<String>) -> Self {
        self.default_group_id = group_id.into();
        self
    }

    pub fn with_window(mut self, window: ReplayWindow) -> Self {
        self.window = window;
        self
    }

    pub fn runtime(&self) -> &AgentRuntime {
        &self.runtime
    }

    pub fn default_group_id(&self) -> &str {
        &self.default_group_id
    }

    /// Runs one turn for `group_id` (or the default group) and returns the final output.
    pub async fn execute(
        &self,
        prompt: &str,
        group_id: Option<&str>,
    ) -> Result<String, ConversationError> {
        let group_id = group_id.unwrap_or(&self.default_group_id).to_string();
        let span = tracing::info_span!(
            "conversation.execute",
            workflow_name = %self.workflow_name,
            group_id = %group_id
        );
        self.execute_turn(prompt, group_id).instrument(span).await
    }

    async fn execute_turn(
        &self,
        prompt: &str,
        group_id: String,
    ) -> Result<String, ConversationError> {
        let slot = self.slot(&group_id);
        let _turn = slot.turn.lock().await;

        let input = {
            let state = lock(&slot.state);
            match (&state.last_result, state.initialized) {
                (Some(last), true) => {
                    let mut items = self.window.apply(last.to_input_list());
                    items.push(InputItem::user(prompt));
                    AgentInput::Items(items)
                }
                _ => AgentInput::Text(prompt.to_string()),
            }
        };

        let replayed_items = match &input {
            AgentInput::Text(_) => 0,
            AgentInput::Items(items) => items.len().saturating_sub(1),
        };
        debug!(event_name = "conversation.turn.started", replayed_items, "submitting turn");

        let result = match self.runtime.dispatch(input).await {
            Ok(result) => result,
            Err(DispatchError::TripwireTriggered { verdict, user_message }) => {
                return Err(ConversationError::Rejected { group_id, verdict, user_message });
            }
            Err(DispatchError::Run(source)) => {
                return Err(ConversationError::Execution { group_id, source });
            }
        };

        let output = result.final_output.clone();
        let response_id = result.response_id.clone().unwrap_or_default();
        let last_agent = result.last_agent.clone();
        let mut state = lock(&slot.state);
        state.history.push(Turn::user(prompt));
        state.history.push(Turn::assistant(output.clone()));
        state.last_result = Some(result);
        state.initialized = true;

        info!(
            event_name = "conversation.turn.completed",
            history_len = state.history.len(),
            response_id = %response_id,
            last_agent = %last_agent,
            "turn completed"
        );
        Ok(output)
    }

    pub fn get_history(&self, group_id: Option<&str>) -> Vec<Turn> {
        let group_id = group_id.unwrap_or(&self.default_group_id);
        self.existing_slot(group_id)
            .map(|slot| lock(&slot.state).history.clone())
            .unwrap_or_default()
    }

    pub fn get_all_histories(&self) -> BTreeMap<String, Vec<Turn>> {
        lock(&self.groups)
            .iter()
            .map(|(group_id, slot)| (group_id.clone(), lock(&slot.state).history.clone()))
            .collect()
    }

    pub fn get_last_response(&self, group_id: Option<&str>) -> Option<String> {
        let group_id = group_id.unwrap_or(&self.default_group_id);
        let slot = self.existing_slot(group_id)?;
        let state = lock(&slot.state);
        state.last_result.as_ref().map(|result| result.final_output.clone())
    }

    pub fn get_active_groups(&self) -> Vec<String> {
        let mut groups = lock(&self.groups).keys().cloned().collect::<Vec<_>>();
        groups.sort();
        groups
    }

    /// Resets one group's history, last result and initialized flag. Waits for an
    /// in-flight turn of that group to finish first.
    pub async fn clear_history(&self, group_id: Option<&str>) {
        let group_id = group_id.unwrap_or(&self.default_group_id);
        let Some(slot) = self.existing_slot(group_id) else {
            return;
        };
        let _turn = slot.turn.lock().await;
        *lock(&slot.state) = GroupState::default();
        info!(event_name = "conversation.cleared", group_id = %group_id, "history cleared");
    }

    /// Forgets every group.
    pub async fn clear_all_histories(&self) {
        let slots = lock(&self.groups).drain().map(|(_, slot)| slot).collect::<Vec<_>>();
        for slot in &slots {
            let _turn = slot.turn.lock().await;
            *lock(&slot.state) = GroupState::default();
        }
        info!(event_name = "conversation.cleared_all", groups = slots.len(), "all histories cleared");
    }

    fn slot(&self, group_id: &str) -> Arc<GroupSlot> {
        lock(&self.groups).entry(group_id.to_string()).or_default().clone()
    }

    fn existing_slot(&self, group_id: &str) -> Option<Arc<GroupSlot>> {
        lock(&self.groups).get(group_id).cloned()
    }
}

// State locks are never held across an await, so a poisoned lock still holds consistent data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
