use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::ToolSpec;

pub const FULL_SCHEDULE_TOOL: &str = "get_full_schedule";

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    /// JSON schema of the arguments; no arguments by default.
    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {}, "additionalProperties": false })
    }

    async fn execute(&self, input: Value) -> Result<Value>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(Box::as_ref)
    }

    pub fn spec(&self, name: &str) -> Option<ToolSpec> {
        self.get(name).map(|tool| ToolSpec {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters(),
        })
    }
}

/// Returns the full conference agenda as markdown.
pub struct FullScheduleTool {
    agenda_path: PathBuf,
}

impl FullScheduleTool {
    pub fn new(agenda_path: impl Into<PathBuf>) -> Self {
        Self { agenda_path: agenda_path.into() }
    }
}

#[async_trait]
impl Tool for FullScheduleTool {
    fn name(&self) -> &'static str {
        FULL_SCHEDULE_TOOL
    }

    fn description(&self) -> &'static str {
        "Get the full conference agenda with every session, stage, time slot and speaker."
    }

    async fn execute(&self, _input: Value) -> Result<Value> {
        let agenda = tokio::fs::read_to_string(&self.agenda_path)
            .await
            .with_context(|| format!("failed to read agenda `{}`", self.agenda_path.display()))?;
        Ok(Value::String(agenda))
    }
}

/// Flattens a tool result into the text the model sees.
pub fn render_output(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
