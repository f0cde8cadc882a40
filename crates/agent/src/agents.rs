//! Agent definitions and the conference agent catalog.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::tools::FULL_SCHEDULE_TOOL;

pub const CONFERENCE_GUIDE: &str = "Conference Guide";
pub const SCHEDULING_AGENT: &str = "Scheduling Agent";
pub const SUMMARIZATION_AGENT: &str = "Summarization Agent";
pub const NETWORKING_AGENT: &str = "Networking Agent";
pub const GUARDRAIL_AGENT: &str = "Guardrail check";

/// A named instruction set with the tools it may call and the agents it may hand off to.
#[derive(Clone, Debug, PartialEq)]
pub struct Agent {
    pub name: String,
    pub instructions: String,
    pub handoff_description: Option<String>,
    pub handoffs: Vec<Arc<Agent>>,
    pub tools: Vec<String>,
    /// When set, the final output must be a JSON object matching this schema.
    pub output_schema: Option<Value>,
}

impl Agent {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            handoff_description: None,
            handoffs: Vec::new(),
            tools: Vec::new(),
            output_schema: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_handoff_description(mut self, description: impl Into<String>) -> Self {
        self.handoff_description = Some(description.into());
        self
    }

    pub fn with_handoff(mut self, agent: Agent) -> Self {
        self.handoffs.push(Arc::new(agent));
        self
    }

    pub fn with_tool(mut self, tool_name: impl Into<String>) -> Self {
        self.tools.push(tool_name.into());
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Name of the synthetic tool the model calls to transfer control to this agent.
    pub fn handoff_tool_name(&self) -> String {
        let slug = self
            .name
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() { ch.to_ascii_lowercase() } else { '_' })
            .collect::<String>();
        format!("transfer_to_{slug}")
    }

    pub fn find_handoff(&self, tool_name: &str) -> Option<&Arc<Agent>> {
        self.handoffs.iter().find(|agent| agent.handoff_tool_name() == tool_name)
    }
}

pub fn scheduling_agent() -> Agent {
    Agent::new(
        SCHEDULING_AGENT,
        "You help attendees plan their day at the conference. Use the get_full_schedule tool \
         to read the agenda, then recommend talks and build a schedule that matches the \
         attendee's interests and availability. Always mention session times, stages and \
         speakers, and flag overlapping sessions.",
    )
    .with_handoff_description("Specialist for the agenda, session times and personal schedules.")
    .with_tool(FULL_SCHEDULE_TOOL)
}

pub fn summarization_agent() -> Agent {
    Agent::new(
        SUMMARIZATION_AGENT,
        "You summarize conference talks, panels and announcements. Keep summaries short, \
         lead with the key takeaways and say clearly when you do not have enough \
         information about a session.",
    )
    .with_handoff_description("Specialist for summarizing talks and conference content.")
}

pub fn networking_agent() -> Agent {
    Agent::new(
        NETWORKING_AGENT,
        "You help attendees decide whom to meet at the conference. Use what you know about \
         the attendee to suggest speakers, companies and startups worth meeting, and \
         propose short, specific conversation openers.",
    )
    .with_handoff_description("Specialist for networking and meeting recommendations.")
}

/// The entry agent: answers general questions and routes specialised ones.
pub fn conference_guide() -> Agent {
    Agent::new(
        CONFERENCE_GUIDE,
        "You are the conference guide. Answer general questions about the event directly. \
         Hand off to the scheduling agent for agenda and planning questions, to the \
         summarization agent for talk summaries, and to the networking agent for \
         recommendations on whom to meet.",
    )
    .with_handoff(scheduling_agent())
    .with_handoff(summarization_agent())
    .with_handoff(networking_agent())
}

/// The classifier that decides whether a request is about the conference.
pub fn guardrail_agent() -> Agent {
    Agent::new(
        GUARDRAIL_AGENT,
        "Check if the user is asking about the VivaTech conference: its agenda, speakers, \
         exhibitors, logistics, networking or anything else related to attending it. \
         Follow-up messages in an ongoing conference conversation are on topic.",
    )
    .with_output_schema(json!({
        "type": "object",
        "properties": {
            "is_in_domain": { "type": "boolean" },
            "reasoning": { "type": "string" }
        },
        "required": ["is_in_domain", "reasoning"],
        "additionalProperties": false
    }))
}
