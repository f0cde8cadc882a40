//! Conference assistant runtime.
//!
//! A request flows through two stages:
//! 1. **Classify** (`guardrails`) - a structured-output agent decides whether the input is
//!    about the conference. Off-topic input ends the turn with a fixed apology.
//! 2. **Dispatch** (`runtime`) - the router agent answers, possibly after handing off to a
//!    specialist from the catalog (`agents`) that may call tools (`tools`).
//!
//! `conversation` threads multi-turn history per group by replaying the previous run's
//! transcript, and `service` wires loaded instructions and the attendee profile into it.
//!
//! # Key Types
//!
//! - `AgentRunner` - the run/classify seam; `LlmAgentRunner` implements it over `LlmClient`
//! - `ConversationManager` - per-group history and replay
//! - `ConversationService` - what the HTTP and CLI layers talk to

pub mod agents;
pub mod conversation;
pub mod guardrails;
pub mod llm;
pub mod runner;
pub mod runtime;
pub mod service;
pub mod tools;

pub use conversation::{ConversationError, ConversationManager, ReplayWindow};
pub use runner::{AgentInput, AgentRunner, InputItem, LlmAgentRunner, RunError, RunResult};
pub use service::{ConversationReply, ConversationService};
