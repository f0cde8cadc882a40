//! Shared building blocks for the conference-guide backend: layered configuration,
//! the error taxonomy surfaced to callers, and the chat/profile domain types that the
//! agent, storage and server crates exchange.

pub mod config;
pub mod domain;
pub mod errors;

pub use domain::chat::{
    ChatHistoryPage, ChatMessage, ConversationListPage, ConversationSummary, PageInfo,
    Pagination, Role, Turn,
};
pub use domain::profile::UserProfile;
pub use errors::{ApplicationError, InterfaceError};
