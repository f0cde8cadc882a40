//! Flat-file persistence for the chat log and the attendee profile.

use async_trait::async_trait;

use confguide_core::domain::chat::{
    ChatHistoryPage, ChatMessage, ConversationListPage, Pagination,
};
use confguide_core::domain::profile::UserProfile;

pub mod chat;
mod error;
mod file;
pub mod profile;

pub use chat::JsonChatStore;
pub use error::StorageError;
pub use profile::JsonUserStore;

#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn save_message(
        &self,
        conversation_id: &str,
        message: ChatMessage,
    ) -> Result<(), StorageError>;

    /// A page of one conversation's messages; unknown ids give an empty page.
    async fn conversation_messages(
        &self,
        conversation_id: &str,
        pagination: Pagination,
    ) -> Result<ChatHistoryPage, StorageError>;

    /// Summaries of every non-empty conversation, newest first.
    async fn all_conversations(
        &self,
        pagination: Pagination,
    ) -> Result<ConversationListPage, StorageError>;

    async fn conversation_exists(&self, conversation_id: &str) -> Result<bool, StorageError>;
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Stores `profile` merged with `profileUrl`, `timestamp` and `lastUpdated`.
    async fn save_profile(
        &self,
        profile_url: &str,
        profile: UserProfile,
    ) -> Result<UserProfile, StorageError>;

    async fn get_profile(&self) -> Result<Option<UserProfile>, StorageError>;

    /// Whether a profile is stored, optionally for a specific URL.
    async fn profile_exists(&self, profile_url: Option<&str>) -> Result<bool, StorageError>;

    async fn clear_profile(&self) -> Result<(), StorageError>;
}
