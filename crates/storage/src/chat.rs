use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use confguide_core::domain::chat::{
    ChatHistoryPage, ChatMessage, ConversationListPage, ConversationSummary, Pagination,
};

use crate::file::{read_json, write_json};
use crate::{ChatRepository, StorageError};

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChatLog {
    #[serde(default)]
    conversations: BTreeMap<String, ConversationRecord>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConversationRecord {
    #[serde(default)]
    messages: Vec<ChatMessage>,
}

/// Chat log kept as `{"conversations": {id: {"messages": [...]}}}` in one JSON file.
pub struct JsonChatStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonChatStore {
    /// Opens the log, creating an empty one when the file does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let store = Self { path: path.into(), write_lock: Mutex::new(()) };
        if read_json::<ChatLog>(&store.path).await?.is_none() {
            write_json(&store.path, &ChatLog::default()).await?;
            info!(event_name = "storage.chat.created", path = %store.path.display(), "created chat log");
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<ChatLog, StorageError> {
        Ok(read_json(&self.path).await?.unwrap_or_default())
    }
}

#[async_trait]
impl ChatRepository for JsonChatStore {
    async fn save_message(
        &self,
        conversation_id: &str,
        message: ChatMessage,
    ) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut log = self.load().await?;
        let role = message.role;
        log.conversations.entry(conversation_id.to_string()).or_default().messages.push(message);
        write_json(&self.path, &log).await?;

        debug!(
            event_name = "storage.chat.message_saved",
            conversation_id = %conversation_id,
            role = %role,
            "saved chat message"
        );
        Ok(())
    }

    async fn conversation_messages(
        &self,
        conversation_id: &str,
        pagination: Pagination,
    ) -> Result<ChatHistoryPage, StorageError> {
        let log = self.load().await?;
        let messages = log
            .conversations
            .get(conversation_id)
            .map(|record| record.messages.as_slice())
            .unwrap_or_default();
        Ok(ChatHistoryPage::from_messages(messages, pagination))
    }

    async fn all_conversations(
        &self,
        pagination: Pagination,
    ) -> Result<ConversationListPage, StorageError> {
        let log = self.load().await?;
        let summaries = log
            .conversations
            .iter()
            .filter_map(|(id, record)| ConversationSummary::from_messages(id.clone(), &record.messages))
            .collect();
        Ok(ConversationListPage::from_summaries(summaries, pagination))
    }

    async fn conversation_exists(&self, conversation_id: &str) -> Result<bool, StorageError> {
        Ok(self.load().await?.conversations.contains_key(conversation_id))
    }
}
