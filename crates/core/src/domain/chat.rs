use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ApplicationError;

pub const MAX_PAGE_LIMIT: u32 = 100;
pub const DEFAULT_PAGE_LIMIT: u32 = 10;
const SUMMARY_PREVIEW_CHARS: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable entry of a conversation's in-memory history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// A persisted chat log entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub openai_id: Option<String>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>, openai_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            openai_id,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, None)
    }

    pub fn assistant(content: impl Into<String>, openai_id: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content, Some(openai_id.into()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: default_page(), limit: default_limit() }
    }
}

impl Pagination {
    pub fn new(page: u32, limit: u32) -> Result<Self, ApplicationError> {
        let pagination = Self { page, limit };
        pagination.validate()?;
        Ok(pagination)
    }

    pub fn validate(&self) -> Result<(), ApplicationError> {
        if self.page < 1 {
            return Err(ApplicationError::InvalidInput("page must be at least 1".to_string()));
        }
        if self.limit < 1 || self.limit > MAX_PAGE_LIMIT {
            return Err(ApplicationError::InvalidInput(format!(
                "limit must be in range 1..={MAX_PAGE_LIMIT}"
            )));
        }
        Ok(())
    }

    /// Slices `items` to the requested page and computes the page metadata.
    pub fn paginate<T: Clone>(&self, items: &[T]) -> (Vec<T>, PageInfo) {
        let total = items.len();
        let limit = self.limit.max(1) as usize;
        let total_pages = total.div_ceil(limit);
        let start = (self.page.max(1) as usize - 1).saturating_mul(limit);
        let slice =
            if start >= total { Vec::new() } else { items[start..(start + limit).min(total)].to_vec() };

        let info = PageInfo {
            page: self.page,
            limit: self.limit,
            total_pages: total_pages as u32,
            has_next: (self.page as usize) < total_pages,
            has_previous: self.page > 1,
        };
        (slice, info)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_previous: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatHistoryPage {
    pub messages: Vec<ChatMessage>,
    pub total_messages: usize,
    #[serde(flatten)]
    pub page: PageInfo,
}

impl ChatHistoryPage {
    pub fn from_messages(messages: &[ChatMessage], pagination: Pagination) -> Self {
        let (page_messages, page) = pagination.paginate(messages);
        Self { messages: page_messages, total_messages: messages.len(), page }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub last_message: String,
    #[serde(with = "timestamp")]
    pub last_message_timestamp: DateTime<Utc>,
    pub message_count: usize,
    pub last_role: Role,
}

impl ConversationSummary {
    /// Summarises a conversation from its messages; `None` for an empty conversation.
    pub fn from_messages(id: impl Into<String>, messages: &[ChatMessage]) -> Option<Self> {
        let last = messages.last()?;
        Some(Self {
            id: id.into(),
            last_message: preview(&last.content),
            last_message_timestamp: last.timestamp,
            message_count: messages.len(),
            last_role: last.role,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationListPage {
    pub conversations: Vec<ConversationSummary>,
    pub total_conversations: usize,
    #[serde(flatten)]
    pub page: PageInfo,
}

impl ConversationListPage {
    /// Orders summaries newest first, then paginates.
    pub fn from_summaries(mut summaries: Vec<ConversationSummary>, pagination: Pagination) -> Self {
        summaries.sort_by(|left, right| right.last_message_timestamp.cmp(&left.last_message_timestamp));
        let (conversations, page) = pagination.paginate(&summaries);
        Self { conversations, total_conversations: summaries.len(), page }
    }
}

fn preview(content: &str) -> String {
    if content.chars().count() <= SUMMARY_PREVIEW_CHARS {
        return content.to_string();
    }
    let mut truncated: String = content.chars().take(SUMMARY_PREVIEW_CHARS - 3).collect();
    truncated.push_str("...");
    truncated
}

/// RFC 3339 on write; also accepts the offset-less ISO timestamps older chat logs contain.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(value) = DateTime::parse_from_rfc3339(raw) {
            return Ok(value.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|error| format!("invalid timestamp `{raw}`: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{
        timestamp, ChatHistoryPage, ChatMessage, ConversationListPage, ConversationSummary,
        Pagination, Role,
    };

    fn message_at(role: Role, content: &str, minutes: i64) -> ChatMessage {
        let mut message = ChatMessage::new(role, content, None);
        message.timestamp =
            Utc.with_ymd_and_hms(2025, 6, 11, 9, 0, 0).single().expect("valid date")
                + Duration::minutes(minutes);
        message
    }

    #[test]
    fn pagination_rejects_out_of_range_values() {
        assert!(Pagination::new(0, 10).is_err());
        assert!(Pagination::new(1, 0).is_err());
        assert!(Pagination::new(1, 101).is_err());
        assert!(Pagination::new(3, 100).is_ok());
    }

    #[test]
    fn history_page_reports_metadata() {
        let messages =
            (0..25).map(|index| message_at(Role::User, &format!("m{index}"), index)).collect::<Vec<_>>();

        let page = ChatHistoryPage::from_messages(&messages, Pagination { page: 3, limit: 10 });
        assert_eq!(page.messages.len(), 5);
        assert_eq!(page.messages[0].content, "m20");
        assert_eq!(page.total_messages, 25);
        assert_eq!(page.page.total_pages, 3);
        assert!(!page.page.has_next);
        assert!(page.page.has_previous);

        let beyond = ChatHistoryPage::from_messages(&messages, Pagination { page: 9, limit: 10 });
        assert!(beyond.messages.is_empty());
        assert_eq!(beyond.total_messages, 25);
    }

    #[test]
    fn empty_history_has_zero_pages() {
        let page = ChatHistoryPage::from_messages(&[], Pagination::default());
        assert_eq!(page.page.total_pages, 0);
        assert!(!page.page.has_next);
        assert!(!page.page.has_previous);
    }

    #[test]
    fn summary_truncates_long_last_message() {
        let long = "x".repeat(150);
        let messages = vec![message_at(Role::User, "hi", 0), message_at(Role::Assistant, &long, 1)];

        let summary = ConversationSummary::from_messages("c1", &messages).expect("summary");
        assert_eq!(summary.last_message.chars().count(), 100);
        assert!(summary.last_message.ends_with("..."));
        assert_eq!(summary.message_count, 2);
        assert_eq!(summary.last_role, Role::Assistant);

        assert!(ConversationSummary::from_messages("empty", &[]).is_none());
    }

    #[test]
    fn conversation_list_is_newest_first() {
        let older = ConversationSummary::from_messages("old", &[message_at(Role::User, "a", 0)])
            .expect("summary");
        let newer = ConversationSummary::from_messages("new", &[message_at(Role::User, "b", 30)])
            .expect("summary");

        let page = ConversationListPage::from_summaries(vec![older, newer], Pagination::default());
        let ids = page.conversations.iter().map(|summary| summary.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["new", "old"]);
        assert_eq!(page.total_conversations, 2);
    }

    #[test]
    fn timestamps_accept_offsetless_iso_format() {
        let parsed = timestamp::parse("2025-06-11T09:30:00.123456").expect("naive timestamp");
        assert_eq!(parsed.timestamp(), 1_749_634_200);
        assert!(timestamp::parse("2025-06-11T09:30:00+00:00").is_ok());
        assert!(timestamp::parse("yesterday").is_err());
    }

    #[test]
    fn chat_message_serializes_lowercase_role_and_flattened_page() {
        let messages = vec![message_at(Role::User, "hello", 0)];
        let page = ChatHistoryPage::from_messages(&messages, Pagination::default());
        let value = serde_json::to_value(&page).expect("serialize");

        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["total_pages"], 1);
        assert_eq!(value["has_next"], false);
        assert!(value["messages"][0]["openai_id"].is_null());
    }
}
