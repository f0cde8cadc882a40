use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use confguide_agent::ConversationService;
use confguide_core::domain::chat::{
    ChatHistoryPage, ChatMessage, ConversationListPage, Pagination,
};
use confguide_core::domain::profile::UserProfile;
use confguide_core::errors::{ApplicationError, InterfaceError};
use confguide_storage::{ChatRepository, ProfileRepository};

use crate::profile_source::ProfileSource;

#[derive(Clone)]
pub struct AppState {
    pub conversations: Arc<ConversationService>,
    pub chats: Arc<dyn ChatRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub profile_source: Arc<dyn ProfileSource>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MessageRequest {
    pub message: String,
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: String,
    pub openai_id: String,
    pub message: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProfileRequest {
    #[serde(rename = "linkedinUrl")]
    pub linkedin_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileNameResponse {
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
    pub error_code: String,
    pub timestamp: String,
}

/// An interface error rendered as `{detail, error_code, timestamp}`.
#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl ApiError {
    /// Maps an application failure, prefixing failures with what was being attempted.
    fn new(action: &str, error: ApplicationError) -> Self {
        let correlation_id = Uuid::new_v4().to_string();
        let interface = match error {
            failure @ (ApplicationError::Execution { .. }
            | ApplicationError::Persistence(_)
            | ApplicationError::Integration(_)) => InterfaceError::Internal {
                message: format!("{action}: {failure}"),
                correlation_id,
            },
            other => other.into_interface(correlation_id),
        };
        Self(interface)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        error!(
            event_name = "api.request.failed",
            correlation_id = %self.0.correlation_id(),
            status = status.as_u16(),
            error = %self.0,
            "request failed"
        );
        let body = ErrorBody {
            detail: self.0.message().to_string(),
            error_code: status.as_u16().to_string(),
            timestamp: Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/messages", post(create_message))
        .route("/chat", get(list_conversations))
        .route("/chat/{conversation_id}", get(chat_history))
        .route("/user-profile", get(user_profile))
        .route("/linkedin-profile", post(import_profile))
        .with_state(state)
}

pub async fn create_message(
    State(state): State<AppState>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    const ACTION: &str = "Failed to process message";

    if request.message.trim().is_empty() {
        return Err(ApiError::new(
            ACTION,
            ApplicationError::InvalidInput("message must not be empty".to_string()),
        ));
    }
    let conversation_id = request
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    info!(event_name = "api.message.received", conversation_id = %conversation_id, "processing message");

    state
        .chats
        .save_message(&conversation_id, ChatMessage::user(request.message.clone()))
        .await
        .map_err(|error| ApiError::new(ACTION, error.into()))?;

    let reply = state
        .conversations
        .create_response(&request.message, &conversation_id)
        .await
        .map_err(|error| ApiError::new(ACTION, error))?;
    if reply.rejected {
        info!(
            event_name = "api.message.rejected",
            conversation_id = %conversation_id,
            "message was outside the conference domain"
        );
    }

    state
        .chats
        .save_message(
            &conversation_id,
            ChatMessage::assistant(reply.message.clone(), reply.response_id.clone()),
        )
        .await
        .map_err(|error| ApiError::new(ACTION, error.into()))?;

    Ok(Json(MessageResponse {
        id: conversation_id,
        openai_id: reply.response_id,
        message: reply.message,
    }))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<ConversationListPage>, ApiError> {
    const ACTION: &str = "Failed to retrieve conversations";

    pagination.validate().map_err(|error| ApiError::new(ACTION, error))?;
    let page = state
        .chats
        .all_conversations(pagination)
        .await
        .map_err(|error| ApiError::new(ACTION, error.into()))?;
    Ok(Json(page))
}

pub async fn chat_history(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<ChatHistoryPage>, ApiError> {
    const ACTION: &str = "Failed to retrieve chat history";

    pagination.validate().map_err(|error| ApiError::new(ACTION, error))?;
    let page = state
        .chats
        .conversation_messages(&conversation_id, pagination)
        .await
        .map_err(|error| ApiError::new(ACTION, error.into()))?;
    Ok(Json(page))
}

pub async fn user_profile(State(state): State<AppState>) -> Result<Json<UserProfile>, ApiError> {
    const ACTION: &str = "Failed to retrieve user profile";

    match state.profiles.get_profile().await {
        Ok(Some(profile)) => Ok(Json(profile)),
        Ok(None) => Err(ApiError::new(
            ACTION,
            ApplicationError::NotFound(
                "No user profile found. Please import a profile first.".to_string(),
            ),
        )),
        Err(error) => Err(ApiError::new(ACTION, error.into())),
    }
}

pub async fn import_profile(
    State(state): State<AppState>,
    Json(request): Json<ProfileRequest>,
) -> Result<Json<ProfileNameResponse>, ApiError> {
    const ACTION: &str = "Failed to import profile";

    let url = request.linkedin_url.trim();
    if url.is_empty() {
        return Err(ApiError::new(
            ACTION,
            ApplicationError::InvalidInput("linkedinUrl must not be empty".to_string()),
        ));
    }

    let mut profile =
        state.profile_source.fetch(url).await.map_err(|error| ApiError::new(ACTION, error))?;
    profile.normalize_names().map_err(|error| ApiError::new(ACTION, error))?;

    let saved = state
        .profiles
        .save_profile(url, profile)
        .await
        .map_err(|error| ApiError::new(ACTION, error.into()))?;

    info!(
        event_name = "api.profile.imported",
        fields = saved.len(),
        "profile imported and saved"
    );
    Ok(Json(ProfileNameResponse {
        first_name: saved.first_name().to_string(),
        last_name: saved.last_name().to_string(),
    }))
}
