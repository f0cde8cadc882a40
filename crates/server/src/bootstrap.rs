use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::Router;
use confguide_agent::ConversationService;
use confguide_core::config::{AppConfig, ConfigError, LoadOptions};
use confguide_storage::{JsonChatStore, JsonUserStore, ProfileRepository, StorageError};
use thiserror::Error;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use crate::api::{self, AppState};
use crate::health::{self, HealthState};
use crate::profile_source::UnconfiguredProfileSource;

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
}

impl Application {
    pub fn router(&self) -> Router {
        Router::new()
            .merge(health::router(HealthState::from_config(&self.config)))
            .merge(api::router(self.state.clone()))
            .layer(cors_layer(&self.config.server.allowed_origins))
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("chat storage unavailable: {0}")]
    Storage(#[from] StorageError),
    #[error("conversation service failed to start: {0}")]
    Service(#[source] anyhow::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let chats = JsonChatStore::open(config.storage.chat_path()).await?;
    let profiles = JsonUserStore::new(config.storage.user_path());

    // A missing or unreadable profile only loses personalization.
    let user_brief = match profiles.get_profile().await {
        Ok(profile) => profile.and_then(|profile| profile.assistant_brief()),
        Err(error) => {
            warn!(
                event_name = "system.bootstrap.profile_unavailable",
                error = %error,
                "user profile could not be loaded, continuing without it"
            );
            None
        }
    };

    let conversations = ConversationService::from_config(&config, user_brief.as_deref())
        .await
        .map_err(BootstrapError::Service)?;
    info!(
        event_name = "system.bootstrap.ready",
        assistant = %conversations.assistant_name(),
        chat_log = %chats.path().display(),
        "application bootstrap complete"
    );

    Ok(Application {
        config,
        state: AppState {
            conversations: Arc::new(conversations),
            chats: Arc::new(chats),
            profiles: Arc::new(profiles),
            profile_source: Arc::new(UnconfiguredProfileSource),
        },
    })
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if allowed_origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let origins = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(
                    event_name = "system.bootstrap.invalid_origin",
                    origin = %origin,
                    "ignoring invalid CORS origin"
                );
                None
            }
        })
        .collect::<Vec<_>>();
    layer.allow_origin(AllowOrigin::list(origins))
}
