use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use confguide_core::config::{AppConfig, LlmProvider};
use serde::Serialize;

#[derive(Clone, Debug)]
pub struct HealthState {
    pub llm_client_ready: bool,
    pub api_key_configured: bool,
}

impl HealthState {
    pub fn from_config(config: &AppConfig) -> Self {
        let api_key_configured = config.llm.api_key_configured();
        Self {
            llm_client_ready: api_key_configured || config.llm.provider == LlmProvider::Ollama,
            api_key_configured,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RootResponse {
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub openai_client: &'static str,
    pub api_key_configured: bool,
    pub timestamp: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/", get(root)).route("/health", get(health)).with_state(state)
}

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse { status: "healthy", message: "Conference guide API is running" })
}

pub async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        openai_client: if state.llm_client_ready { "initialized" } else { "not_initialized" },
        api_key_configured: state.api_key_configured,
        timestamp: Utc::now().to_rfc3339(),
    })
}
