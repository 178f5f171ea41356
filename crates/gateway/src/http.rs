//! HTTP surface of the gateway.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use mcp::Connector;
use runtime::{
    AgentProfile, ChatReply, ChatTurnRequest, ClientFactory, Orchestrator, ToolSummary,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

pub const HEALTH_PATH: &str = "/health";
pub const CHAT_PATH: &str = "/ai/chat";
pub const MODELS_PATH: &str = "/ai/models";
pub const TOOLS_PATH: &str = "/ai/tools";
pub const AGENTS_PATH: &str = "/ai/agents";

/// Build the gateway router around a shared orchestrator.
pub fn router<F, C>(orchestrator: Arc<Orchestrator<F, C>>) -> Router
where
    F: ClientFactory + 'static,
    C: Connector + 'static,
{
    Router::new()
        .route(HEALTH_PATH, get(health))
        .route(CHAT_PATH, post(chat::<F, C>))
        .route(MODELS_PATH, get(models::<F, C>))
        .route(TOOLS_PATH, get(tools::<F, C>))
        .route(AGENTS_PATH, get(agents::<F, C>))
        .layer(TraceLayer::new_for_http())
        .with_state(orchestrator)
}

/// Error response with a `{"detail": ...}` body.
#[derive(Debug)]
pub enum ApiError {
    /// The caller sent something we do not handle.
    BadRequest(String),
    /// The gateway is misconfigured; the message names the settings.
    Config(String),
    /// A provider or the tool host failed. Details stay in the logs.
    Upstream(&'static str),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn detail(&self) -> &str {
        match self {
            Self::BadRequest(detail) | Self::Config(detail) => detail.as_str(),
            Self::Upstream(detail) => detail,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "detail": self.detail() }));
        (self.status(), body).into_response()
    }
}

impl From<runtime::Error> for ApiError {
    fn from(e: runtime::Error) -> Self {
        if e.is_client_error() {
            warn!(error = %e, "rejected chat request");
        }
        match e {
            runtime::Error::InvalidRequest(detail) => Self::BadRequest(detail),
            runtime::Error::Config(e) => {
                error!(error = %e, "gateway is misconfigured");
                Self::Config(e.to_string())
            }
            runtime::Error::Model(e) => {
                error!(error = %e, "llm provider call failed");
                Self::Upstream("LLM provider request failed")
            }
            runtime::Error::ToolHost(e) => {
                error!(error = %e, "tool host request failed");
                Self::Upstream("tool host unavailable")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(error = %rejection, "rejected chat body");
        Self::BadRequest(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
struct ModelsResponse {
    models: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ToolsResponse {
    tools: Vec<ToolSummary>,
}

#[derive(Debug, Serialize)]
struct AgentsResponse {
    agents: Vec<&'static AgentProfile>,
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn chat<F, C>(
    State(orchestrator): State<Arc<Orchestrator<F, C>>>,
    body: Result<Json<ChatTurnRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError>
where
    F: ClientFactory + 'static,
    C: Connector + 'static,
{
    let Json(request) = body?;
    let reply = orchestrator.chat(&request).await?;
    Ok(Json(reply))
}

async fn models<F, C>(State(orchestrator): State<Arc<Orchestrator<F, C>>>) -> Json<ModelsResponse>
where
    F: ClientFactory + 'static,
    C: Connector + 'static,
{
    Json(ModelsResponse {
        models: orchestrator.list_models(),
    })
}

async fn tools<F, C>(State(orchestrator): State<Arc<Orchestrator<F, C>>>) -> Json<ToolsResponse>
where
    F: ClientFactory + 'static,
    C: Connector + 'static,
{
    Json(ToolsResponse {
        tools: orchestrator.list_tools().await,
    })
}

async fn agents<F, C>(State(orchestrator): State<Arc<Orchestrator<F, C>>>) -> Json<AgentsResponse>
where
    F: ClientFactory + 'static,
    C: Connector + 'static,
{
    Json(AgentsResponse {
        agents: orchestrator.list_agents(),
    })
}
