//! API routes for fixbotd.

use crate::orchestrator::EventOutcome;
use crate::server::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use fixbot_shared::WizardError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

type AppStateArc = Arc<AppState>;

/// Domain failures answer with a client status; anything else is a 500.
fn error_status(err: &anyhow::Error) -> StatusCode {
    match err.downcast_ref::<WizardError>() {
        Some(WizardError::SubmitBlocked(_)) => StatusCode::CONFLICT,
        Some(WizardError::Validation { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
        None => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Webhook Routes
// ============================================================================

/// Inbound chat message from the bot platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookMessage {
    pub chat_id: String,
    pub user_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub media_urls: Vec<String>,
}

/// Inbound button press; `data` is the opaque callback token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookCallback {
    pub data: String,
}

/// What the engine did with the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventResponse {
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl From<EventOutcome> for EventResponse {
    fn from(outcome: EventOutcome) -> Self {
        let mut response = Self {
            outcome: String::new(),
            message_id: None,
            ticket_id: None,
            notice: None,
        };
        match outcome {
            EventOutcome::Started { message_id } => {
                response.outcome = "started".into();
                response.message_id = Some(message_id);
            }
            EventOutcome::Updated => response.outcome = "updated".into(),
            EventOutcome::Rejected { notice } => {
                response.outcome = "rejected".into();
                response.notice = Some(notice);
            }
            EventOutcome::Gone => response.outcome = "gone".into(),
            EventOutcome::Ignored => response.outcome = "ignored".into(),
            EventOutcome::Submitted { ticket_id } => {
                response.outcome = "submitted".into();
                response.ticket_id = Some(ticket_id);
            }
            EventOutcome::Cancelled => response.outcome = "cancelled".into(),
        }
        response
    }
}

pub fn webhook_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/webhook/message", post(inbound_message))
        .route("/v1/webhook/callback", post(inbound_callback))
}

async fn inbound_message(
    State(state): State<AppStateArc>,
    Json(req): Json<WebhookMessage>,
) -> Result<Json<EventResponse>, (StatusCode, String)> {
    let outcome = state
        .orchestrator
        .handle_message(&req.chat_id, &req.user_id, &req.text, &req.media_urls)
        .await
        .map_err(|e| {
            error!("Message event failed: {:#}", e);
            (error_status(&e), e.to_string())
        })?;
    Ok(Json(outcome.into()))
}

async fn inbound_callback(
    State(state): State<AppStateArc>,
    Json(req): Json<WebhookCallback>,
) -> Result<Json<EventResponse>, (StatusCode, String)> {
    let outcome = state.orchestrator.handle_button(&req.data).await.map_err(|e| {
        error!("Callback event failed: {:#}", e);
        (error_status(&e), e.to_string())
    })?;
    Ok(Json(outcome.into()))
}

// ============================================================================
// Health Routes
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub open_sessions: usize,
}

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/health", get(health_check))
}

async fn health_check(
    State(state): State<AppStateArc>,
) -> Result<Json<HealthResponse>, (StatusCode, String)> {
    let open_sessions = state
        .orchestrator
        .store()
        .open_count()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: fixbot_shared::VERSION.to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        open_sessions,
    }))
}
