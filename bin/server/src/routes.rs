//! HTTP routes: the Cloud API webhook and the sweep trigger.

use crate::webhook::parse_envelope;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chime_inbound::MessageProcessor;
use chime_scheduler::SchedulerSweep;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Shared state for the routes.
pub struct AppState {
    pub processor: Arc<MessageProcessor>,
    pub sweep: Arc<SchedulerSweep>,
    /// Token the Cloud API echoes during webhook verification. Empty
    /// disables verification.
    pub verify_token: String,
}

/// Builds the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook", get(verify).post(receive))
        .route("/sweep", post(sweep))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Query parameters of the webhook verification request.
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// Answers the Cloud API subscription handshake.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let token_matches = !state.verify_token.is_empty()
        && query.token.as_deref() == Some(state.verify_token.as_str());
    match (query.mode.as_deref(), query.challenge) {
        (Some("subscribe"), Some(challenge)) if token_matches => {
            info!("webhook verified");
            (StatusCode::OK, challenge).into_response()
        }
        _ => {
            warn!("webhook verification rejected");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// Accepts a webhook notification.
///
/// Messages are processed on spawned tasks so the Cloud API gets its 200
/// right away; a slow answer makes it redeliver.
pub async fn receive(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    let messages = match parse_envelope(body, Utc::now()) {
        Ok(messages) => messages,
        Err(e) => {
            warn!(error = %e, "ignoring malformed webhook body");
            return StatusCode::OK;
        }
    };
    if messages.is_empty() {
        debug!("webhook carried no messages");
    }

    for message in messages {
        let processor = state.processor.clone();
        tokio::spawn(async move {
            match processor.process(message).await {
                Ok(outcome) => debug!(?outcome, "message handled"),
                Err(e) => error!(error = %e, "message not handled"),
            }
        });
    }
    StatusCode::OK
}

/// Runs one sweep tick.
pub async fn sweep(State(state): State<Arc<AppState>>) -> Response {
    match state.sweep.run_once().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            error!(error = %e, "sweep failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "sweep failed").into_response()
        }
    }
}
