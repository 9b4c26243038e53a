//! Registry event ingress.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use dockyard_core::job::SubmissionReceipt;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(receive_event))
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub matched: bool,
    pub submitted: Vec<SubmissionReceipt>,
}

/// Accepts the raw event envelope. A non-matching event is acknowledged
/// with 202 and has no effect.
async fn receive_event(
    State(state): State<AppState>,
    Json(event): Json<Value>,
) -> Result<(StatusCode, Json<EventResponse>), ApiError> {
    let submitted = state.router.route(&event).await?;
    if submitted.is_empty() {
        return Ok((
            StatusCode::ACCEPTED,
            Json(EventResponse {
                matched: false,
                submitted,
            }),
        ));
    }

    info!(jobs = submitted.len(), "Registry event triggered job submission");
    Ok((
        StatusCode::CREATED,
        Json(EventResponse {
            matched: true,
            submitted,
        }),
    ))
}
