//! Deployment summary: stacks and their outputs.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use dockyard_core::Deployment;
use serde::Serialize;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_deployment))
        .route("/outputs", get(list_outputs))
}

async fn get_deployment(State(state): State<AppState>) -> Json<Deployment> {
    Json(state.deployment.as_ref().clone())
}

#[derive(Debug, Serialize)]
pub struct OutputResponse {
    pub stack: String,
    pub logical_id: String,
    pub description: String,
    pub value: String,
}

async fn list_outputs(State(state): State<AppState>) -> Json<Vec<OutputResponse>> {
    let outputs = state
        .deployment
        .outputs()
        .map(|(unit, output)| OutputResponse {
            stack: unit.stack_name.clone(),
            logical_id: output.logical_id.clone(),
            description: output.description.clone(),
            value: output.value.clone(),
        })
        .collect();
    Json(outputs)
}
