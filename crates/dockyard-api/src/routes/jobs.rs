//! Job submission listing.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use dockyard_core::job::JobSubmission;
use serde::Deserialize;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_jobs))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub queue: Option<String>,
}

async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Json<Vec<JobSubmission>> {
    let jobs = match query.queue {
        Some(queue) => state.queue.jobs_in(&queue).await,
        None => state.queue.jobs().await,
    };
    Json(jobs)
}
