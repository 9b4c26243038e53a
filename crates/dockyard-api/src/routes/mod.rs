//! API routes.

pub mod deployment;
pub mod events;
pub mod health;
pub mod jobs;
pub mod parameters;

use crate::AppState;
use axum::Router;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_router())
        .merge(health::router())
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/parameters", parameters::router())
        .nest("/events", events::router())
        .nest("/jobs", jobs::router())
        .nest("/deployment", deployment::router())
}
