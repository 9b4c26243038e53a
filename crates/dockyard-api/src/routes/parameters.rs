//! Parameter lookup endpoints.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use dockyard_core::{Parameter, ParameterKey};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_parameters))
        .route("/{key}", get(get_parameter))
}

#[derive(Debug, Deserialize)]
pub struct ListParametersQuery {
    /// Raw key prefix. Without one, the served namespace's keys are listed.
    pub prefix: Option<String>,
}

async fn list_parameters(
    State(state): State<AppState>,
    Query(query): Query<ListParametersQuery>,
) -> Result<Json<Vec<Parameter>>, ApiError> {
    let parameters = match query.prefix {
        Some(prefix) => state.store.list(&prefix).await?,
        None => state.store.list_namespace(&state.config.namespace).await?,
    };
    Ok(Json(parameters))
}

async fn get_parameter(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Parameter>, ApiError> {
    let key = ParameterKey::from_raw(key);
    match state.store.get(&key).await? {
        Some(parameter) => Ok(Json(parameter)),
        None => Err(dockyard_core::Error::UnresolvedParameter {
            key: key.to_string(),
        }
        .into()),
    }
}
