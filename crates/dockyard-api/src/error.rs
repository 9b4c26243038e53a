//! API error handling.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    /// The compute service refused a submission.
    BadGateway(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<dockyard_core::Error> for ApiError {
    fn from(err: dockyard_core::Error) -> Self {
        use dockyard_core::Error;
        match err {
            Error::UnresolvedParameter { .. } | Error::NotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            Error::ParameterCollision { .. } | Error::OrderViolation { .. } => {
                ApiError::Conflict(err.to_string())
            }
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::SubmissionFailed(msg) => ApiError::BadGateway(msg),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockyard_core::{Error, UnitKind};

    fn status(err: Error) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status(Error::UnresolvedParameter {
                key: "demo-pipeline".to_string()
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(Error::OrderViolation {
                unit: UnitKind::Pipeline,
                predecessor: UnitKind::Build
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(Error::InvalidInput("bad".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(Error::SubmissionFailed("queue gone".to_string())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(Error::Internal("boom".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
