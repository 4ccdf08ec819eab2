use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::services::ServiceError;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Request-validating facade error mapping (C10, §7): domain error kinds
/// become HTTP statuses, each with a JSON `{"error": "..."}"` body.
impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            ServiceError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}
