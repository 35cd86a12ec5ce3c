//! API error type with HTTP status mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fundscape_query::QueryError;
use fundscape_store::StoreError;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or invalid request parameter
    #[error("{0}")]
    Query(#[from] QueryError),

    /// Table missing, corrupt, empty or not loadable
    #[error("Data not loaded: {0}")]
    DataUnavailable(#[from] StoreError),

    /// Blocking task panicked or was cancelled
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Query(_) => StatusCode::BAD_REQUEST,
            ApiError::DataUnavailable(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn log(&self) {
        match self {
            ApiError::Query(e) => log::debug!("rejected request: {e}"),
            ApiError::DataUnavailable(e) => log::error!("data unavailable: {e}"),
            ApiError::Internal(e) => log::error!("internal error: {e}"),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// `{"error": "..."}`
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Same errors, rendered as `{"status": "error", "message": "..."}` for
/// the health and reload endpoints.
#[derive(Debug)]
pub struct StatusError(pub ApiError);

impl From<ApiError> for StatusError {
    fn from(e: ApiError) -> Self {
        StatusError(e)
    }
}

impl From<StoreError> for StatusError {
    fn from(e: StoreError) -> Self {
        StatusError(ApiError::DataUnavailable(e))
    }
}

#[derive(Serialize)]
struct StatusBody {
    status: &'static str,
    message: String,
}

impl IntoResponse for StatusError {
    fn into_response(self) -> Response {
        self.0.log();
        let body = StatusBody {
            status: "error",
            message: self.0.to_string(),
        };
        (self.0.status_code(), Json(body)).into_response()
    }
}
