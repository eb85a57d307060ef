//! Mapping of service errors onto HTTP responses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::common::error::{TaxiCode, TaxiError};

/// JSON error body: `{"code": "...", "message": "..."}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: TaxiCode,
    pub message: String,
}

pub fn status_for(code: TaxiCode) -> StatusCode {
    match code {
        TaxiCode::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        TaxiCode::ArtifactNotFound => StatusCode::NOT_FOUND,
        TaxiCode::Transport => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<TaxiError> for ApiError {
    fn from(err: TaxiError) -> Self {
        let code = err.code();
        Self {
            status: status_for(code),
            code,
            message: err.to_string(),
        }
    }
}

/// Malformed or incomplete JSON bodies are validation failures, not 400s.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            code: TaxiCode::Validation,
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(error_code = self.code.as_str(), reason = %self.message, "request failed");
        } else {
            warn!(error_code = self.code.as_str(), reason = %self.message, "request rejected");
        }
        let body = ErrorBody {
            code: self.code.as_str().to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
