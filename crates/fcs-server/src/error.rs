//! API error surface: every failure is `{ "error": string | ValidationFailure[] }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fcs_core::version::VersionError;
use fcs_core::JourneyError;
use fcs_evidence::EvidenceError;
use serde_json::json;
use tracing::{error, warn};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Journey(#[from] JourneyError),

    #[error("invalid report archive: {0}")]
    Evidence(#[from] EvidenceError),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Journey(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::Evidence(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Version(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, error = %self, "request failed");
        } else {
            warn!(%status, error = %self, "request rejected");
        }
        let body = match &self {
            Self::Journey(JourneyError::Validation(failures)) => json!({ "error": failures }),
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
