use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

const INTERNAL_MESSAGE: &str = "Tax certificate request failed";

/// Errors surfaced by the tax certificate route.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// Malformed body or a request the core refused to build.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Token, encryption, transport or provider failure.
    #[error(transparent)]
    Internal(crate::error::Error),
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(ref msg) => {
                tracing::warn!(error = %msg, "Rejected tax certificate request");
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            Self::Internal(_) => {
                tracing::error!(error = %self, "Tax certificate request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": INTERNAL_MESSAGE })),
                )
                    .into_response()
            }
        }
    }
}

impl From<crate::error::Error> for RouteError {
    fn from(e: crate::error::Error) -> Self {
        match e {
            crate::error::Error::InvalidRequest(msg) => Self::BadRequest(msg),
            other => Self::Internal(other),
        }
    }
}
