use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

/// Failure taxonomy for the user-record service.
///
/// Every variant renders as a `{"error": "<message>"}` JSON body. Storage
/// failures keep their source for logging but only expose the short context
/// string to the client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Username already exists")]
    DuplicateUsername,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("User not found")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error("{context}")]
    Storage {
        context: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl ApiError {
    pub fn storage(context: &'static str, source: anyhow::Error) -> Self {
        Self::Storage { context, source }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::DuplicateUsername | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if let ApiError::Storage { context, source } = &self {
            error!(error = %source, "{context}");
        }
        let msg = self.to_string();
        (status, Json(serde_json::json!({ "error": msg }))).into_response()
    }
}
