//! Ingest endpoint errors and their JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::dispatch::DispatchError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no route for {0}")]
    UnknownRoute(String),

    #[error("invalid ingest body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    #[error("method not allowed")]
    MethodNotAllowed,

    /// Every worker is gone, so nothing can be queued.
    #[error("dispatch queue is closed")]
    QueueClosed,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownRoute(_) => StatusCode::NOT_FOUND,
            Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownRoute(_) => "NOT_FOUND",
            Self::InvalidBody(_) => "INVALID_BODY",
            Self::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            Self::QueueClosed => "QUEUE_CLOSED",
        }
    }
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let error = self.to_string();

        if status.is_server_error() {
            warn!(code, "{}", error);
        } else {
            debug!(code, "{}", error);
        }

        (status, Json(ErrorResponse { error, code })).into_response()
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Closed | DispatchError::InvalidConfig(_) => ApiError::QueueClosed,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
