//! HTTP handlers for the ingest endpoint.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{StatusCode, Uri},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::message::Message;

/// Body of `POST /ingest`. Missing fields are treated as empty strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestRequest {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /ingest - Queue a live message for the worker pool.
///
/// The body is decoded whatever the content type says, so plain `curl -d`
/// works. Returns as soon as the message is queued.
pub async fn ingest(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<StatusResponse>)> {
    // A literal `null` body is an empty message.
    let request = serde_json::from_slice::<Option<IngestRequest>>(&body)?.unwrap_or_default();

    let message = Message::live(request.kind, request.message);
    debug!(kind = %message.kind, bytes = message.body.len(), "ingesting live message");
    state.sender.submit(message).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StatusResponse {
            status: "accepted".to_string(),
        }),
    ))
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::UnknownRoute(uri.path().to_string())
}
