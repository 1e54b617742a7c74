//! HTTP ingest endpoint.
//!
//! `POST /ingest` turns a `{"type", "message"}` body into a live [`Message`]
//! and pushes it onto the same dispatcher queue the tailer feeds. `GET /health`
//! reports that the process is up.
//!
//! [`Message`]: crate::message::Message

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use handlers::{HealthResponse, IngestRequest, StatusResponse};
pub use routes::create_router;
pub use state::AppState;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Serve `router` on `listener` until `shutdown` is cancelled.
///
/// In-flight requests are allowed to finish, including ones blocked on a full
/// queue.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}
