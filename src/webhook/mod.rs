//! Alertmanager webhook receiver.
//!
//! Routes:
//! - `POST /webhook` accepts one notification and merges its alerts into
//!   the buffer
//! - `GET /-/healthy` liveness check
//! - `GET /api/v1/buffer` current buffer contents

pub mod error;
pub mod options;
pub mod server;

pub use error::{ErrorResponse, WebError};
pub use options::WebhookOptions;
pub use server::WebhookServer;

use crate::alert::{Alert, AlertGroup};
use crate::buffer::DedupBuffer;
use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{Level, event};

#[derive(Clone)]
struct WebhookState {
    buffer: Arc<DedupBuffer>,
    options: Arc<WebhookOptions>,
}

/// Builds the receiver's router.
pub fn router(buffer: Arc<DedupBuffer>, options: WebhookOptions) -> Router {
    let state = WebhookState {
        buffer,
        options: Arc::new(options),
    };

    Router::new()
        .route("/webhook", post(receive))
        .route("/-/healthy", get(healthy))
        .route("/api/v1/buffer", get(buffer_snapshot))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn receive(State(state): State<WebhookState>, body: Bytes) -> error::Result<StatusCode> {
    let group: AlertGroup = serde_json::from_slice(&body).map_err(|err| {
        event!(Level::WARN, error = %err, "rejecting undecodable alert group");
        WebError::Input(format!("invalid alert group: {}", err))
    })?;

    if group.version != state.options.version {
        event!(
            Level::WARN,
            version = %group.version,
            expected = %state.options.version,
            "rejecting alert group with unsupported version"
        );
        return Err(WebError::Input(format!(
            "unsupported webhook version '{}', expected '{}'",
            group.version, state.options.version
        )));
    }

    let received = group.alerts.len();
    state.buffer.update(group.alerts, state.options.gate_wait).await?;

    event!(
        Level::DEBUG,
        receiver = %group.receiver,
        group_key = %group.group_key,
        received,
        "alert group accepted"
    );
    Ok(StatusCode::OK)
}

async fn healthy() -> StatusCode {
    StatusCode::OK
}

async fn buffer_snapshot(State(state): State<WebhookState>) -> error::Result<Json<Vec<Alert>>> {
    Ok(Json(state.buffer.snapshot(state.options.gate_wait).await?))
}
