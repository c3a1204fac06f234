//! Host connection endpoint

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::state::AppState;
use crate::types::Role;

/// GET /host
///
/// Always accepted. A new host starts a new session and disconnects every
/// player of the previous one.
pub async fn host_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let (tx, rx) = mpsc::channel(state.outbound_queue);

    match state.coordinator.connect_host(tx).await {
        Ok(accepted) => {
            tracing::info!("Host connected, session {}", accepted.session_id);
            super::upgrade(ws, accepted, Role::Host, rx, state)
        }
        Err(e) => {
            tracing::error!("Failed to register host: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
    }
}
