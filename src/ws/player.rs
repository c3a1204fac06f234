//! Player connection endpoint

use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::coordinator::JoinRequest;
use crate::error::JoinError;
use crate::state::AppState;
use crate::types::Role;

/// Query parameters of `/connect`. Ids arrive as strings so that a malformed
/// id degrades to a fresh join instead of a rejected request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectQuery {
    pub name: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

impl ConnectQuery {
    pub fn into_join_request(self) -> Result<JoinRequest, JoinError> {
        let name = self
            .name
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(JoinError::MissingName)?;

        Ok(JoinRequest {
            name,
            user_id: self.user_id.and_then(|s| s.trim().parse().ok()),
            session_id: self.session_id.and_then(|s| s.trim().parse().ok()),
        })
    }
}

/// GET /connect?name=&userId=&sessionId=
///
/// Rejected with 400 before upgrading when there is no host or no name.
pub async fn player_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    tracing::info!(
        "Player connection request: name={:?}, userId={:?}, sessionId={:?}",
        params.name,
        params.user_id,
        params.session_id
    );

    let request = match params.into_join_request() {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };

    let (tx, rx) = mpsc::channel(state.outbound_queue);
    match state.coordinator.connect_player(request, tx).await {
        Ok(accepted) => super::upgrade(ws, accepted, Role::Player, rx, state),
        Err(e) => {
            tracing::warn!("Player rejected: {}", e);
            e.into_response()
        }
    }
}
