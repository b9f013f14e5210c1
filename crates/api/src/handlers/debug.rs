//! Diagnostics.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

/// Change-feed listener status.
#[derive(Debug, Serialize)]
pub struct ListenerStatus {
    pub connected: bool,
    /// Number of open push streams.
    pub subscribers: usize,
}

/// GET /api/debug/pg-listener
pub async fn listener_status(State(state): State<AppState>) -> Json<ListenerStatus> {
    Json(ListenerStatus {
        connected: state.listener.is_connected(),
        subscribers: state.hub.subscriber_count().await,
    })
}
