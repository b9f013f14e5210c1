//! Handlers for the push stream and the recent-changes listing.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::HeaderName;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::stream::{self, StreamExt};
use gridsync_core::notification::{ChangeAction, ChangeNotification};
use gridsync_core::page::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use gridsync_db::repositories::NotificationLogRepo;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::sse::{SseSubscriber, SubscriptionStream};
use crate::state::AppState;

/// Tells nginx-style reverse proxies not to buffer the stream.
const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Query parameters for `GET /api/table/notifications/recent`.
#[derive(Debug, Default, Deserialize)]
pub struct RecentParams {
    pub table: Option<String>,
    pub action: Option<String>,
    pub limit: Option<i64>,
}

/// GET /api/table/notifications -- server-sent change notifications.
///
/// Opens with a `: SSE connected` comment, then sends one `data:` frame per
/// resolved change and a `: heartbeat` comment on every idle interval. If
/// the change feed cannot be started the stream still opens and carries
/// heartbeats only. The feed is started in the background so a slow or
/// unreachable database never delays the response.
pub async fn stream_notifications(State(state): State<AppState>) -> impl IntoResponse {
    state.listener.spawn_connect();

    let (subscriber, receiver) = SseSubscriber::new(state.pool.clone());
    let id = state.hub.register(Arc::new(subscriber)).await;
    tracing::info!(subscriber_id = %id, "Push client connected");

    let frames = SubscriptionStream::new(receiver, Arc::clone(&state.hub), id)
        .map(|json| Ok::<_, Infallible>(Event::default().data(json)));
    let greeting = stream::once(async { Ok::<_, Infallible>(Event::default().comment("SSE connected")) });

    let sse = Sse::new(greeting.chain(frames)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(state.config.sse_heartbeat_secs))
            .text("heartbeat"),
    );
    ([(X_ACCEL_BUFFERING, "no")], sse)
}

/// GET /api/table/notifications/recent -- newest change notifications,
/// optionally filtered by table and action.
pub async fn list_recent(
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> AppResult<Json<DataResponse<Vec<ChangeNotification>>>> {
    let action = params
        .action
        .as_deref()
        .filter(|a| !a.is_empty())
        .map(|a| a.to_uppercase().parse::<ChangeAction>())
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let entries =
        NotificationLogRepo::list_recent(&state.pool, params.table.as_deref(), action, limit).await?;

    let data = entries
        .iter()
        .filter_map(|entry| match entry.to_notification() {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::warn!(log_id = entry.id, error = %e, "Skipping invalid stored notification");
                None
            }
        })
        .collect();

    Ok(Json(DataResponse { data }))
}
