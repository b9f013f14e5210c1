pub mod debug;
pub mod health;
pub mod table;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// ```text
/// /table                              cursor page of rows (GET)
/// /table/query                        offset page with sorting (POST)
/// /table/update-cells                 batch cell update (PATCH)
/// /table/bulk-update                  transactional row update (POST)
/// /table/notifications                push stream (GET, SSE)
/// /table/notifications/recent         recent changes (GET)
///
/// /debug/pg-listener                  change-feed status (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/table", table::router())
        .nest("/debug", debug::router())
}
