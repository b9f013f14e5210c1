//! Route definitions for the `/table` resource.

use axum::routing::{get, patch, post};
use axum::Router;

use crate::handlers::{notifications, table};
use crate::state::AppState;

/// Routes mounted at `/table`.
///
/// ```text
/// GET    /                          -> list_rows
/// POST   /query                     -> list_offset_page
/// PATCH  /update-cells              -> update_cells
/// POST   /bulk-update               -> bulk_update
/// GET    /notifications             -> stream_notifications
/// GET    /notifications/recent      -> list_recent
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(table::list_rows))
        .route("/query", post(table::list_offset_page))
        .route("/update-cells", patch(table::update_cells))
        .route("/bulk-update", post(table::bulk_update))
        .route("/notifications", get(notifications::stream_notifications))
        .route("/notifications/recent", get(notifications::list_recent))
}
