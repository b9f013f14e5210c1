use axum::routing::get;
use axum::Router;

use crate::handlers::debug;
use crate::state::AppState;

/// Routes mounted at `/debug`.
pub fn router() -> Router<AppState> {
    Router::new().route("/pg-listener", get(debug::listener_status))
}
