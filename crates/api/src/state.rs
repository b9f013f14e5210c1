use std::sync::Arc;

use gridsync_core::schema::TableSchema;
use gridsync_events::{BroadcastHub, ChangeFeedListener};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind `Arc` or is already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: gridsync_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Column allow-list for cell updates.
    pub schema: Arc<TableSchema>,
    /// Registry of open push streams.
    pub hub: Arc<BroadcastHub>,
    /// Postgres change-feed bridge feeding the hub.
    pub listener: Arc<ChangeFeedListener>,
}
