//! Push-stream reconciliation.
//!
//! [`SseReconciler`] keeps one connection to the server's notification
//! stream open, decodes each `data:` frame into a [`ChangeNotification`],
//! reports it to the observer and merges UPDATE payloads into the shared
//! page cache.
//!
//! Merge rules:
//! - rows outside the cached window are skipped;
//! - only editable columns are merged;
//! - a cell with a pending local edit keeps its local value, other cells of
//!   the same row still take the pushed value;
//! - INSERT and DELETE are reported but never merged.
//!
//! Duplicate notifications (same table and source id) are reported every
//! time but merged only once per connection.

use std::collections::HashSet;

use futures::StreamExt;
use gridsync_core::backoff::Backoff;
use gridsync_core::cache::{RowCache, TABLE_QUERY_KEY};
use gridsync_core::notification::{ChangeAction, ChangeNotification, DedupKey};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::session::{SharedTableState, TableState};
use crate::sse::SseDecoder;

/// Lifecycle of the push connection. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

/// What the reconciler reports to its observer.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Connected,
    Disconnected,
    Notification(ChangeNotification),
    Error(String),
}

/// Result of handling one data frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Comment or heartbeat.
    Ignored,
    /// Could not be parsed.
    Invalid,
    /// Already merged on this connection.
    Duplicate,
    /// Reported without touching the cache.
    Reported,
    /// Merged into a cached row.
    Merged,
}

pub struct SseReconciler {
    config: ClientConfig,
    client: reqwest::Client,
    state: SharedTableState,
    events: mpsc::UnboundedSender<StreamEvent>,
    connection: ConnectionState,
    seen: HashSet<DedupKey>,
    backoff: Backoff,
}

impl SseReconciler {
    pub fn new(
        config: ClientConfig,
        state: SharedTableState,
        events: mpsc::UnboundedSender<StreamEvent>,
    ) -> Self {
        let backoff = Backoff::new(config.reconnect.clone());
        Self {
            config,
            client: reqwest::Client::new(),
            state,
            events,
            connection: ConnectionState::Connecting,
            seen: HashSet::new(),
            backoff,
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    /// Connect and keep reconnecting until `cancel` fires.
    pub async fn run(&mut self, cancel: CancellationToken) {
        let url = self.config.notifications_url();

        while !cancel.is_cancelled() {
            self.connection = ConnectionState::Connecting;
            tracing::debug!(url = %url, "Opening push stream");

            let opened = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.open(&url) => result,
            };

            match opened {
                Ok(response) => {
                    self.on_open();
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = self.consume(response) => {}
                    }
                    self.emit(StreamEvent::Disconnected);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Push stream connection failed");
                    self.emit(StreamEvent::Error(e.to_string()));
                }
            }

            self.connection = ConnectionState::Reconnecting;
            let delay = self.backoff.next_delay();
            tracing::info!(
                attempt = self.backoff.attempt(),
                delay_ms = delay.as_millis() as u64,
                "Reconnecting push stream",
            );
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.connection = ConnectionState::Closed;
        tracing::info!("Push stream closed");
    }

    /// Handle one decoded `data:` payload.
    pub async fn handle_data(&mut self, data: &str) -> FrameOutcome {
        let data = data.trim();
        if data.is_empty() || data.starts_with(':') {
            return FrameOutcome::Ignored;
        }

        let notification = match ChangeNotification::from_json(data) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable push payload");
                self.emit(StreamEvent::Error(format!("Invalid notification: {e}")));
                return FrameOutcome::Invalid;
            }
        };

        self.emit(StreamEvent::Notification(notification.clone()));

        if !self.seen.insert(notification.dedup_key()) {
            tracing::debug!(source_id = notification.source_id, "Duplicate notification");
            return FrameOutcome::Duplicate;
        }

        if notification.action != ChangeAction::Update {
            return FrameOutcome::Reported;
        }

        let mut state = self.state.lock().await;
        if merge_update(&mut state, &notification) {
            FrameOutcome::Merged
        } else {
            FrameOutcome::Reported
        }
    }

    /// Reset per-connection state once a stream opens.
    fn on_open(&mut self) {
        self.connection = ConnectionState::Connected;
        self.seen.clear();
        self.backoff.reset();
        tracing::info!("Push stream connected");
        self.emit(StreamEvent::Connected);
    }

    async fn open(&self, url: &str) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?
            .error_for_status()
    }

    /// Read frames until the stream ends or errors.
    async fn consume(&mut self, response: reqwest::Response) {
        let mut decoder = SseDecoder::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for data in decoder.push(&bytes) {
                        self.handle_data(&data).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Push stream interrupted");
                    self.emit(StreamEvent::Error(e.to_string()));
                    return;
                }
            }
        }
    }

    fn emit(&self, event: StreamEvent) {
        let _ = self.events.send(event);
    }
}

/// Merge a pushed UPDATE into the cached row. Returns `false` when the row
/// is not cached.
fn merge_update(state: &mut TableState, notification: &ChangeNotification) -> bool {
    let TableState { ledger, cache, schema } = state;
    let row_id = notification.row_id();
    let incoming = schema.retain_editable(&notification.payload.data);
    let local = ledger.modified_columns(row_id);

    let merged = cache.update_row(TABLE_QUERY_KEY, row_id, |row| {
        for (column, value) in &incoming {
            if !local.contains(column.as_str()) {
                row.set(column.clone(), value.clone());
            }
        }
    });

    if merged {
        tracing::debug!(row_id, columns = incoming.len(), kept_local = local.len(), "Merged push update");
    } else {
        tracing::debug!(row_id, "Pushed row not cached, skipping");
    }
    merged
}

#[cfg(test)]
mod tests {
    use gridsync_core::page::{Page, PageMeta, Row};
    use gridsync_core::pending::CellChange;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    use super::*;

    fn state_with(rows: Vec<Row>) -> SharedTableState {
        let mut state = TableState::default();
        state.cache.push_back_page(
            TABLE_QUERY_KEY,
            Page {
                data: rows,
                meta: PageMeta::default(),
            },
        );
        Arc::new(Mutex::new(state))
    }

    fn reconciler(state: &SharedTableState) -> (SseReconciler, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let reconciler = SseReconciler::new(ClientConfig::new("http://localhost:3000"), Arc::clone(state), tx);
        (reconciler, rx)
    }

    fn frame(source_id: i64, action: &str, row_id: i64, data: Value) -> String {
        json!({
            "sourceId": source_id.to_string(),
            "tableName": "data_table",
            "action": action,
            "payload": {
                "id": row_id,
                "table": "data_table",
                "action": action,
                "timestamp": "2026-01-01T00:00:00.000Z",
                "data": data,
                "changes": {}
            }
        })
        .to_string()
    }

    async fn cell(state: &SharedTableState, row: i64, column: &str) -> Value {
        state
            .lock()
            .await
            .cache
            .row(TABLE_QUERY_KEY, row)
            .and_then(|r| r.get(column).cloned())
            .unwrap_or_default()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    // -----------------------------------------------------------------------
    // Merge policy
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn pending_local_cell_survives_merge_of_other_columns() {
        let state = state_with(vec![Row::new(100).with("col_n_01", 1.0).with("col_b_01", false)]);
        {
            let mut guard = state.lock().await;
            guard.ledger.register_change(CellChange::new(100, "col_b_01", false, true));
            guard.cache.update_row(TABLE_QUERY_KEY, 100, |row| row.set("col_b_01", json!(true)));
        }
        let (mut reconciler, _rx) = reconciler(&state);

        let outcome = reconciler
            .handle_data(&frame(7, "UPDATE", 100, json!({"id": 100, "col_n_01": 42.5, "col_b_01": false})))
            .await;

        assert_eq!(outcome, FrameOutcome::Merged);
        assert_eq!(cell(&state, 100, "col_n_01").await, json!(42.5));
        assert_eq!(cell(&state, 100, "col_b_01").await, json!(true));
    }

    #[tokio::test]
    async fn duplicate_is_reported_twice_but_merged_once() {
        let state = state_with(vec![Row::new(1).with("col_s_01", "a")]);
        let (mut reconciler, mut rx) = reconciler(&state);
        let data = frame(7, "UPDATE", 1, json!({"col_s_01": "b"}));

        assert_eq!(reconciler.handle_data(&data).await, FrameOutcome::Merged);
        assert_eq!(reconciler.handle_data(&data).await, FrameOutcome::Duplicate);

        let notifications = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, StreamEvent::Notification(_)))
            .count();
        assert_eq!(notifications, 2);
    }

    #[tokio::test]
    async fn same_source_id_on_other_table_is_not_a_duplicate() {
        let state = state_with(vec![Row::new(1)]);
        let (mut reconciler, _rx) = reconciler(&state);
        let first = frame(7, "UPDATE", 1, json!({"col_s_01": "b"}));
        let other = first.replace("\"tableName\":\"data_table\"", "\"tableName\":\"other_table\"");

        reconciler.handle_data(&first).await;
        assert_ne!(reconciler.handle_data(&other).await, FrameOutcome::Duplicate);
    }

    #[tokio::test]
    async fn uncached_row_is_skipped() {
        let state = state_with(vec![Row::new(1)]);
        let (mut reconciler, mut rx) = reconciler(&state);

        let outcome = reconciler.handle_data(&frame(3, "UPDATE", 999, json!({"col_s_01": "x"}))).await;

        assert_eq!(outcome, FrameOutcome::Reported);
        assert!(state.lock().await.cache.row(TABLE_QUERY_KEY, 999).is_none());
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn unknown_columns_are_not_merged() {
        let state = state_with(vec![Row::new(1).with("col_s_01", "a")]);
        let (mut reconciler, _rx) = reconciler(&state);

        reconciler
            .handle_data(&frame(4, "UPDATE", 1, json!({"col_s_01": "b", "secret": "x", "updated_at": "t"})))
            .await;

        let guard = state.lock().await;
        let row = guard.cache.row(TABLE_QUERY_KEY, 1).unwrap();
        assert_eq!(row.get("col_s_01"), Some(&json!("b")));
        assert!(row.get("secret").is_none());
        assert!(row.get("updated_at").is_none());
    }

    #[tokio::test]
    async fn insert_and_delete_are_reported_only() {
        let state = state_with(vec![Row::new(1).with("col_s_01", "a")]);
        let (mut reconciler, mut rx) = reconciler(&state);

        let inserted = reconciler.handle_data(&frame(5, "INSERT", 2, json!({"col_s_01": "new"}))).await;
        let deleted = reconciler.handle_data(&frame(6, "DELETE", 1, json!({"col_s_01": "gone"}))).await;

        assert_eq!(inserted, FrameOutcome::Reported);
        assert_eq!(deleted, FrameOutcome::Reported);
        assert_eq!(cell(&state, 1, "col_s_01").await, json!("a"));
        assert_eq!(drain(&mut rx).len(), 2);
    }

    // -----------------------------------------------------------------------
    // Frame handling
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn heartbeat_payloads_are_ignored() {
        let state = state_with(vec![]);
        let (mut reconciler, mut rx) = reconciler(&state);

        assert_eq!(reconciler.handle_data(": heartbeat").await, FrameOutcome::Ignored);
        assert_eq!(reconciler.handle_data("").await, FrameOutcome::Ignored);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn garbage_emits_error_event() {
        let state = state_with(vec![]);
        let (mut reconciler, mut rx) = reconciler(&state);

        assert_eq!(reconciler.handle_data("{not json").await, FrameOutcome::Invalid);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Error(_)));
    }

    #[tokio::test]
    async fn new_connection_clears_dedup_set() {
        let state = state_with(vec![Row::new(1)]);
        let (mut reconciler, _rx) = reconciler(&state);
        let data = frame(7, "UPDATE", 1, json!({"col_s_01": "b"}));

        reconciler.handle_data(&data).await;
        reconciler.on_open();

        assert_eq!(reconciler.connection_state(), ConnectionState::Connected);
        assert_eq!(reconciler.handle_data(&data).await, FrameOutcome::Merged);
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn starts_connecting_and_closes_on_cancel() {
        let state = state_with(vec![]);
        let (mut reconciler, _rx) = reconciler(&state);
        assert_eq!(reconciler.connection_state(), ConnectionState::Connecting);

        let cancel = CancellationToken::new();
        cancel.cancel();
        reconciler.run(cancel).await;

        assert_eq!(reconciler.connection_state(), ConnectionState::Closed);
    }
}
