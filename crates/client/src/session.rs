//! Edit session over the cached table.
//!
//! [`TableSession`] is the write side of the client: it records edits in
//! the [`PendingEditStore`], mirrors them optimistically into the
//! [`PageCache`], and submits or cancels them as one batch. The same
//! [`SharedTableState`] is handed to the [`SseReconciler`](crate::SseReconciler)
//! so remote merges can see which cells are being edited locally.

use std::sync::Arc;

use gridsync_core::cache::{PageCache, RowCache, TABLE_QUERY_KEY};
use gridsync_core::mutation::{RowPatch, UpdateCellsRequest};
use gridsync_core::page::Direction;
use gridsync_core::pending::{CellChange, CellKey, PendingEditStore};
use gridsync_core::schema::TableSchema;
use tokio::sync::Mutex;

use crate::config::ClientConfig;
use crate::error::{ClientError, MutationError};
use crate::transport::MutationTransport;

/// Client-side table state shared by the session and the reconciler.
#[derive(Debug, Clone, Default)]
pub struct TableState {
    pub ledger: PendingEditStore,
    pub cache: PageCache,
    pub schema: TableSchema,
}

impl TableState {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            ledger: PendingEditStore::new(),
            cache: PageCache::new(config.max_pages),
            schema: TableSchema::default(),
        }
    }

    /// Pending edits grouped into one patch per row, unknown columns
    /// dropped. Rows left with no editable column are omitted.
    pub fn serialize_edits(&self) -> Vec<RowPatch> {
        self.ledger
            .group_by_row()
            .into_iter()
            .map(|(id, data)| RowPatch {
                id,
                data: self.schema.retain_editable(&data),
            })
            .filter(|patch| !patch.data.is_empty())
            .collect()
    }
}

pub type SharedTableState = Arc<Mutex<TableState>>;

/// Coordinates local edits with the server.
pub struct TableSession {
    state: SharedTableState,
    transport: Arc<dyn MutationTransport>,
}

impl TableSession {
    pub fn new(state: SharedTableState, transport: Arc<dyn MutationTransport>) -> Self {
        Self { state, transport }
    }

    /// Handle to the shared state, e.g. for an [`SseReconciler`](crate::SseReconciler).
    pub fn state(&self) -> SharedTableState {
        Arc::clone(&self.state)
    }

    /// Record an edit and show it in the cached row right away.
    ///
    /// Edits of columns outside the schema are dropped; returns whether
    /// the edit was recorded.
    pub async fn register_change(&self, change: CellChange) -> bool {
        let mut state = self.state.lock().await;
        if !state.schema.is_editable(&change.column_id) {
            tracing::warn!(column = %change.column_id, "Ignoring edit of unknown column");
            return false;
        }
        let (row_id, column_id, new_value) = (change.row_id, change.column_id.clone(), change.new_value.clone());
        state.ledger.register_change(change);
        state.cache.update_row(TABLE_QUERY_KEY, row_id, |row| {
            row.set(column_id.clone(), new_value.clone());
        });
        true
    }

    pub async fn serialize_edits(&self) -> Vec<RowPatch> {
        self.state.lock().await.serialize_edits()
    }

    pub async fn has_changes(&self) -> bool {
        self.state.lock().await.ledger.has_changes()
    }

    pub async fn changes_count(&self) -> usize {
        self.state.lock().await.ledger.changes_count()
    }

    /// Send every pending edit in one batch.
    ///
    /// Returns the number of rows the server updated; `Ok(0)` without a
    /// request when nothing is pending. The ledger is cleared only when
    /// every row succeeded; on any error it is left untouched.
    pub async fn submit_changes(&self) -> Result<usize, MutationError> {
        let patches = self.serialize_edits().await;
        if patches.is_empty() {
            return Ok(0);
        }

        let request = UpdateCellsRequest {
            updates: patches.iter().cloned().flat_map(RowPatch::into_cell_updates).collect(),
        };
        tracing::debug!(rows = patches.len(), cells = request.updates.len(), "Submitting edits");

        let response = self.transport.update_cells(&request).await.map_err(|e| {
            tracing::warn!(error = %e, "Edit submission failed");
            e
        })?;

        if !response.success {
            return Err(MutationError::Rejected);
        }
        let failures: Vec<_> = response.failures().cloned().collect();
        if !failures.is_empty() {
            tracing::warn!(failed = failures.len(), "Server rejected some rows");
            return Err(MutationError::RowsRejected(failures));
        }

        // Edits registered while the batch was in flight stay pending and
        // keep their cached value.
        let mut state = self.state.lock().await;
        let TableState { ledger, cache, .. } = &mut *state;
        let submitted = patches.iter().flat_map(|patch| {
            patch
                .data
                .iter()
                .map(move |(column, value)| (CellKey::new(patch.id, column.clone()), value.clone()))
        });
        let settled = ledger.settle(submitted);
        for change in &settled {
            cache.update_row(TABLE_QUERY_KEY, change.row_id, |row| {
                row.set(change.column_id.clone(), change.new_value.clone());
            });
        }

        tracing::info!(
            updated = response.updated_count,
            settled = settled.len(),
            still_pending = ledger.changes_count(),
            "Edits saved"
        );
        Ok(response.updated_count)
    }

    /// Drop every pending edit and restore the original values in the
    /// cache. Returns the number of cells reverted.
    pub async fn cancel_changes(&self) -> usize {
        let mut state = self.state.lock().await;
        let TableState { ledger, cache, .. } = &mut *state;

        let changes = ledger.pending_changes();
        for change in &changes {
            cache.update_row(TABLE_QUERY_KEY, change.row_id, |row| {
                row.set(change.column_id.clone(), change.old_value.clone());
            });
        }
        ledger.clear_all();
        changes.len()
    }

    /// Load the page after the last cached one (or the first page when the
    /// cache is empty). Returns `false` when there is nothing further.
    pub async fn load_next_page(&self) -> Result<bool, ClientError> {
        let cursor = {
            let state = self.state.lock().await;
            match state.cache.cached_pages(TABLE_QUERY_KEY).and_then(<[_]>::last) {
                None => None,
                Some(last) if !last.meta.has_next_page => return Ok(false),
                Some(last) => last.meta.next_cursor.clone(),
            }
        };

        let page = self.transport.fetch_page(cursor.as_deref(), Direction::Forward).await?;
        self.state.lock().await.cache.push_back_page(TABLE_QUERY_KEY, page);
        Ok(true)
    }

    /// Load the page before the first cached one. Returns `false` when the
    /// window already starts at the top of the table.
    pub async fn load_previous_page(&self) -> Result<bool, ClientError> {
        let cursor = {
            let state = self.state.lock().await;
            match state.cache.cached_pages(TABLE_QUERY_KEY).and_then(<[_]>::first) {
                Some(first) if first.meta.has_prev_page => first.meta.prev_cursor.clone(),
                _ => return Ok(false),
            }
        };

        let page = self.transport.fetch_page(cursor.as_deref(), Direction::Backward).await?;
        self.state.lock().await.cache.push_front_page(TABLE_QUERY_KEY, page);
        Ok(true)
    }
}
