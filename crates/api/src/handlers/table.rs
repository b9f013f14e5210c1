//! Handlers for the `/api/table` resource: cursor and offset paging, batch
//! cell updates and transactional bulk row updates.

use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::Json;
use gridsync_core::cursor::decode_cursor;
use gridsync_core::error::CoreError;
use gridsync_core::mutation::{
    BulkUpdateRequest, BulkUpdateResponse, RowUpdateResult, UpdateCellsRequest, UpdateCellsResponse,
};
use gridsync_core::page::{
    assemble_page, Direction, OffsetPage, OffsetPageMeta, OffsetPageRequest, Page, SortOrder,
    MAX_PAGE_SIZE,
};
use gridsync_core::schema::{TableSchema, TypedValue};
use gridsync_core::types::RowId;
use gridsync_db::repositories::{BatchUpdate, ColumnAssignment, DataRowRepo};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Query types
// ---------------------------------------------------------------------------

/// Query parameters for `GET /api/table`.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub cursor: Option<String>,
    #[serde(default)]
    pub direction: Direction,
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/table -- one cursor page of rows.
pub async fn list_rows(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<Page>> {
    let cursor = params
        .cursor
        .as_deref()
        .filter(|c| !c.is_empty())
        .map(decode_cursor)
        .transpose()?;
    let page_size = params
        .limit
        .unwrap_or(state.config.page_size)
        .clamp(1, MAX_PAGE_SIZE);

    let rows = DataRowRepo::fetch_page(&state.pool, cursor, params.direction, page_size + 1).await?;
    let page = assemble_page(rows, params.direction, cursor.is_some(), page_size);

    tracing::debug!(
        rows = page.data.len(),
        has_next = page.meta.has_next_page,
        has_prev = page.meta.has_prev_page,
        "Table page served"
    );
    Ok(Json(page))
}

/// POST /api/table/query -- one page by index, sorted by an allow-listed
/// column, with the total row count.
pub async fn list_offset_page(
    State(state): State<AppState>,
    Json(request): Json<OffsetPageRequest>,
) -> AppResult<Json<OffsetPage>> {
    let page_size = request.page_size_or(state.config.page_size);
    let offset = request.page_index().saturating_mul(page_size);
    let sort = SortOrder::resolve(&request.sorting, &state.schema);

    let (data, total_row_count) = tokio::try_join!(
        DataRowRepo::fetch_offset_page(&state.pool, &sort, offset, page_size),
        DataRowRepo::count(&state.pool),
    )?;

    tracing::debug!(
        rows = data.len(),
        total_row_count,
        sort = %sort.column,
        desc = sort.descending,
        "Offset page served"
    );
    Ok(Json(OffsetPage {
        data,
        meta: OffsetPageMeta { total_row_count },
    }))
}

/// POST /api/table/bulk-update -- apply whole-row patches atomically.
///
/// Patches with a non-positive id or no allow-listed column are dropped.
/// A missing row rolls the whole batch back.
pub async fn bulk_update(
    State(state): State<AppState>,
    Json(request): Json<BulkUpdateRequest>,
) -> AppResult<Json<BulkUpdateResponse>> {
    let rows = sanitize_patches(&state.schema, &request)?;
    if rows.is_empty() {
        return Err(AppError::BadRequest("No valid changes to save".into()));
    }

    match DataRowRepo::update_rows(&state.pool, &rows).await? {
        BatchUpdate::Applied(count) => {
            tracing::info!(rows = count, "Bulk update committed");
            Ok(Json(BulkUpdateResponse {
                success: true,
                updated_count: count as usize,
            }))
        }
        BatchUpdate::MissingRow(id) => {
            tracing::warn!(row_id = id, "Bulk update rolled back");
            Err(CoreError::NotFound { entity: "Row", id }.into())
        }
    }
}

/// PATCH /api/table/update-cells -- apply a batch of cell edits.
///
/// Edits are grouped per row and each row is written with one UPDATE.
/// Unknown columns are skipped. Per-row failures are reported in the
/// response rather than failing the whole batch.
pub async fn update_cells(
    State(state): State<AppState>,
    Json(request): Json<UpdateCellsRequest>,
) -> AppResult<Json<UpdateCellsResponse>> {
    if request.updates.is_empty() {
        return Err(AppError::BadRequest("No updates provided".into()));
    }

    let grouped = group_updates(&state.schema, &request)?;

    let mut results = Vec::with_capacity(grouped.len());
    for (row_id, columns) in grouped {
        let result = match columns {
            Err(column) => RowUpdateResult::failed(row_id, format!("Invalid value for column {column}")),
            Ok(columns) if columns.is_empty() => {
                tracing::warn!(row_id, "No valid columns to update");
                continue;
            }
            Ok(columns) => {
                let assignments: Vec<ColumnAssignment> = columns
                    .into_iter()
                    .map(|(column, value)| ColumnAssignment::new(column, value))
                    .collect();
                match DataRowRepo::update_columns(&state.pool, row_id, &assignments).await {
                    Ok(0) => {
                        tracing::warn!(row_id, "Row not found");
                        RowUpdateResult::failed(row_id, "Row not found")
                    }
                    Ok(_) => RowUpdateResult::updated(row_id, assignments.len()),
                    Err(e) => {
                        tracing::error!(row_id, error = %e, "Row update failed");
                        RowUpdateResult::failed(row_id, "Update failed")
                    }
                }
            }
        };
        results.push(result);
    }

    let response = UpdateCellsResponse::from_results(results);
    tracing::info!(
        updated = response.updated_count,
        rows = response.results.len(),
        "Cell updates applied"
    );
    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Column values for one row, or the first column whose value did not fit
/// its type.
type RowColumns = Result<BTreeMap<String, TypedValue>, String>;

/// Validate every update and group the accepted ones by row.
///
/// A missing or zero `rowId`, or an empty `columnId`, rejects the whole
/// batch. Later edits of the same cell win.
fn group_updates(schema: &TableSchema, request: &UpdateCellsRequest) -> AppResult<BTreeMap<RowId, RowColumns>> {
    let mut grouped: BTreeMap<RowId, RowColumns> = BTreeMap::new();

    for update in &request.updates {
        if update.row_id <= 0 || update.column_id.is_empty() {
            return Err(AppError::BadRequest(
                "Invalid update: missing rowId or columnId".into(),
            ));
        }

        let entry = grouped.entry(update.row_id).or_insert_with(|| Ok(BTreeMap::new()));

        let Some(kind) = schema.kind_of(&update.column_id) else {
            tracing::warn!(column = %update.column_id, "Skipping unknown column");
            continue;
        };

        match TypedValue::coerce(kind, &update.new_value) {
            Some(value) => {
                if let Ok(columns) = entry {
                    columns.insert(update.column_id.clone(), value);
                }
            }
            None => {
                if entry.is_ok() {
                    *entry = Err(update.column_id.clone());
                }
            }
        }
    }

    Ok(grouped)
}

/// Keep the allow-listed columns of each patch, typed.
///
/// The `id` key and unknown columns are ignored; a value that does not fit
/// its column rejects the batch.
fn sanitize_patches(
    schema: &TableSchema,
    request: &BulkUpdateRequest,
) -> AppResult<Vec<(RowId, Vec<ColumnAssignment>)>> {
    let mut rows = Vec::with_capacity(request.changes.len());

    for patch in &request.changes {
        if patch.id <= 0 {
            tracing::warn!(row_id = patch.id, "Skipping change without a valid id");
            continue;
        }

        let mut assignments = Vec::with_capacity(patch.data.len());
        for (column, value) in &patch.data {
            let Some(kind) = schema.kind_of(column) else {
                continue;
            };
            let typed = TypedValue::coerce(kind, value)
                .ok_or_else(|| AppError::BadRequest(format!("Invalid value for column {column}")))?;
            assignments.push(ColumnAssignment::new(column.clone(), typed));
        }

        if !assignments.is_empty() {
            rows.push((patch.id, assignments));
        }
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use gridsync_core::mutation::{CellUpdate, RowPatch};
    use serde_json::{json, Value};

    use super::*;

    fn update(row_id: RowId, column_id: &str, new_value: Value) -> CellUpdate {
        CellUpdate {
            row_id,
            column_id: column_id.into(),
            new_value,
        }
    }

    fn request(updates: Vec<CellUpdate>) -> UpdateCellsRequest {
        UpdateCellsRequest { updates }
    }

    #[test]
    fn groups_by_row_and_last_edit_wins() {
        let schema = TableSchema::default();
        let grouped = group_updates(
            &schema,
            &request(vec![
                update(2, "col_s_01", json!("a")),
                update(1, "col_n_01", json!(3)),
                update(2, "col_s_01", json!("b")),
            ]),
        )
        .unwrap();

        assert_eq!(grouped.keys().copied().collect::<Vec<_>>(), [1, 2]);
        let row2 = grouped[&2].as_ref().unwrap();
        assert_eq!(row2["col_s_01"], TypedValue::Text(Some("b".into())));
    }

    #[test]
    fn unknown_columns_are_skipped() {
        let schema = TableSchema::default();
        let grouped = group_updates(
            &schema,
            &request(vec![update(1, "password", json!("x")), update(1, "id", json!(9))]),
        )
        .unwrap();

        assert!(grouped[&1].as_ref().unwrap().is_empty());
    }

    #[test]
    fn zero_row_or_empty_column_rejects_batch() {
        let schema = TableSchema::default();
        assert_matches!(
            group_updates(&schema, &request(vec![update(0, "col_s_01", json!("x"))])),
            Err(AppError::BadRequest(_))
        );
        assert_matches!(
            group_updates(&schema, &request(vec![update(1, "", json!("x"))])),
            Err(AppError::BadRequest(_))
        );
    }

    #[test]
    fn type_mismatch_marks_row_failed() {
        let schema = TableSchema::default();
        let grouped = group_updates(
            &schema,
            &request(vec![
                update(1, "col_n_01", json!("twelve")),
                update(1, "col_s_01", json!("ok")),
            ]),
        )
        .unwrap();

        assert_eq!(grouped[&1], Err("col_n_01".to_string()));
    }

    fn patch(id: RowId, data: Value) -> RowPatch {
        RowPatch {
            id,
            data: data.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn sanitize_keeps_allow_listed_columns_only() {
        let schema = TableSchema::default();
        let rows = sanitize_patches(
            &schema,
            &BulkUpdateRequest {
                changes: vec![
                    patch(4, json!({"id": 99, "col_s_01": "a", "password": "x"})),
                    patch(0, json!({"col_s_01": "b"})),
                    patch(5, json!({"password": "x"})),
                ],
            },
        )
        .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, 4);
        assert_eq!(
            rows[0].1,
            [ColumnAssignment::new("col_s_01", TypedValue::Text(Some("a".into())))]
        );
    }

    #[test]
    fn sanitize_rejects_mistyped_values() {
        let schema = TableSchema::default();
        assert_matches!(
            sanitize_patches(
                &schema,
                &BulkUpdateRequest {
                    changes: vec![patch(1, json!({"col_b_01": "yes"}))],
                },
            ),
            Err(AppError::BadRequest(_))
        );
    }
}
