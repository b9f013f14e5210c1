//! Wire types of the batch update endpoints.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{CellValue, RowId};

/// One cell assignment inside an update batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellUpdate {
    /// Missing or zero ids are rejected by the server.
    #[serde(default)]
    pub row_id: RowId,
    #[serde(default)]
    pub column_id: String,
    #[serde(default)]
    pub new_value: CellValue,
}

/// Body of `PATCH /api/table/update-cells`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateCellsRequest {
    #[serde(default)]
    pub updates: Vec<CellUpdate>,
}

/// Outcome of applying one row's column set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowUpdateResult {
    pub row_id: RowId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns_updated: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RowUpdateResult {
    pub fn updated(row_id: RowId, columns_updated: usize) -> Self {
        Self {
            row_id,
            success: true,
            columns_updated: Some(columns_updated),
            reason: None,
        }
    }

    pub fn failed(row_id: RowId, reason: impl Into<String>) -> Self {
        Self {
            row_id,
            success: false,
            columns_updated: None,
            reason: Some(reason.into()),
        }
    }
}

/// Response of `PATCH /api/table/update-cells`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCellsResponse {
    pub success: bool,
    pub updated_count: usize,
    pub results: Vec<RowUpdateResult>,
}

impl UpdateCellsResponse {
    pub fn from_results(results: Vec<RowUpdateResult>) -> Self {
        let updated_count = results.iter().filter(|r| r.success).count();
        Self {
            success: true,
            updated_count,
            results,
        }
    }

    /// Rows the server reported as not updated.
    pub fn failures(&self) -> impl Iterator<Item = &RowUpdateResult> {
        self.results.iter().filter(|r| !r.success)
    }
}

/// All pending edits of one row, grouped for submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowPatch {
    #[serde(default)]
    pub id: RowId,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl RowPatch {
    /// Flatten back into per-cell updates.
    pub fn into_cell_updates(self) -> impl Iterator<Item = CellUpdate> {
        let row_id = self.id;
        self.data.into_iter().map(move |(column_id, new_value)| CellUpdate {
            row_id,
            column_id,
            new_value,
        })
    }
}

/// Body of `POST /api/table/bulk-update`: whole-row patches applied in
/// one transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkUpdateRequest {
    #[serde(default)]
    pub changes: Vec<RowPatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUpdateResponse {
    pub success: bool,
    pub updated_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_uses_camel_case() {
        let request: UpdateCellsRequest = serde_json::from_value(json!({
            "updates": [{"rowId": 5, "columnId": "col_s_01", "newValue": "bar"}]
        }))
        .unwrap();
        assert_eq!(request.updates[0].row_id, 5);
        assert_eq!(request.updates[0].column_id, "col_s_01");
        assert_eq!(request.updates[0].new_value, json!("bar"));
    }

    #[test]
    fn missing_fields_default_for_server_side_validation() {
        let request: UpdateCellsRequest =
            serde_json::from_value(json!({"updates": [{"newValue": 1}]})).unwrap();
        assert_eq!(request.updates[0].row_id, 0);
        assert!(request.updates[0].column_id.is_empty());
    }

    #[test]
    fn response_counts_successes() {
        let response = UpdateCellsResponse::from_results(vec![
            RowUpdateResult::updated(1, 2),
            RowUpdateResult::failed(2, "Row not found"),
        ]);
        assert_eq!(response.updated_count, 1);
        assert_eq!(response.failures().count(), 1);

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["updatedCount"], 1);
        assert_eq!(value["results"][1]["reason"], "Row not found");
        assert!(value["results"][0].get("reason").is_none());
    }
}
