//! Rows of `data_table` and the cursor and offset pages they travel in.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cursor::encode_cursor;
use crate::schema::TableSchema;
use crate::types::{CellValue, RowId};

/// Default number of rows per page.
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Upper bound on a client-requested page size.
pub const MAX_PAGE_SIZE: i64 = 500;

/// One row of the wide table: its id plus every other column by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Row {
    pub fn new(id: RowId) -> Self {
        Self {
            id,
            fields: Map::new(),
        }
    }

    /// Builder-style setter, handy for fixtures.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.fields.insert(column.into(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.fields.get(column)
    }

    pub fn set(&mut self, column: impl Into<String>, value: CellValue) {
        self.fields.insert(column.into(), value);
    }

    /// Parse a row from a JSON object such as `to_jsonb(data_table)`.
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// Which way a cursor page walks from its cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

/// Pagination metadata returned alongside each page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub next_cursor: Option<String>,
    pub prev_cursor: Option<String>,
    pub has_next_page: bool,
    pub has_prev_page: bool,
    pub page_size: i64,
}

/// A page of rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub data: Vec<Row>,
    pub meta: PageMeta,
}

impl Page {
    pub fn contains_row(&self, id: RowId) -> bool {
        self.data.iter().any(|row| row.id == id)
    }
}

/// Build a page from rows fetched with a look-ahead of one.
///
/// `rows` must hold up to `page_size + 1` rows in fetch order: ascending ids
/// when walking forward, descending when walking backward. The extra row
/// only signals that more rows exist in the walking direction; it is never
/// returned. The page itself is always in ascending id order.
pub fn assemble_page(mut rows: Vec<Row>, direction: Direction, had_cursor: bool, page_size: i64) -> Page {
    let limit = usize::try_from(page_size).unwrap_or(0);
    let has_extra = rows.len() > limit;
    rows.truncate(limit);
    if direction == Direction::Backward {
        rows.reverse();
    }

    let next_cursor = rows.last().map(|row| encode_cursor(row.id));
    let prev_cursor = rows.first().map(|row| encode_cursor(row.id));

    let (has_next_page, has_prev_page) = match direction {
        Direction::Forward => (has_extra, had_cursor),
        Direction::Backward => (had_cursor, has_extra),
    };

    Page {
        data: rows,
        meta: PageMeta {
            next_cursor,
            prev_cursor,
            has_next_page,
            has_prev_page,
            page_size,
        },
    }
}

// ---------------------------------------------------------------------------
// Offset paging
// ---------------------------------------------------------------------------

/// One requested sort column. Only the first of a list is honoured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SortSpec {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub desc: bool,
}

/// Body of `POST /api/table/query`: a zero-based page index plus sorting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OffsetPageRequest {
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub page_size: Option<i64>,
    #[serde(default)]
    pub sorting: Vec<SortSpec>,
}

impl OffsetPageRequest {
    /// Page index; negative values fall back to the first page.
    pub fn page_index(&self) -> i64 {
        self.page.max(0)
    }

    /// Rows per page. Missing or non-positive sizes fall back to `default`.
    pub fn page_size_or(&self, default: i64) -> i64 {
        match self.page_size {
            Some(size) if size > 0 => size.min(MAX_PAGE_SIZE),
            _ => default,
        }
    }
}

/// Resolved ORDER BY for offset pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    pub column: String,
    pub descending: bool,
}

impl SortOrder {
    pub fn by_id() -> Self {
        Self {
            column: "id".to_string(),
            descending: false,
        }
    }

    /// Use the first spec when it names `id` or an editable column,
    /// otherwise ascending `id`.
    pub fn resolve(sorting: &[SortSpec], schema: &TableSchema) -> Self {
        match sorting.first() {
            Some(SortSpec { id: Some(column), desc })
                if column == "id" || schema.is_editable(column) =>
            {
                Self {
                    column: column.clone(),
                    descending: *desc,
                }
            }
            _ => Self::by_id(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OffsetPageMeta {
    pub total_row_count: i64,
}

/// One offset page with the total row count of the table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OffsetPage {
    pub data: Vec<Row>,
    pub meta: OffsetPageMeta,
}
