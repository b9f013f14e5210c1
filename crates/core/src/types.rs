/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// Identifier of a row in the edited table.
pub type RowId = DbId;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// A single cell value as it travels over the wire (string, number, boolean or null).
pub type CellValue = serde_json::Value;
