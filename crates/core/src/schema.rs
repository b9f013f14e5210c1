//! Column allow-list for the edited `data_table`.
//!
//! The table carries a fixed set of synthetic columns named by kind and
//! ordinal (`col_s_01`, `col_n_01`, `col_b_01`, ...). Anything that is not
//! in the allow-list is treated as unknown: the server skips it in update
//! requests and the client drops it from serialized edits and pushed
//! payloads.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

/// Number of columns generated per kind (3 kinds x 74 = 222 columns).
pub const COLUMNS_PER_KIND: usize = 74;

/// Columns present on every row that are never editable.
pub const READ_ONLY_COLUMNS: &[&str] = &["id", "created_at", "updated_at"];

/// Storage kind of an editable column, derived from its name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    String,
    Numeric,
    Boolean,
}

impl ColumnKind {
    /// Name prefix used by synthetic columns of this kind.
    pub fn prefix(self) -> &'static str {
        match self {
            ColumnKind::String => "col_s_",
            ColumnKind::Numeric => "col_n_",
            ColumnKind::Boolean => "col_b_",
        }
    }

    /// Resolve a kind from a column name by prefix.
    pub fn from_column(column: &str) -> Option<Self> {
        [ColumnKind::String, ColumnKind::Numeric, ColumnKind::Boolean]
            .into_iter()
            .find(|kind| column.starts_with(kind.prefix()))
    }

    /// Whether `value` can be stored in a column of this kind. `null` is
    /// accepted by every kind.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ColumnKind::String, Value::String(_)) => true,
            (ColumnKind::Numeric, Value::Number(_)) => true,
            (ColumnKind::Boolean, Value::Bool(_)) => true,
            _ => false,
        }
    }
}

/// A cell value checked against its column kind, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Text(Option<String>),
    Float(Option<f64>),
    Bool(Option<bool>),
}

impl TypedValue {
    /// Check `value` against `kind`. Returns `None` on a type mismatch.
    pub fn coerce(kind: ColumnKind, value: &Value) -> Option<Self> {
        if !kind.accepts(value) {
            return None;
        }
        Some(match kind {
            ColumnKind::String => TypedValue::Text(value.as_str().map(str::to_owned)),
            ColumnKind::Numeric => TypedValue::Float(value.as_f64()),
            ColumnKind::Boolean => TypedValue::Bool(value.as_bool()),
        })
    }
}

/// The set of editable columns plus the read-only bookkeeping columns.
#[derive(Debug, Clone)]
pub struct TableSchema {
    editable: BTreeSet<String>,
}

impl TableSchema {
    /// Build the standard synthetic schema with `per_kind` columns of each kind.
    pub fn synthetic(per_kind: usize) -> Self {
        let editable = [ColumnKind::String, ColumnKind::Numeric, ColumnKind::Boolean]
            .into_iter()
            .flat_map(|kind| (1..=per_kind).map(move |n| format!("{}{n:02}", kind.prefix())))
            .collect();
        Self { editable }
    }

    /// Returns `true` if `column` may be written by a client.
    pub fn is_editable(&self, column: &str) -> bool {
        self.editable.contains(column)
    }

    /// Returns `true` if `column` is part of the row shape at all.
    pub fn is_known(&self, column: &str) -> bool {
        self.is_editable(column) || READ_ONLY_COLUMNS.contains(&column)
    }

    /// Kind of an editable column, `None` for unknown or read-only columns.
    pub fn kind_of(&self, column: &str) -> Option<ColumnKind> {
        if self.is_editable(column) {
            ColumnKind::from_column(column)
        } else {
            None
        }
    }

    /// Number of editable columns.
    pub fn len(&self) -> usize {
        self.editable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.editable.is_empty()
    }

    /// Keep only editable columns of `fields`.
    pub fn retain_editable(&self, fields: &Map<String, Value>) -> Map<String, Value> {
        fields
            .iter()
            .filter(|(column, _)| self.is_editable(column))
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect()
    }
}

impl Default for TableSchema {
    fn default() -> Self {
        Self::synthetic(COLUMNS_PER_KIND)
    }
}
