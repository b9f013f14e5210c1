//! Pending-edit ledger for optimistic cell editing.
//!
//! [`PendingEditStore`] records every cell the user has changed but not yet
//! saved, together with the value the cell had before its first edit. It is
//! plain synchronous state: the owner decides how it is shared.
//!
//! Lifecycle of an entry:
//! - created on the first edit of a cell (the original value is captured
//!   once and kept until the ledger is cleared);
//! - removed again when an edit brings the cell back to its original value;
//! - dropped wholesale by [`PendingEditStore::clear_all`], after a successful
//!   save or an explicit cancel. Every key that was pending at that moment
//!   is flagged as cancelled so editors holding a local draft know to reset.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::page::Row;
use crate::types::{CellValue, RowId};

// ---------------------------------------------------------------------------
// Keys and records
// ---------------------------------------------------------------------------

/// Identifies one editable cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellKey {
    pub row_id: RowId,
    pub column_id: String,
}

impl CellKey {
    pub fn new(row_id: RowId, column_id: impl Into<String>) -> Self {
        Self {
            row_id,
            column_id: column_id.into(),
        }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.row_id, self.column_id)
    }
}

/// One registered edit. In the ledger `old_value` is the tracked original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellChange {
    pub row_id: RowId,
    pub column_id: String,
    #[serde(default)]
    pub old_value: CellValue,
    pub new_value: CellValue,
}

impl CellChange {
    pub fn new(
        row_id: RowId,
        column_id: impl Into<String>,
        old_value: impl Into<CellValue>,
        new_value: impl Into<CellValue>,
    ) -> Self {
        Self {
            row_id,
            column_id: column_id.into(),
            old_value: old_value.into(),
            new_value: new_value.into(),
        }
    }

    pub fn key(&self) -> CellKey {
        CellKey::new(self.row_id, self.column_id.clone())
    }
}

/// Value of a cell before its first edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalValue {
    pub row_id: RowId,
    pub column_id: String,
    pub value: CellValue,
}

// ---------------------------------------------------------------------------
// PendingEditStore
// ---------------------------------------------------------------------------

/// Ledger of unsaved cell edits.
///
/// Invariant: every key in the pending map also has an original value.
#[derive(Debug, Clone, Default)]
pub struct PendingEditStore {
    pending: BTreeMap<CellKey, CellChange>,
    originals: HashMap<CellKey, OriginalValue>,
    cell_states: HashMap<CellKey, CellValue>,
    cancelled: BTreeSet<CellKey>,
}

impl PendingEditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an edit.
    ///
    /// The first edit of a cell captures `old_value` as the original. The
    /// entry is then upserted, or removed when `new_value` matches the
    /// original. A fresh edit supersedes any pending cancellation of the
    /// same cell.
    pub fn register_change(&mut self, change: CellChange) {
        let key = change.key();

        let original = self
            .originals
            .entry(key.clone())
            .or_insert_with(|| OriginalValue {
                row_id: change.row_id,
                column_id: change.column_id.clone(),
                value: change.old_value.clone(),
            })
            .value
            .clone();

        if change.new_value == original {
            self.pending.remove(&key);
        } else {
            self.pending.insert(
                key.clone(),
                CellChange {
                    old_value: original,
                    ..change
                },
            );
        }

        self.cancelled.remove(&key);
    }

    /// Transient draft of a cell being typed into, if any.
    pub fn cell_state(&self, key: &CellKey) -> Option<&CellValue> {
        self.cell_states.get(key)
    }

    pub fn set_cell_state(&mut self, key: CellKey, value: CellValue) {
        self.cell_states.insert(key, value);
    }

    pub fn clear_cell_state(&mut self, key: &CellKey) {
        self.cell_states.remove(key);
    }

    /// Snapshot of all pending edits, ordered by row id then column id.
    pub fn pending_changes(&self) -> Vec<CellChange> {
        self.pending.values().cloned().collect()
    }

    /// Pending edit for one cell.
    pub fn pending_change(&self, key: &CellKey) -> Option<&CellChange> {
        self.pending.get(key)
    }

    pub fn original_value(&self, key: &CellKey) -> Option<&CellValue> {
        self.originals.get(key).map(|o| &o.value)
    }

    pub fn is_cell_modified(&self, key: &CellKey) -> bool {
        self.pending.contains_key(key)
    }

    pub fn is_cell_cancelled(&self, key: &CellKey) -> bool {
        self.cancelled.contains(key)
    }

    /// Clear the cancellation flag once the editor has reset the cell.
    pub fn acknowledge_cancelled_cell(&mut self, key: &CellKey) {
        self.cancelled.remove(key);
    }

    /// Drop every edit, original and draft; flag every previously pending
    /// cell as cancelled.
    pub fn clear_all(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        self.cancelled.extend(pending.into_keys());
        self.originals.clear();
        self.cell_states.clear();
    }

    /// Settle edits the server has stored.
    ///
    /// A key is settled only while its pending value still equals the
    /// submitted one: it is dropped like [`clear_all`](Self::clear_all)
    /// would and flagged cancelled. A key edited again since submission
    /// stays pending, with the submitted value as its new original; so does
    /// a key reverted locally since submission. Returns the settled changes.
    pub fn settle<I>(&mut self, submitted: I) -> Vec<CellChange>
    where
        I: IntoIterator<Item = (CellKey, CellValue)>,
    {
        let mut settled = Vec::new();
        for (key, value) in submitted {
            match self.pending.get(&key).map(|change| change.new_value == value) {
                Some(true) => {
                    if let Some(change) = self.pending.remove(&key) {
                        settled.push(change);
                    }
                    self.originals.remove(&key);
                    self.cell_states.remove(&key);
                    self.cancelled.insert(key);
                }
                Some(false) => {
                    if let Some(change) = self.pending.get_mut(&key) {
                        change.old_value = value.clone();
                    }
                    if let Some(original) = self.originals.get_mut(&key) {
                        original.value = value;
                    }
                }
                None => {
                    // Reverted locally while in flight: the local value now
                    // differs from the stored one.
                    let Some(original) = self.originals.get_mut(&key) else {
                        continue;
                    };
                    let local = std::mem::replace(&mut original.value, value.clone());
                    if local != value {
                        self.pending.insert(
                            key.clone(),
                            CellChange {
                                row_id: key.row_id,
                                column_id: key.column_id.clone(),
                                old_value: value,
                                new_value: local,
                            },
                        );
                    }
                }
            }
        }
        settled
    }

    pub fn changes_count(&self) -> usize {
        self.pending.len()
    }

    pub fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Rows that have at least one pending edit.
    pub fn modified_row_ids(&self) -> BTreeSet<RowId> {
        self.pending.keys().map(|k| k.row_id).collect()
    }

    pub fn is_row_modified(&self, row_id: RowId) -> bool {
        self.pending.keys().any(|k| k.row_id == row_id)
    }

    /// Columns of `row_id` that have a pending edit.
    pub fn modified_columns(&self, row_id: RowId) -> BTreeSet<&str> {
        self.pending
            .keys()
            .filter(|k| k.row_id == row_id)
            .map(|k| k.column_id.as_str())
            .collect()
    }

    /// Pending values grouped into one column map per row.
    pub fn group_by_row(&self) -> BTreeMap<RowId, Map<String, Value>> {
        let mut grouped: BTreeMap<RowId, Map<String, Value>> = BTreeMap::new();
        for change in self.pending.values() {
            grouped
                .entry(change.row_id)
                .or_default()
                .insert(change.column_id.clone(), change.new_value.clone());
        }
        grouped
    }

    /// Overlay pending edits on top of `rows`.
    pub fn edited_rows(&self, rows: &[Row]) -> Vec<Row> {
        let grouped = self.group_by_row();
        rows.iter()
            .map(|row| {
                let mut row = row.clone();
                if let Some(edits) = grouped.get(&row.id) {
                    for (column, value) in edits {
                        row.set(column.clone(), value.clone());
                    }
                }
                row
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(row_id: RowId, column: &str) -> CellKey {
        CellKey::new(row_id, column)
    }

    #[test]
    fn first_edit_is_pending() {
        let mut store = PendingEditStore::new();
        store.register_change(CellChange::new(5, "col_s_01", "foo", "bar"));

        let pending = store.pending_changes();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].row_id, 5);
        assert_eq!(pending[0].column_id, "col_s_01");
        assert_eq!(pending[0].new_value, json!("bar"));
        assert_eq!(store.changes_count(), 1);
        assert!(store.is_cell_modified(&key(5, "col_s_01")));
    }

    #[test]
    fn reverting_to_original_removes_entry() {
        let mut store = PendingEditStore::new();
        store.register_change(CellChange::new(5, "col_s_01", "foo", "bar"));
        store.register_change(CellChange::new(5, "col_s_01", "bar", "foo"));

        assert!(store.pending_changes().is_empty());
        assert_eq!(store.changes_count(), 0);
        assert!(!store.is_cell_modified(&key(5, "col_s_01")));
        // The original survives an unchanged cell.
        assert_eq!(store.original_value(&key(5, "col_s_01")), Some(&json!("foo")));
    }

    #[test]
    fn any_sequence_ending_on_original_is_unmodified() {
        let mut store = PendingEditStore::new();
        let values = ["b", "c", "d", "c", "a"];
        let mut previous = "a";
        for value in values {
            store.register_change(CellChange::new(1, "col_s_02", previous, value));
            previous = value;
        }
        assert!(!store.is_cell_modified(&key(1, "col_s_02")));
        assert_eq!(store.changes_count(), 0);
    }

    #[test]
    fn original_is_captured_once() {
        let mut store = PendingEditStore::new();
        store.register_change(CellChange::new(1, "col_n_01", 1, 2));
        store.register_change(CellChange::new(1, "col_n_01", 2, 3));

        assert_eq!(store.original_value(&key(1, "col_n_01")), Some(&json!(1)));
        let change = store.pending_change(&key(1, "col_n_01")).unwrap();
        assert_eq!(change.old_value, json!(1));
        assert_eq!(change.new_value, json!(3));
    }

    #[test]
    fn clear_all_flags_pending_cells_as_cancelled() {
        let mut store = PendingEditStore::new();
        store.register_change(CellChange::new(1, "col_b_01", false, true));
        store.register_change(CellChange::new(2, "col_s_01", "x", "y"));
        store.set_cell_state(key(2, "col_s_01"), json!("y-draft"));

        store.clear_all();

        assert_eq!(store.changes_count(), 0);
        assert!(store.cell_state(&key(2, "col_s_01")).is_none());
        assert!(store.original_value(&key(1, "col_b_01")).is_none());
        assert!(store.is_cell_cancelled(&key(1, "col_b_01")));
        assert!(store.is_cell_cancelled(&key(2, "col_s_01")));

        store.acknowledge_cancelled_cell(&key(1, "col_b_01"));
        assert!(!store.is_cell_cancelled(&key(1, "col_b_01")));
        assert!(store.is_cell_cancelled(&key(2, "col_s_01")));
    }

    #[test]
    fn settle_drops_only_unchanged_submissions() {
        let mut store = PendingEditStore::new();
        store.register_change(CellChange::new(5, "col_s_01", "foo", "first"));
        store.register_change(CellChange::new(5, "col_n_01", 1, 2));

        // Edited again while the batch was in flight.
        store.register_change(CellChange::new(5, "col_s_01", "first", "second"));
        let settled = store.settle([
            (key(5, "col_s_01"), json!("first")),
            (key(5, "col_n_01"), json!(2)),
        ]);

        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].column_id, "col_n_01");
        assert!(!store.is_cell_modified(&key(5, "col_n_01")));
        assert!(store.is_cell_cancelled(&key(5, "col_n_01")));

        let newer = store.pending_change(&key(5, "col_s_01")).unwrap();
        assert_eq!(newer.new_value, json!("second"));
        assert_eq!(newer.old_value, json!("first"));
        assert_eq!(store.original_value(&key(5, "col_s_01")), Some(&json!("first")));
        assert!(!store.is_cell_cancelled(&key(5, "col_s_01")));
    }

    #[test]
    fn revert_during_flight_becomes_a_new_edit() {
        let mut store = PendingEditStore::new();
        store.register_change(CellChange::new(1, "col_s_01", "a", "b"));
        store.register_change(CellChange::new(1, "col_s_01", "b", "a"));
        assert!(!store.is_cell_modified(&key(1, "col_s_01")));

        // The server stored "b" but the cell shows "a" again.
        assert!(store.settle([(key(1, "col_s_01"), json!("b"))]).is_empty());

        let change = store.pending_change(&key(1, "col_s_01")).unwrap();
        assert_eq!(change.old_value, json!("b"));
        assert_eq!(change.new_value, json!("a"));
        assert_eq!(store.original_value(&key(1, "col_s_01")), Some(&json!("b")));
    }

    #[test]
    fn unmodified_cells_are_never_cancelled() {
        let mut store = PendingEditStore::new();
        store.register_change(CellChange::new(1, "col_s_01", "a", "a"));
        store.clear_all();
        assert!(!store.is_cell_cancelled(&key(1, "col_s_01")));
    }

    #[test]
    fn fresh_edit_supersedes_cancellation() {
        let mut store = PendingEditStore::new();
        store.register_change(CellChange::new(1, "col_s_01", "a", "b"));
        store.clear_all();
        assert!(store.is_cell_cancelled(&key(1, "col_s_01")));

        store.register_change(CellChange::new(1, "col_s_01", "a", "c"));
        assert!(!store.is_cell_cancelled(&key(1, "col_s_01")));
        assert!(store.is_cell_modified(&key(1, "col_s_01")));
    }

    #[test]
    fn drafts_are_independent_of_pending_values() {
        let mut store = PendingEditStore::new();
        store.register_change(CellChange::new(3, "col_s_03", "a", "ab"));
        store.set_cell_state(key(3, "col_s_03"), json!("abc"));

        assert_eq!(store.cell_state(&key(3, "col_s_03")), Some(&json!("abc")));
        assert_eq!(
            store.pending_change(&key(3, "col_s_03")).unwrap().new_value,
            json!("ab")
        );

        store.clear_cell_state(&key(3, "col_s_03"));
        assert!(store.cell_state(&key(3, "col_s_03")).is_none());
        assert!(store.is_cell_modified(&key(3, "col_s_03")));
    }

    #[test]
    fn pending_changes_order_is_stable() {
        let mut store = PendingEditStore::new();
        store.register_change(CellChange::new(2, "col_s_02", "a", "b"));
        store.register_change(CellChange::new(1, "col_s_09", "a", "b"));
        store.register_change(CellChange::new(2, "col_n_01", 0, 1));

        let keys: Vec<String> = store
            .pending_changes()
            .iter()
            .map(|c| c.key().to_string())
            .collect();
        assert_eq!(keys, ["1-col_s_09", "2-col_n_01", "2-col_s_02"]);
        assert_eq!(store.pending_changes(), store.pending_changes());
    }

    #[test]
    fn modified_rows_and_columns() {
        let mut store = PendingEditStore::new();
        store.register_change(CellChange::new(100, "col_b_01", false, true));
        store.register_change(CellChange::new(7, "col_s_01", "a", "b"));

        assert_eq!(store.modified_row_ids().into_iter().collect::<Vec<_>>(), [7, 100]);
        assert!(store.is_row_modified(100));
        assert!(!store.is_row_modified(8));
        assert_eq!(
            store.modified_columns(100).into_iter().collect::<Vec<_>>(),
            ["col_b_01"]
        );
    }

    #[test]
    fn edited_rows_overlay_pending_values() {
        let mut store = PendingEditStore::new();
        store.register_change(CellChange::new(1, "col_s_01", "a", "A"));
        store.register_change(CellChange::new(1, "col_n_01", 1, 10));

        let rows = vec![
            Row::new(1).with("col_s_01", "a").with("col_n_01", 1).with("col_b_01", true),
            Row::new(2).with("col_s_01", "z"),
        ];
        let edited = store.edited_rows(&rows);

        assert_eq!(edited[0].get("col_s_01"), Some(&json!("A")));
        assert_eq!(edited[0].get("col_n_01"), Some(&json!(10)));
        assert_eq!(edited[0].get("col_b_01"), Some(&json!(true)));
        assert_eq!(edited[1], rows[1]);
    }

    #[test]
    fn cell_key_display_matches_ledger_key_format() {
        assert_eq!(key(5, "col_s_01").to_string(), "5-col_s_01");
    }
}
